//! # ELF64 Headers
//!
//! Byte-exact little-endian decoding of the file header and program headers.
//! Only what the loader needs is kept; the rest of the header is skipped.

use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;

/// `"\x7FELF"` read as a little-endian `u32`.
pub const ELF_MAGIC: u32 = 0x464C_457F;

/// Size of `Elf64_Ehdr`.
pub const ELF_HEADER_SIZE: usize = 64;

/// Size of `Elf64_Phdr`.
pub const PROGRAM_HEADER_SIZE: usize = 56;

/// `p_type` of a loadable segment.
pub const PT_LOAD: u32 = 1;

#[inline]
fn le16(x: &[u8]) -> u16 {
    u16::from_le_bytes([x[0], x[1]])
}

#[inline]
fn le32(x: &[u8]) -> u32 {
    u32::from_le_bytes([x[0], x[1], x[2], x[3]])
}

#[inline]
fn le64(x: &[u8]) -> u64 {
    u64::from_le_bytes([x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7]])
}

/// The parts of `Elf64_Ehdr` the loader uses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ElfHeader {
    pub magic: u32,
    pub entry: VirtualAddress,
    /// File offset of the program header table.
    pub phoff: u64,
    pub phnum: u16,
}

impl ElfHeader {
    #[must_use]
    pub fn parse(bytes: &[u8; ELF_HEADER_SIZE]) -> Self {
        Self {
            magic: le32(&bytes[0..4]),
            entry: VirtualAddress::new(le64(&bytes[24..32])),
            phoff: le64(&bytes[32..40]),
            phnum: le16(&bytes[56..58]),
        }
    }

    #[inline]
    #[must_use]
    pub const fn has_valid_magic(&self) -> bool {
        self.magic == ELF_MAGIC
    }
}

/// `Elf64_Phdr.p_flags` (SVr4): bit0=X, bit1=W, bit2=R.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PFlags {
    pub execute: bool, // PF_X = 1
    pub write: bool,   // PF_W = 2
    pub read: bool,    // PF_R = 4
    #[bits(29)]
    __: u32,
}

/// One `Elf64_Phdr`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub flags: PFlags,
    pub offset: u64,
    pub vaddr: VirtualAddress,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl ProgramHeader {
    #[must_use]
    pub fn parse(bytes: &[u8; PROGRAM_HEADER_SIZE]) -> Self {
        Self {
            p_type: le32(&bytes[0..4]),
            flags: PFlags::from_bits(le32(&bytes[4..8])),
            offset: le64(&bytes[8..16]),
            vaddr: VirtualAddress::new(le64(&bytes[16..24])),
            // p_paddr (24..32) is unused.
            filesz: le64(&bytes[32..40]),
            memsz: le64(&bytes[40..48]),
            align: le64(&bytes[48..56]),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_load(&self) -> bool {
        self.p_type == PT_LOAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_at_fixed_offsets() {
        let mut b = [0_u8; ELF_HEADER_SIZE];
        b[0..4].copy_from_slice(b"\x7FELF");
        b[24..32].copy_from_slice(&0x1000_u64.to_le_bytes());
        b[32..40].copy_from_slice(&64_u64.to_le_bytes());
        b[56..58].copy_from_slice(&3_u16.to_le_bytes());

        let h = ElfHeader::parse(&b);
        assert!(h.has_valid_magic());
        assert_eq!(h.entry.as_u64(), 0x1000);
        assert_eq!(h.phoff, 64);
        assert_eq!(h.phnum, 3);
    }

    #[test]
    fn program_header_fields_at_fixed_offsets() {
        let mut b = [0_u8; PROGRAM_HEADER_SIZE];
        b[0..4].copy_from_slice(&PT_LOAD.to_le_bytes());
        b[4..8].copy_from_slice(&0b101_u32.to_le_bytes());
        b[8..16].copy_from_slice(&0x40_u64.to_le_bytes());
        b[16..24].copy_from_slice(&0x2000_u64.to_le_bytes());
        b[24..32].copy_from_slice(&0xdead_u64.to_le_bytes());
        b[32..40].copy_from_slice(&10_u64.to_le_bytes());
        b[40..48].copy_from_slice(&4096_u64.to_le_bytes());
        b[48..56].copy_from_slice(&4096_u64.to_le_bytes());

        let ph = ProgramHeader::parse(&b);
        assert!(ph.is_load());
        assert!(ph.flags.execute() && ph.flags.read() && !ph.flags.write());
        assert_eq!(ph.offset, 0x40);
        assert_eq!(ph.vaddr.as_u64(), 0x2000);
        assert_eq!((ph.filesz, ph.memsz, ph.align), (10, 4096, 4096));
    }

    #[test]
    fn wrong_magic_is_detected() {
        let mut b = [0_u8; ELF_HEADER_SIZE];
        b[0..4].copy_from_slice(b"\x7FELG");
        assert!(!ElfHeader::parse(&b).has_valid_magic());
    }
}
