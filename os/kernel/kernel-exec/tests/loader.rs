mod common;

use common::HostRam;
use kernel_exec::elf::{ELF_HEADER_SIZE, ELF_MAGIC, PROGRAM_HEADER_SIZE, PT_LOAD};
use kernel_exec::{ExecError, STACK_PAGES, load};
use kernel_info::memory::PLIC;
use kernel_info::param::MAX_ARG;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use kernel_vmem::VmError;

const PF_X: u32 = 1;
const PF_W: u32 = 2;
const PF_R: u32 = 4;

struct Segment {
    p_type: u32,
    flags: u32,
    vaddr: u64,
    memsz: u64,
    data: Vec<u8>,
}

impl Segment {
    fn load(vaddr: u64, memsz: u64, flags: u32, data: &[u8]) -> Self {
        Self {
            p_type: PT_LOAD,
            flags,
            vaddr,
            memsz,
            data: data.to_vec(),
        }
    }
}

/// Lay out an ELF64 file: header, program headers, then segment bytes.
fn build_elf(entry: u64, segments: &[Segment]) -> Vec<u8> {
    let phoff = ELF_HEADER_SIZE;
    let mut data_off = phoff + segments.len() * PROGRAM_HEADER_SIZE;

    let mut out = vec![0_u8; data_off];
    out[0..4].copy_from_slice(&ELF_MAGIC.to_le_bytes());
    out[4] = 2; // ELFCLASS64
    out[5] = 1; // little endian
    out[24..32].copy_from_slice(&entry.to_le_bytes());
    out[32..40].copy_from_slice(&(phoff as u64).to_le_bytes());
    out[54..56].copy_from_slice(&(PROGRAM_HEADER_SIZE as u16).to_le_bytes());
    out[56..58].copy_from_slice(&(segments.len() as u16).to_le_bytes());

    for (i, s) in segments.iter().enumerate() {
        let ph = &mut out[phoff + i * PROGRAM_HEADER_SIZE..][..PROGRAM_HEADER_SIZE];
        ph[0..4].copy_from_slice(&s.p_type.to_le_bytes());
        ph[4..8].copy_from_slice(&s.flags.to_le_bytes());
        ph[8..16].copy_from_slice(&(data_off as u64).to_le_bytes());
        ph[16..24].copy_from_slice(&s.vaddr.to_le_bytes());
        ph[32..40].copy_from_slice(&(s.data.len() as u64).to_le_bytes());
        ph[40..48].copy_from_slice(&s.memsz.to_le_bytes());
        ph[48..56].copy_from_slice(&PAGE_SIZE.to_le_bytes());
        data_off += s.data.len();
    }
    for s in segments {
        out.extend_from_slice(&s.data);
    }
    out
}

fn echo_elf() -> Vec<u8> {
    build_elf(0x10, &[Segment::load(0, 0x1800, PF_R | PF_X, b"\x13\x05\x00\x00code")])
}

#[test]
fn loads_segments_and_pushes_arguments() {
    let ram = HostRam::new(64);
    let alloc = ram.allocator();
    let before = alloc.free_page_count();

    let argv: [&[u8]; 2] = [b"echo", b"hi"];
    let image = load(&alloc, echo_elf().as_slice(), &argv).unwrap();

    assert_eq!(image.entry.as_u64(), 0x10);
    assert_eq!(image.argc, 2);
    // 0x1800 rounds to two pages, then guard and stack.
    assert_eq!(image.size, 2 * PAGE_SIZE + STACK_PAGES * PAGE_SIZE);

    let sp = image.stack_pointer.as_u64();
    assert_eq!(sp % 16, 0);
    assert!(sp < image.size && sp >= image.size - PAGE_SIZE);
    assert_eq!(sp, 0x3FC0);

    let mut table = [0_u8; 24];
    image.space.copy_in(&alloc, &mut table, image.stack_pointer).unwrap();
    let words: Vec<u64> = table
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect();
    assert_eq!(words, [0x3FF0, 0x3FE0, 0]);

    let mut s = [0_u8; 16];
    let n = image
        .space
        .copy_in_string(&alloc, &mut s, VirtualAddress::new(words[0]), 16)
        .unwrap();
    assert_eq!(&s[..=n], b"echo\0");
    let n = image
        .space
        .copy_in_string(&alloc, &mut s, VirtualAddress::new(words[1]), 16)
        .unwrap();
    assert_eq!(&s[..=n], b"hi\0");

    let mut text = [0xFF_u8; 16];
    image.space.copy_in(&alloc, &mut text, VirtualAddress::zero()).unwrap();
    assert_eq!(&text[..8], b"\x13\x05\x00\x00code");
    assert_eq!(&text[8..], &[0; 8]);

    // Guard page below the stack is kernel-only.
    let guard = VirtualAddress::new(image.size - 2 * PAGE_SIZE);
    assert!(image.space.translate(&alloc, guard).is_none());
    assert!(image.space.translate(&alloc, guard + PAGE_SIZE).is_some());

    image.space.destroy(&alloc, image.size);
    assert_eq!(alloc.free_page_count(), before);
}

#[test]
fn segments_and_guard_page() {
    let ram = HostRam::new(64);
    let alloc = ram.allocator();
    let elf = build_elf(
        0,
        &[
            Segment::load(0, 0x100, PF_R | PF_X, &[0x73; 0x100]),
            Segment::load(0x1000, 0x2000, PF_R | PF_W, &[1, 2, 3]),
        ],
    );

    let image = load(&alloc, elf.as_slice(), &[]).unwrap();
    assert_eq!(image.argc, 0);
    let mut data = [0xFF_u8; 4];
    image.space.copy_in(&alloc, &mut data, VirtualAddress::new(0x1000)).unwrap();
    assert_eq!(data, [1, 2, 3, 0]);

    // Read-only user pages still accept kernel copies; the guard page does not.
    image.space.copy_out(&alloc, VirtualAddress::zero(), &[0]).unwrap();
    image.space.copy_out(&alloc, VirtualAddress::new(0x2000), &[9]).unwrap();
    let guard = VirtualAddress::new(3 * PAGE_SIZE);
    assert_eq!(
        image.space.copy_out(&alloc, guard, &[0]),
        Err(VmError::BadAddress(guard))
    );

    // argv holds just the terminating null pointer.
    let mut word = [0xFF_u8; 8];
    image.space.copy_in(&alloc, &mut word, image.stack_pointer).unwrap();
    assert_eq!(word, [0; 8]);

    image.space.destroy(&alloc, image.size);
}

#[test]
fn non_load_headers_are_ignored() {
    let ram = HostRam::new(64);
    let alloc = ram.allocator();
    let note = Segment {
        p_type: 4,
        flags: 0,
        vaddr: 0x123,
        memsz: 0,
        data: vec![0; 4],
    };
    let elf = build_elf(0, &[note, Segment::load(0, 8, PF_R | PF_X, &[1; 8])]);

    let image = load(&alloc, elf.as_slice(), &[]).unwrap();
    assert_eq!(image.size, PAGE_SIZE + STACK_PAGES * PAGE_SIZE);
    image.space.destroy(&alloc, image.size);
}

fn assert_rejected(elf: &[u8], argv: &[&[u8]], expected: ExecError) {
    let ram = HostRam::new(64);
    let alloc = ram.allocator();
    let before = alloc.free_page_count();

    let err = load(&alloc, elf, argv).unwrap_err();
    assert_eq!(err, expected);
    assert_eq!(alloc.free_page_count(), before, "{expected:?} leaked pages");
}

#[test]
fn rejects_bad_magic() {
    let mut elf = echo_elf();
    elf[3] = b'G';
    assert_rejected(&elf, &[], ExecError::BadMagic);
}

#[test]
fn rejects_truncated_headers() {
    let elf = echo_elf();
    assert_rejected(&elf[..40], &[], ExecError::ShortRead);
    assert_rejected(&elf[..ELF_HEADER_SIZE + 10], &[], ExecError::ShortRead);
}

#[test]
fn rejects_truncated_segment() {
    let elf = echo_elf();
    assert_rejected(&elf[..elf.len() - 2], &[], ExecError::SegmentRead);
}

#[test]
fn rejects_memsz_below_filesz() {
    let elf = build_elf(0, &[Segment::load(0, 4, PF_R, &[0; 8])]);
    assert_rejected(&elf, &[], ExecError::SegmentSize);
}

#[test]
fn rejects_wrapping_segment() {
    let elf = build_elf(0, &[Segment::load(PAGE_SIZE, u64::MAX - 10, PF_R, &[])]);
    assert_rejected(&elf, &[], ExecError::SegmentOverflow);
}

#[test]
fn rejects_unaligned_segment() {
    let elf = build_elf(0, &[Segment::load(0x1010, 0x10, PF_R, &[0; 4])]);
    assert_rejected(&elf, &[], ExecError::SegmentMisaligned);
}

#[test]
fn rejects_segment_reaching_devices() {
    let elf = build_elf(0, &[Segment::load(PLIC - PAGE_SIZE, 2 * PAGE_SIZE, PF_R, &[])]);
    assert_rejected(&elf, &[], ExecError::SegmentInDeviceRegion);
}

#[test]
fn later_segment_failure_frees_earlier_ones() {
    let elf = build_elf(
        0,
        &[
            Segment::load(0, 3 * PAGE_SIZE, PF_R | PF_X, &[7; 64]),
            Segment::load(0x3004, 8, PF_R, &[0; 8]),
        ],
    );
    assert_rejected(&elf, &[], ExecError::SegmentMisaligned);
}

#[test]
fn rejects_too_many_arguments() {
    let argv: Vec<&[u8]> = vec![b"x".as_slice(); MAX_ARG];
    assert_rejected(&echo_elf(), &argv, ExecError::TooManyArguments);
}

#[test]
fn accepts_one_below_the_argument_limit() {
    let ram = HostRam::new(64);
    let alloc = ram.allocator();
    let argv: Vec<&[u8]> = vec![b"arg".as_slice(); MAX_ARG - 1];

    let image = load(&alloc, echo_elf().as_slice(), &argv).unwrap();
    assert_eq!(image.argc, MAX_ARG - 1);

    // The last pointer slot is the null terminator.
    let end = image.stack_pointer + (MAX_ARG as u64 - 1) * 8;
    let mut word = [0xFF_u8; 8];
    image.space.copy_in(&alloc, &mut word, end).unwrap();
    assert_eq!(word, [0; 8]);
    image.space.destroy(&alloc, image.size);
}

#[test]
fn rejects_arguments_larger_than_the_stack() {
    let big = vec![b'a'; PAGE_SIZE as usize];
    assert_rejected(&echo_elf(), &[big.as_slice()], ExecError::StackOverflow);
}

#[test]
fn out_of_memory_frees_everything() {
    let elf = build_elf(0, &[Segment::load(0, 16 * PAGE_SIZE, PF_R, &[])]);
    let ram = HostRam::new(8);
    let alloc = ram.allocator();
    let before = alloc.free_page_count();

    let err = load(&alloc, elf.as_slice(), &[]).unwrap_err();
    assert_eq!(err, ExecError::Vm(VmError::OutOfMemory));
    assert_eq!(alloc.free_page_count(), before);
}
