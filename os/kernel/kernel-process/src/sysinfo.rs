use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{AddressSpace, PhysMapper, VmError};

/// Answer of the `sysinfo` system call, as user code sees it.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[repr(C)]
pub struct SysInfo {
    /// Free physical memory in bytes.
    pub freemem: u64,
    /// Number of processes not in the unused state.
    pub nproc: u64,
}

impl SysInfo {
    pub const SIZE: usize = size_of::<Self>();

    #[must_use]
    pub const fn new(freemem: u64, nproc: u64) -> Self {
        Self { freemem, nproc }
    }

    /// The `repr(C)` image on a little-endian target.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0; Self::SIZE];
        out[..8].copy_from_slice(&self.freemem.to_le_bytes());
        out[8..].copy_from_slice(&self.nproc.to_le_bytes());
        out
    }

    /// Write to user memory at `dst`.
    ///
    /// # Errors
    /// [`VmError::BadAddress`] if `dst` is not user-accessible.
    pub fn copy_out<M: PhysMapper + ?Sized>(
        &self,
        space: &AddressSpace,
        m: &M,
        dst: VirtualAddress,
    ) -> Result<(), VmError> {
        space.copy_out(m, dst, &self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_image_is_two_little_endian_words() {
        let b = SysInfo::new(0x1122_3344, 3).to_bytes();
        assert_eq!(SysInfo::SIZE, 16);
        assert_eq!(&b[..8], &[0x44, 0x33, 0x22, 0x11, 0, 0, 0, 0]);
        assert_eq!(&b[8..], &[3, 0, 0, 0, 0, 0, 0, 0]);
    }
}
