//! # Kernel Boot Information

use crate::memory::{KERNBASE, PHYSTOP};
use kernel_memory_addresses::PhysicalAddress;

/// Where the linker placed the kernel image.
///
/// The boot code fills this in from the linker symbols once and hands it to
/// every consumer explicitly, so no other code needs to reference the
/// symbols.
#[derive(Copy, Clone, Debug)]
pub struct KernelImage {
    /// End of kernel text (`etext`); text is mapped read/execute up to here.
    pub text_end: PhysicalAddress,

    /// First address after the kernel image (`end`); free RAM starts here.
    pub end: PhysicalAddress,

    /// Physical address of the trampoline page (`trampoline`).
    pub trampoline: PhysicalAddress,
}

impl KernelImage {
    /// Start of the kernel image.
    #[inline]
    #[must_use]
    pub const fn text_start(&self) -> PhysicalAddress {
        PhysicalAddress::new(KERNBASE)
    }

    /// The RAM range handed to the physical page allocator, `[end, PHYSTOP)`.
    #[inline]
    #[must_use]
    pub const fn free_ram(&self) -> (PhysicalAddress, PhysicalAddress) {
        (self.end, PhysicalAddress::new(PHYSTOP))
    }
}
