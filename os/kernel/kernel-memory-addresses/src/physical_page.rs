use crate::{PAGE_SHIFT, PAGE_SIZE, PhysicalAddress};
use core::fmt;

/// Physical frame base.
///
/// A `PhysicalPage` is the **page-aligned base** of one 4 KiB physical frame.
/// It names a frame; it does not own it.
///
/// ### Invariants
/// - The low [`PAGE_SHIFT`] bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage(u64);

impl PhysicalPage {
    /// Frame that contains `addr` (aligns down).
    #[inline]
    #[must_use]
    pub const fn from_addr(addr: PhysicalAddress) -> Self {
        Self(addr.as_u64() & !(PAGE_SIZE - 1))
    }

    /// Frame with the given physical page number.
    #[inline]
    #[must_use]
    pub const fn from_ppn(ppn: u64) -> Self {
        Self(ppn << PAGE_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0)
    }

    /// Physical page number (`base >> 12`), as stored in a page-table entry.
    #[inline]
    #[must_use]
    pub const fn ppn(self) -> u64 {
        self.0 >> PAGE_SHIFT
    }

    /// Combine with an in-page offset to form a full address.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> PhysicalAddress {
        debug_assert!(offset < PAGE_SIZE, "offset must be < page size");
        PhysicalAddress::new(self.0 + offset)
    }
}

impl fmt::Display for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/4K", self.0)
    }
}

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage(0x{:016X})", self.0)
    }
}
