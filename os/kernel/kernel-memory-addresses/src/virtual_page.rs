use crate::{PAGE_SIZE, VirtualAddress};
use core::fmt;

/// Virtual page base.
///
/// ### Invariants
/// - The low 12 bits of the base are always zero (page aligned).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u64);

impl VirtualPage {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self(addr.as_u64() & !(PAGE_SIZE - 1))
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0)
    }

    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> VirtualAddress {
        debug_assert!(offset < PAGE_SIZE, "offset must be < page size");
        VirtualAddress::new(self.0 + offset)
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:010X}/4K", self.0)
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:010X})", self.0)
    }
}

impl TryFrom<VirtualAddress> for VirtualPage {
    type Error = ();

    #[inline]
    fn try_from(va: VirtualAddress) -> Result<Self, ()> {
        if va.is_page_aligned() {
            Ok(va.page())
        } else {
            Err(())
        }
    }
}
