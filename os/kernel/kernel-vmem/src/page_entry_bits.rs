use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};

/// A single 64-bit Sv39 page table entry in its raw bitfield form.
///
/// ### Bit layout
///
/// | Bits   | Name  | Meaning |
/// |--------|-------|---------|
/// | 0      | `V`   | Entry is valid |
/// | 1      | `R`   | Readable |
/// | 2      | `W`   | Writable |
/// | 3      | `X`   | Executable |
/// | 4      | `U`   | Accessible from user mode |
/// | 5      | `G`   | Global mapping |
/// | 6      | `A`   | Accessed |
/// | 7      | `D`   | Dirty |
/// | 8–9    | `RSW` | Reserved for software |
/// | 10–53  | `PPN` | Physical page number |
/// | 54–63  |       | Reserved, must be zero |
///
/// A valid entry with none of `R`/`W`/`X` set points to the next-level
/// table; any of them set makes it a leaf.
///
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// let e = PageEntryBits::new().with_valid(true).with_readable(true);
/// assert!(e.is_leaf());
/// ```
#[bitfield(u64)]
pub struct PageEntryBits {
    pub valid: bool,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub user: bool,
    pub global: bool,
    pub accessed: bool,
    pub dirty: bool,

    /// Reserved for supervisor software; hardware ignores it.
    #[bits(2)]
    pub rsw: u8,

    /// Physical page number (physical address bits `[55:12]`).
    #[bits(44)]
    ppn: u64,

    #[bits(10)]
    __: u16,
}

bitflags::bitflags! {
    /// Access permissions of a leaf entry, at their hardware bit positions.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    pub struct Permissions: u64 {
        const READ    = 1 << 1;
        const WRITE   = 1 << 2;
        const EXECUTE = 1 << 3;
        const USER    = 1 << 4;
    }
}

impl Permissions {
    /// Read, write and execute; no user access.
    pub const RWX: Self = Self::READ.union(Self::WRITE).union(Self::EXECUTE);

    /// Whether these permissions make an entry a leaf.
    #[inline]
    #[must_use]
    pub const fn grants_access(self) -> bool {
        self.intersects(Self::RWX)
    }
}

impl PageEntryBits {
    /// Any of `R`/`W`/`X` set.
    #[inline]
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.readable() || self.writable() || self.executable()
    }

    #[inline]
    #[must_use]
    pub const fn page(&self) -> PhysicalPage {
        PhysicalPage::from_ppn(self.ppn())
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        self.page().base()
    }

    #[inline]
    #[must_use]
    pub const fn with_page(self, page: PhysicalPage) -> Self {
        self.with_ppn(page.ppn())
    }

    /// The `R`/`W`/`X`/`U` bits.
    #[inline]
    #[must_use]
    pub const fn permissions(&self) -> Permissions {
        Permissions::from_bits_truncate(self.into_bits())
    }

    /// Replace the `R`/`W`/`X`/`U` bits, keeping everything else.
    #[inline]
    #[must_use]
    pub const fn with_permissions(self, perm: Permissions) -> Self {
        let raw = self.into_bits() & !Permissions::all().bits();
        Self::from_bits(raw | perm.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_bit_positions() {
        let e = PageEntryBits::new()
            .with_valid(true)
            .with_readable(true)
            .with_writable(true)
            .with_executable(true)
            .with_user(true);
        assert_eq!(e.into_bits(), 0x1F);
        assert_eq!(
            e.permissions(),
            Permissions::RWX | Permissions::USER
        );
    }

    #[test]
    fn ppn_sits_at_bit_ten() {
        let page = PhysicalPage::from_addr(PhysicalAddress::new(0x8020_3000));
        let e = PageEntryBits::new().with_page(page);
        assert_eq!(e.into_bits(), (0x8020_3000 >> 12) << 10);
        assert_eq!(e.physical_address().as_u64(), 0x8020_3000);
    }

    #[test]
    fn permissions_replace_only_access_bits() {
        let e = PageEntryBits::new()
            .with_valid(true)
            .with_accessed(true)
            .with_permissions(Permissions::READ | Permissions::USER);
        let e = e.with_permissions(Permissions::READ);
        assert!(e.valid());
        assert!(e.accessed());
        assert!(!e.user());
        assert!(e.is_leaf());
    }

    #[test]
    fn table_pointer_is_not_a_leaf() {
        assert!(!PageEntryBits::new().with_valid(true).is_leaf());
        assert!(!Permissions::USER.grants_access());
    }
}
