//! # Sv39 Page Table
//!
//! - [`L2Index`], [`L1Index`], [`L0Index`]: typed indices for VA bits
//!   `[38:30]`, `[29:21]` and `[20:12]`.
//! - [`PageTableEntry`]: one entry, either invalid, a pointer to the next
//!   table, or a 4 KiB leaf. See [`EntryKind`].
//! - [`PageTable`]: a 4 KiB-aligned array of 512 entries. All three levels
//!   share the layout.

use crate::page_entry_bits::{PageEntryBits, Permissions};
use kernel_memory_addresses::{INDEX_BITS, PAGE_SHIFT, PhysicalPage, VirtualAddress};

/// Number of entries in one table page.
pub const ENTRIES: usize = 1 << INDEX_BITS;

macro_rules! table_index {
    ($(#[$meta:meta])* $name:ident, $level:expr) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(u16);

        impl $name {
            /// Extract this level's nine bits from `va`.
            #[inline]
            #[must_use]
            pub const fn from(va: VirtualAddress) -> Self {
                let shift = PAGE_SHIFT + INDEX_BITS * $level;
                Self(((va.as_u64() >> shift) & (ENTRIES as u64 - 1)) as u16)
            }

            #[inline]
            #[must_use]
            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }
        }
    };
}

table_index!(
    /// Index into the root table (VA bits `[38:30]`).
    L2Index, 2
);
table_index!(
    /// Index into a middle table (VA bits `[29:21]`).
    L1Index, 1
);
table_index!(
    /// Index into a last-level table (VA bits `[20:12]`).
    L0Index, 0
);

/// Split a virtual address into its three table indices, root first.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (L2Index, L1Index, L0Index) {
    (L2Index::from(va), L1Index::from(va), L0Index::from(va))
}

/// What an entry refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryKind {
    Invalid,
    /// Points to the next-level table in this frame.
    Table(PhysicalPage),
    /// Maps this frame with these permissions.
    Leaf(PhysicalPage, Permissions),
}

#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct PageTableEntry(PageEntryBits);

impl PageTableEntry {
    /// Create a zero (invalid) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// A valid pointer to the table in `page`.
    #[inline]
    #[must_use]
    pub const fn table(page: PhysicalPage) -> Self {
        Self(PageEntryBits::new().with_valid(true).with_page(page))
    }

    /// A valid 4 KiB leaf mapping `page`.
    ///
    /// # Panics
    /// If `perm` has none of `R`/`W`/`X`; such an entry would read back as a
    /// table pointer.
    #[inline]
    #[must_use]
    pub const fn leaf(page: PhysicalPage, perm: Permissions) -> Self {
        assert!(perm.grants_access(), "leaf without access bits");
        Self(
            PageEntryBits::new()
                .with_valid(true)
                .with_permissions(perm)
                .with_page(page),
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0.valid()
    }

    #[inline]
    #[must_use]
    pub const fn kind(self) -> EntryKind {
        if !self.0.valid() {
            EntryKind::Invalid
        } else if self.0.is_leaf() {
            EntryKind::Leaf(self.0.page(), self.0.permissions())
        } else {
            EntryKind::Table(self.0.page())
        }
    }

    /// Expose the underlying bitfield for inspection and edits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> PageEntryBits {
        self.0
    }

    #[inline]
    pub const fn set_bits(&mut self, bits: PageEntryBits) {
        self.0 = bits;
    }

    /// Return the raw 64-bit value (flags + frame number).
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0.into_bits()
    }
}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PTE({:#x}, {:?})", self.raw(), self.kind())
    }
}

/// One table page: 512 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES],
}

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn get(&self, i: usize) -> PageTableEntry {
        self.entries[i]
    }

    #[inline]
    pub const fn entry_mut(&mut self, i: usize) -> &mut PageTableEntry {
        &mut self.entries[i]
    }

    /// Valid entries with their index.
    pub fn valid_entries(&self) -> impl Iterator<Item = (usize, PageTableEntry)> + '_ {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, e)| e.is_valid())
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut PageTableEntry> {
        self.entries.iter_mut()
    }
}

const _: () = assert!(size_of::<PageTable>() == 4096);

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn indices_split_va() {
        let va = VirtualAddress::new((3 << 30) | (5 << 21) | (7 << 12) | 0x123);
        let (i2, i1, i0) = split_indices(va);
        assert_eq!(i2.as_usize(), 3);
        assert_eq!(i1.as_usize(), 5);
        assert_eq!(i0.as_usize(), 7);
    }

    #[test]
    fn top_index_uses_bits_30_to_38() {
        let va = VirtualAddress::new((1 << 38) - 1);
        assert_eq!(L2Index::from(va).as_usize(), 255);
        assert_eq!(L1Index::from(va).as_usize(), 511);
    }

    #[test]
    fn entry_kinds() {
        let page = PhysicalPage::from_addr(PhysicalAddress::new(0x8000_5000));
        assert_eq!(PageTableEntry::zero().kind(), EntryKind::Invalid);
        assert_eq!(PageTableEntry::table(page).kind(), EntryKind::Table(page));
        let leaf = PageTableEntry::leaf(page, Permissions::READ | Permissions::USER);
        assert_eq!(
            leaf.kind(),
            EntryKind::Leaf(page, Permissions::READ | Permissions::USER)
        );
        assert_eq!(leaf.raw(), (0x80005 << 10) | 0b1_0011);
    }

    #[test]
    #[should_panic(expected = "leaf without access bits")]
    fn user_only_leaf_is_rejected() {
        let page = PhysicalPage::from_addr(PhysicalAddress::new(0x1000));
        let _ = PageTableEntry::leaf(page, Permissions::USER);
    }
}
