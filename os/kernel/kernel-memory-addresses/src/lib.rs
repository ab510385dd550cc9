//! # Virtual and Physical Memory Address Types (Sv39)
//!
//! Strongly typed wrappers for raw memory addresses and page bases used in
//! paging and memory management code.
//!
//! ## Overview
//!
//! The types prevent mixing virtual and physical addresses at compile time
//! while remaining zero-cost wrappers around `u64` values:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] | An address translated through a page table. |
//! | [`PhysicalAddress`] | An address in RAM or in an MMIO window. |
//! | [`VirtualPage`] | The page-aligned base of a virtual page. |
//! | [`PhysicalPage`] | The page-aligned base of a physical frame. |
//!
//! ## Page Size
//!
//! Sv39 is used with 4 KiB pages only; there are no huge pages. Every page
//! type therefore has a single size, [`PAGE_SIZE`].
//!
//! ## Rounding
//!
//! Start addresses are rounded **down** to a page boundary, end addresses of
//! allocations are rounded **up**. Mixing the two up causes one-page
//! under/over-mapping, so both directions are spelled out by name:
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! assert_eq!(page_round_down(0x1fff), 0x1000);
//! assert_eq!(page_round_up(0x1001), 0x2000);
//! assert_eq!(page_round_up(0x2000), 0x2000);
//!
//! let va = VirtualAddress::new(0x1234);
//! assert_eq!(va.page().base().as_u64(), 0x1000);
//! assert_eq!(va.offset(), 0x234);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// log2 of the page size; the number of in-page offset bits.
pub const PAGE_SHIFT: u32 = 12;

/// Size of one page / frame in bytes.
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Bits of virtual address consumed by one page-table level.
pub const INDEX_BITS: u32 = 9;

/// One beyond the highest virtual address usable with Sv39.
///
/// This is actually one bit less than the architectural maximum, so that
/// addresses with the high bit set never need sign extension.
pub const MAX_VA: VirtualAddress =
    VirtualAddress::new(1 << (INDEX_BITS * 3 + PAGE_SHIFT - 1));

/// Round `x` down to the start of the page containing it.
#[inline(always)]
#[must_use]
pub const fn page_round_down(x: u64) -> u64 {
    x & !(PAGE_SIZE - 1)
}

/// Round `x` up to the next page boundary (identity if already aligned).
///
/// Wraps to `0` for values in the last page of the 64-bit space; callers that
/// can see such values must check for overflow first.
#[inline(always)]
#[must_use]
pub const fn page_round_up(x: u64) -> u64 {
    x.wrapping_add(PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Whether `x` lies on a page boundary.
#[inline(always)]
#[must_use]
pub const fn is_page_aligned(x: u64) -> bool {
    x & (PAGE_SIZE - 1) == 0
}
