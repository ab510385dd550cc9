//! # Virtual Memory Support
//!
//! RISC-V Sv39 page tables for the kernel and for user processes.
//!
//! ## What you get
//! - An [`AddressSpace`] owning a three-level translation tree: create, walk,
//!   map, unmap, grow, shrink, duplicate and destroy.
//! - Checked byte copies between kernel buffers and user virtual memory
//!   ([`AddressSpace::copy_out`], [`AddressSpace::copy_in`],
//!   [`AddressSpace::copy_in_string`]).
//! - A [`KernelSpaceBuilder`] for the kernel's own direct-mapped table.
//! - The seams to physical memory: [`FrameAlloc`] hands out and takes back
//!   4 KiB [`Frame`]s, [`PhysMapper`] makes a physical address dereferenceable.
//!
//! ## Sv39 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 63‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  zero |  L2   |  L1   |  L0   | Offset |
//! ```
//!
//! Each level holds 512 (2⁹) eight-byte entries, exactly one 4 KiB page.
//! Entries at L2 and L1 point to the next table; entries at L0 are leaves
//! carrying the frame number and the `R`/`W`/`X`/`U` permissions.
//!
//! ```text
//!  satp → L2 table → L1 table → L0 table → 4 KiB frame
//! ```
//!
//! Only 4 KiB leaves are created. A leaf found at L2 or L1 is a broken
//! invariant and panics.
//!
//! ## Errors
//!
//! Caller bugs (remapping a mapped page, unmapping an unmapped one, walking
//! past [`MAX_VA`](kernel_memory_addresses::MAX_VA)) panic. Conditions a
//! caller can hit at runtime (out of frames, a bad user pointer) come back as
//! [`VmError`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod address_space;
mod kernel_space;
mod page_entry_bits;
mod page_table;
#[cfg(test)]
mod test_memory;
mod user_copy;

pub use crate::address_space::AddressSpace;
pub use crate::kernel_space::{KernelSpaceBuilder, MAX_EXTRA_REGIONS, Region};
pub use crate::page_entry_bits::{PageEntryBits, Permissions};
pub use crate::page_table::{EntryKind, L0Index, L1Index, L2Index, PageTable, PageTableEntry};

use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// Recoverable virtual-memory failures.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("out of physical memory")]
    OutOfMemory,
    #[error("bad user address {0:?}")]
    BadAddress(VirtualAddress),
    #[error("string not terminated within limit")]
    StringTooLong,
}

/// Exclusive ownership of one 4 KiB physical frame.
///
/// A `Frame` comes out of [`FrameAlloc::alloc_4k`] and goes back through
/// [`FrameAlloc::free_4k`]. While a leaf or table entry refers to the frame
/// the entry is the owner; [`Frame::into_mapping`] (or [`Frame::into_page`])
/// hands ownership over and [`Frame::from_page`] takes it back when the entry
/// is cleared.
#[must_use = "dropping a Frame leaks it"]
#[derive(Debug, Eq, PartialEq)]
pub struct Frame(PhysicalPage);

impl Frame {
    /// Reclaim ownership of `page`.
    ///
    /// # Safety
    /// `page` must be an allocated frame that nothing else owns any more.
    #[inline]
    pub const unsafe fn from_page(page: PhysicalPage) -> Self {
        Self(page)
    }

    #[inline]
    pub const fn page(&self) -> PhysicalPage {
        self.0
    }

    #[inline]
    pub const fn base(&self) -> PhysicalAddress {
        self.0.base()
    }

    /// Give up ownership; whoever records the page now owns it.
    #[inline]
    pub const fn into_page(self) -> PhysicalPage {
        self.0
    }

    /// Hand ownership to the leaf that now maps this frame.
    #[inline]
    pub const fn into_mapping(self) {
        let _ = self.0;
    }
}

/// Source and sink of physical 4 KiB frames.
///
/// Shared by every address space, so both methods take `&self`;
/// implementations do their own locking.
pub trait FrameAlloc {
    /// Allocate one frame; `None` when exhausted. Contents are arbitrary.
    fn alloc_4k(&self) -> Option<Frame>;

    /// Return a frame.
    fn free_4k(&self, frame: Frame);
}

/// Converts physical addresses to pointers in the current address space
/// (identity in the kernel, which direct-maps all RAM).
pub trait PhysMapper {
    /// Pointer to the byte at `pa`.
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;

    /// View `pa` as a `T`.
    ///
    /// # Safety
    /// - `pa` must be mapped writable and suitably aligned for `T`.
    /// - The bytes at `pa` must be a valid `T` and not aliased for `'a`.
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.phys_to_ptr(pa).cast::<T>() }
    }
}

/// Everything an address space needs from physical memory.
pub trait PhysMemory: FrameAlloc + PhysMapper {}

impl<T: FrameAlloc + PhysMapper + ?Sized> PhysMemory for T {}

/// The bytes of an allocated frame.
///
/// # Safety
/// `page` must be a frame the caller owns (or owns through a table), and no
/// other reference to its bytes may be live for `'a`.
#[inline]
pub(crate) unsafe fn frame_bytes<'a, M: PhysMapper + ?Sized>(
    m: &M,
    page: PhysicalPage,
) -> &'a mut [u8; PAGE_SIZE as usize] {
    unsafe { m.phys_to_mut(page.base()) }
}

/// Fill `frame` with zeroes.
#[inline]
pub(crate) fn zero_frame<M: PhysMapper + ?Sized>(m: &M, frame: &Frame) {
    // SAFETY: the caller holds the frame.
    let bytes = unsafe { frame_bytes(m, frame.page()) };
    bytes.fill(0);
}

/// View a table page.
///
/// # Safety
/// `page` must hold a page table owned by the tree being operated on.
#[inline]
pub(crate) unsafe fn table_mut<'a, M: PhysMapper + ?Sized>(
    m: &M,
    page: PhysicalPage,
) -> &'a mut PageTable {
    unsafe { m.phys_to_mut::<PageTable>(page.base()) }
}

/// Shared view of a table page.
///
/// # Safety
/// As [`table_mut`], and nothing may write the table for `'a`.
#[inline]
pub(crate) unsafe fn table_ref<'a, M: PhysMapper + ?Sized>(m: &M, page: PhysicalPage) -> &'a PageTable {
    unsafe { &*m.phys_to_ptr(page.base()).cast::<PageTable>() }
}
