//! # Physical Page Allocation
//!
//! Owns all RAM between the end of the kernel image and the top of usable
//! memory and hands it out one 4 KiB frame at a time.
//!
//! ```text
//! KERNBASE        end             PHYSTOP
//!    │ kernel image │ free frames... │
//!    └──────────────┴────────────────┘
//!                   ▲ PageAllocator
//! ```
//!
//! ## Components
//!
//! - [`PageAllocator`]: a LIFO free list of frames behind one [`SpinLock`].
//!   The list is intrusive: each free frame stores the address of the next
//!   one in its first eight bytes, so the allocator needs no memory of its
//!   own.
//! - [`IdentityMapper`]: the [`PhysMapper`] for the kernel's direct map,
//!   where every physical address is also a valid virtual address.
//! - [`init`]: builds the kernel's single allocator from a
//!   [`KernelImage`] and keeps it in a static.
//!
//! ## Junk Fill
//!
//! With the `junk-fill` feature (default), freed frames are overwritten with
//! `0x01` and allocated frames with `0x05`. A caller that forgets to zero a
//! frame, or keeps using one after freeing it, sees obviously wrong data
//! instead of plausible leftovers.
//!
//! The [`PageAllocator`] implements [`FrameAlloc`] and [`PhysMapper`], so it
//! is all an [`AddressSpace`](kernel_vmem::AddressSpace) needs.
//!
//! [`SpinLock`]: kernel_sync::SpinLock
//! [`FrameAlloc`]: kernel_vmem::FrameAlloc
//! [`PhysMapper`]: kernel_vmem::PhysMapper

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod free_list;
mod page_allocator;
pub mod phys_mapper;

pub use page_allocator::{ALLOC_JUNK, FREE_JUNK, PageAllocator};
pub use phys_mapper::IdentityMapper;

use kernel_info::boot::KernelImage;
use kernel_sync::SyncOnceCell;

static KERNEL_PAGES: SyncOnceCell<PageAllocator<IdentityMapper>> = SyncOnceCell::new();

/// Create the kernel's page allocator over the RAM after the kernel image.
///
/// # Safety
/// RAM from `image.end` to `PHYSTOP` must be direct-mapped and unused.
///
/// # Panics
/// If called more than once.
pub unsafe fn init(image: &KernelImage) -> &'static PageAllocator<IdentityMapper> {
    let (start, end) = image.free_ram();
    // SAFETY: forwarded to the caller.
    let pages = unsafe { PageAllocator::new(IdentityMapper, start, end) };
    match KERNEL_PAGES.set(pages) {
        Ok(pages) => pages,
        Err(_) => panic!("kernel_alloc::init called twice"),
    }
}
