//! Host-backed "physical memory" for unit tests.
//!
//! Frames are carved out of one page-aligned heap block; a frame's physical
//! address is simply its host address, so the identity mapper works as is.

use crate::{Frame, FrameAlloc, PhysMapper};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage};
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::cell::RefCell;

pub struct HostMemory {
    base: *mut u8,
    layout: Layout,
    free: RefCell<Vec<PhysicalPage>>,
}

impl HostMemory {
    pub fn with_frames(n: usize) -> Self {
        let layout = Layout::from_size_align(n * PAGE_SIZE as usize, PAGE_SIZE as usize).unwrap();
        // SAFETY: non-zero size.
        let base = unsafe { alloc_zeroed(layout) };
        assert!(!base.is_null());
        let start = base.expose_provenance() as u64;
        let free = (0..n as u64)
            .rev()
            .map(|i| PhysicalPage::from_addr(PhysicalAddress::new(start + i * PAGE_SIZE)))
            .collect();
        Self {
            base,
            layout,
            free: RefCell::new(free),
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.borrow().len()
    }

    /// Keep only `n` frames available.
    pub fn limit(&self, n: usize) {
        let mut free = self.free.borrow_mut();
        let len = free.len();
        free.drain(..len.saturating_sub(n));
    }
}

impl Drop for HostMemory {
    fn drop(&mut self) {
        // SAFETY: allocated in `with_frames` with this layout.
        unsafe { dealloc(self.base, self.layout) };
    }
}

impl FrameAlloc for HostMemory {
    fn alloc_4k(&self) -> Option<Frame> {
        let page = self.free.borrow_mut().pop()?;
        // Fill with junk so tests catch missing zeroing.
        let bytes = unsafe { self.phys_to_mut::<[u8; 4096]>(page.base()) };
        bytes.fill(0xA5);
        // SAFETY: just taken off the free list.
        Some(unsafe { Frame::from_page(page) })
    }

    fn free_4k(&self, frame: Frame) {
        let page = frame.into_page();
        let mut free = self.free.borrow_mut();
        assert!(!free.contains(&page), "double free of {page:?}");
        free.push(page);
    }
}

impl PhysMapper for HostMemory {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        core::ptr::with_exposed_provenance_mut(pa.as_u64() as usize)
    }
}
