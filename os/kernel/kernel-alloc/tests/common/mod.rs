#![allow(dead_code)]

use kernel_alloc::{IdentityMapper, PageAllocator};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};
use std::alloc::{Layout, alloc_zeroed, dealloc};

/// A page-aligned heap block standing in for physical RAM.
pub struct HostRam {
    base: *mut u8,
    layout: Layout,
}

impl HostRam {
    pub fn new(pages: usize) -> Self {
        let layout = Layout::from_size_align(pages * PAGE_SIZE as usize, PAGE_SIZE as usize).unwrap();
        let base = unsafe { alloc_zeroed(layout) };
        assert!(!base.is_null());
        Self { base, layout }
    }

    pub fn start(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.expose_provenance() as u64)
    }

    pub fn end(&self) -> PhysicalAddress {
        self.start() + self.layout.size() as u64
    }

    /// An allocator over the whole block.
    pub fn allocator(&self) -> PageAllocator<IdentityMapper> {
        unsafe { PageAllocator::new(IdentityMapper, self.start(), self.end()) }
    }
}

impl Drop for HostRam {
    fn drop(&mut self) {
        unsafe { dealloc(self.base, self.layout) };
    }
}
