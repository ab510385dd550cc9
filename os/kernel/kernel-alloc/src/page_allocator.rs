use crate::free_list::FreeList;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, page_round_up};
use kernel_sync::SpinLock;
use kernel_vmem::{Frame, FrameAlloc, PhysMapper};
use log::{debug, info};

/// Byte written over every freed frame.
pub const FREE_JUNK: u8 = 0x01;

/// Byte written over every allocated frame.
pub const ALLOC_JUNK: u8 = 0x05;

/// Allocator for the 4 KiB frames of one RAM range.
///
/// The lock is held only while splicing the list; junk fills happen on frames
/// the caller owns exclusively.
pub struct PageAllocator<M> {
    mapper: M,
    /// Lowest address a frame may have (the end of the kernel image).
    start: PhysicalAddress,
    /// One beyond the highest usable byte.
    end: PhysicalAddress,
    list: SpinLock<FreeList>,
}

impl<M: PhysMapper> PageAllocator<M> {
    /// Take over every whole page in `[start, end)`.
    ///
    /// # Safety
    /// The range must be RAM mapped writable by `mapper`, and nothing else may
    /// use it from now on.
    pub unsafe fn new(mapper: M, start: PhysicalAddress, end: PhysicalAddress) -> Self {
        let this = Self {
            mapper,
            start,
            end,
            list: SpinLock::new("kmem", FreeList::new()),
        };

        let mut pa = page_round_up(start.as_u64());
        let mut frames = 0_usize;
        while pa + PAGE_SIZE <= end.as_u64() {
            // SAFETY: the caller hands us the whole range.
            this.free(unsafe { Frame::from_page(PhysicalPage::from_addr(PhysicalAddress::new(pa))) });
            pa += PAGE_SIZE;
            frames += 1;
        }

        info!("page allocator: {frames} frames in [{start}, {end})");
        this
    }

    /// Remove one frame from the free list. `None` when exhausted.
    ///
    /// The contents are junk; zero the frame if that matters.
    pub fn allocate(&self) -> Option<Frame> {
        let Some(page) = self.list.with_lock(|list| list.pop(&self.mapper)) else {
            debug!("page allocator: out of frames");
            return None;
        };
        // SAFETY: the page just left the list; nothing else refers to it.
        let frame = unsafe { Frame::from_page(page) };
        self.fill(&frame, ALLOC_JUNK);
        Some(frame)
    }

    /// Return a frame to the free list.
    ///
    /// # Panics
    /// If the frame is misaligned or outside the managed range; either means
    /// the caller corrupted a frame address.
    pub fn free(&self, frame: Frame) {
        let pa = frame.base();
        assert!(
            pa.is_page_aligned() && pa >= self.start && pa < self.end,
            "free: bad frame {pa}"
        );

        self.fill(&frame, FREE_JUNK);
        let page = frame.into_page();
        // SAFETY: ownership came in with `frame`.
        self.list.with_lock(|list| unsafe { list.push(&self.mapper, page) });
    }

    /// Number of free frames. Walks the whole list under the lock.
    pub fn free_page_count(&self) -> usize {
        self.list.with_lock(|list| list.len(&self.mapper))
    }

    /// Free memory in bytes.
    pub fn free_memory_bytes(&self) -> u64 {
        self.free_page_count() as u64 * PAGE_SIZE
    }

    #[inline]
    fn fill(&self, frame: &Frame, byte: u8) {
        if cfg!(feature = "junk-fill") {
            let ptr = self.mapper.phys_to_ptr(frame.base());
            // SAFETY: the frame is owned by the caller and mapped by `mapper`.
            unsafe { core::ptr::write_bytes(ptr, byte, PAGE_SIZE as usize) };
        }
    }
}

impl<M: PhysMapper> FrameAlloc for PageAllocator<M> {
    #[inline]
    fn alloc_4k(&self) -> Option<Frame> {
        self.allocate()
    }

    #[inline]
    fn free_4k(&self, frame: Frame) {
        self.free(frame);
    }
}

impl<M: PhysMapper> PhysMapper for PageAllocator<M> {
    #[inline]
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        self.mapper.phys_to_ptr(pa)
    }
}
