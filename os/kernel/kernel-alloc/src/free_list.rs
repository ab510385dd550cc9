use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};
use kernel_vmem::PhysMapper;

/// Header written into the first bytes of every free frame.
#[repr(C)]
struct Run {
    /// Physical address of the next free frame, or `0` at the end.
    next: u64,
}

/// Singly linked list of free frames, threaded through the frames themselves.
///
/// Only the head lives outside physical memory, so moving the list is free.
pub(crate) struct FreeList {
    head: Option<PhysicalPage>,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None }
    }

    /// # Safety
    /// `page` must be owned by the caller, mapped by `m`, and not yet on the
    /// list. Its first eight bytes are overwritten.
    pub(crate) unsafe fn push<M: PhysMapper + ?Sized>(&mut self, m: &M, page: PhysicalPage) {
        let run = unsafe { m.phys_to_mut::<Run>(page.base()) };
        run.next = self.head.map_or(0, |p| p.base().as_u64());
        self.head = Some(page);
    }

    pub(crate) fn pop<M: PhysMapper + ?Sized>(&mut self, m: &M) -> Option<PhysicalPage> {
        let page = self.head?;
        // SAFETY: every page on the list holds a `Run` written by `push`.
        let next = unsafe { m.phys_to_mut::<Run>(page.base()) }.next;
        self.head = (next != 0).then(|| PhysicalPage::from_addr(PhysicalAddress::new(next)));
        Some(page)
    }

    /// Count the list by walking it; O(n).
    pub(crate) fn len<M: PhysMapper + ?Sized>(&self, m: &M) -> usize {
        let mut n = 0;
        let mut cur = self.head;
        while let Some(page) = cur {
            n += 1;
            // SAFETY: see `pop`.
            let next = unsafe { m.phys_to_mut::<Run>(page.base()) }.next;
            cur = (next != 0).then(|| PhysicalPage::from_addr(PhysicalAddress::new(next)));
        }
        n
    }
}
