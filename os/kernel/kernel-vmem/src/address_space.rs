//! # Address Space (Sv39, three-level)
//!
//! An [`AddressSpace`] owns a root table page and, transitively, every table
//! page below it. For a user space it also owns the data frames its leaves
//! map; the kernel space maps shared memory it does not own.
//!
//! ## Highlights
//!
//! - [`AddressSpace::walk`] descends to the L0 entry for a VA, optionally
//!   allocating missing tables.
//! - [`AddressSpace::map_range`] / [`AddressSpace::unmap_range`] install and
//!   remove leaves.
//! - [`AddressSpace::grow`] / [`AddressSpace::shrink`] manage a process's
//!   zero-based user region.
//! - [`AddressSpace::copy_address_space`] duplicates a user region for fork.
//! - [`AddressSpace::destroy`] tears the whole tree down.
//!
//! ## Safety
//!
//! - Mutating the *active* space requires TLB maintenance (`sfence.vma`).
//! - The [`PhysMapper`] must yield writable references to table frames.

mod dump;

use crate::page_table::{EntryKind, L0Index, L1Index, L2Index, PageTable, PageTableEntry};
use crate::{
    Frame, FrameAlloc, PhysMapper, PhysMemory, Permissions, VmError, frame_bytes, table_mut,
    table_ref, zero_frame,
};
use kernel_memory_addresses::{
    MAX_VA, PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress, page_round_down,
    page_round_up,
};
use log::debug;

/// `satp.MODE` value selecting Sv39.
const SATP_SV39: u64 = 8 << 60;

/// Bytes covered by one L0 table.
const L0_SPAN: u64 = 512 * PAGE_SIZE;

/// Handle to a single translation tree.
///
/// Not `Copy`: exactly one handle owns a tree, and [`destroy`](Self::destroy)
/// consumes it.
#[derive(Debug, Eq, PartialEq)]
pub struct AddressSpace {
    root: PhysicalPage,
}

impl AddressSpace {
    /// Allocate a zeroed root table. `None` if out of frames.
    pub fn create_empty<M: PhysMemory + ?Sized>(mem: &M) -> Option<Self> {
        let frame = mem.alloc_4k()?;
        zero_frame(mem, &frame);
        Some(Self {
            root: frame.into_page(),
        })
    }

    /// Physical page of the root table.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> PhysicalPage {
        self.root
    }

    /// The `satp` value selecting this space (Sv39, ASID 0).
    #[inline]
    #[must_use]
    pub const fn satp(&self) -> u64 {
        SATP_SV39 | self.root.ppn()
    }

    /// Switch the current hart to this space and flush its TLB.
    ///
    /// # Safety
    /// The currently executing code and data must be mapped identically in
    /// this space.
    #[cfg(target_arch = "riscv64")]
    #[inline]
    pub unsafe fn activate(&self) {
        let satp = self.satp();
        unsafe {
            // Order earlier page-table stores before the switch, and drop
            // stale entries after it.
            core::arch::asm!(
                "sfence.vma zero, zero",
                "csrw satp, {0}",
                "sfence.vma zero, zero",
                in(reg) satp,
                options(nostack, preserves_flags)
            );
        }
    }

    /// Return the L0 entry for `va`, or `None` if a table on the way is
    /// missing (and `alloc` is unset) or cannot be allocated.
    ///
    /// Newly allocated tables are zeroed before being linked in.
    ///
    /// # Panics
    /// - If `va` is at or above [`MAX_VA`](MAX_VA).
    /// - If a leaf is found above L0.
    pub fn walk<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &M,
        va: VirtualAddress,
        alloc: bool,
    ) -> Option<&mut PageTableEntry> {
        assert!(va.is_valid(), "walk: {va:?} out of range");
        // SAFETY: self owns the tree.
        let l2 = unsafe { table_mut(mem, self.root) };
        let l1 = descend(mem, l2.entry_mut(L2Index::from(va).as_usize()), alloc)?;
        let l0 = descend(mem, l1.entry_mut(L1Index::from(va).as_usize()), alloc)?;
        Some(l0.entry_mut(L0Index::from(va).as_usize()))
    }

    /// Read-only walk; copies the L0 entry out.
    pub(crate) fn lookup<M: PhysMapper + ?Sized>(
        &self,
        m: &M,
        va: VirtualAddress,
    ) -> Option<PageTableEntry> {
        assert!(va.is_valid(), "lookup: {va:?} out of range");
        // SAFETY: self owns the tree.
        let l2 = unsafe { table_ref(m, self.root) };
        let l1 = next_table(m, l2.get(L2Index::from(va).as_usize()))?;
        let l0 = next_table(m, l1.get(L1Index::from(va).as_usize()))?;
        Some(l0.get(L0Index::from(va).as_usize()))
    }

    /// Translate a user virtual address.
    ///
    /// Only valid, user-accessible leaves resolve; kernel-only pages and
    /// addresses beyond `MAX_VA` yield `None`. The in-page offset of `va` is
    /// carried over.
    #[must_use]
    pub fn translate<M: PhysMapper + ?Sized>(
        &self,
        m: &M,
        va: VirtualAddress,
    ) -> Option<PhysicalAddress> {
        self.user_page(m, va).map(|(page, _)| page.join(va.offset()))
    }

    /// The frame and permissions of the user leaf covering `va`.
    pub(crate) fn user_page<M: PhysMapper + ?Sized>(
        &self,
        m: &M,
        va: VirtualAddress,
    ) -> Option<(PhysicalPage, Permissions)> {
        if !va.is_valid() {
            return None;
        }
        match self.lookup(m, va)?.kind() {
            EntryKind::Leaf(page, perm) if perm.contains(Permissions::USER) => Some((page, perm)),
            _ => None,
        }
    }

    /// Map `[va, va + size)` to physical memory starting at `pa`.
    ///
    /// `va` and `pa` are rounded down to their page; the last page is the one
    /// containing `va + size - 1`.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if a table page cannot be allocated. Leaves
    /// installed before the failure stay in place.
    ///
    /// # Panics
    /// - If `size` is zero.
    /// - If any page in the range is already mapped.
    pub fn map_range<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &M,
        va: VirtualAddress,
        size: u64,
        pa: PhysicalAddress,
        perm: Permissions,
    ) -> Result<(), VmError> {
        assert!(size != 0, "map_range: size");

        let last = page_round_down(va.as_u64() + size - 1);
        let mut a = page_round_down(va.as_u64());
        let mut page = pa.page();
        loop {
            let pte = self
                .walk(mem, VirtualAddress::new(a), true)
                .ok_or(VmError::OutOfMemory)?;
            assert!(!pte.is_valid(), "map_range: remap at {a:#x}");
            *pte = PageTableEntry::leaf(page, perm);
            if a == last {
                return Ok(());
            }
            a += PAGE_SIZE;
            page = PhysicalPage::from_addr(page.base() + PAGE_SIZE);
        }
    }

    /// Remove `npages` leaves starting at `va`, optionally freeing the frames.
    ///
    /// # Panics
    /// If `va` is not page-aligned, or any page in the range is not mapped by
    /// a leaf.
    pub fn unmap_range<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &M,
        va: VirtualAddress,
        npages: u64,
        free: bool,
    ) {
        assert!(va.is_page_aligned(), "unmap_range: {va:?} not aligned");

        for i in 0..npages {
            let a = va + i * PAGE_SIZE;
            let Some(pte) = self.walk(mem, a, false) else {
                panic!("unmap_range: no table for {a:?}");
            };
            match pte.kind() {
                EntryKind::Leaf(page, _) => {
                    *pte = PageTableEntry::zero();
                    if free {
                        // SAFETY: the leaf owned the frame and is now gone.
                        mem.free_4k(unsafe { Frame::from_page(page) });
                    }
                }
                EntryKind::Invalid => panic!("unmap_range: {a:?} not mapped"),
                EntryKind::Table(_) => panic!("unmap_range: {a:?} not a leaf"),
            }
        }
    }

    /// Grow a user region from `old_size` to `new_size` bytes.
    ///
    /// New pages are zeroed and mapped `R | U | extra`. Returns the new size;
    /// if `new_size < old_size` nothing happens and `old_size` is returned.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`]; every page added by this call has been
    /// released again.
    pub fn grow<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &M,
        old_size: u64,
        new_size: u64,
        extra: Permissions,
    ) -> Result<u64, VmError> {
        if new_size < old_size {
            return Ok(old_size);
        }

        let perm = Permissions::READ | Permissions::USER | extra;
        let mut a = page_round_up(old_size);
        while a < new_size {
            let Some(frame) = mem.alloc_4k() else {
                debug!("grow: out of memory at {a:#x}, rolling back");
                self.shrink(mem, a, old_size);
                return Err(VmError::OutOfMemory);
            };
            zero_frame(mem, &frame);
            if let Err(e) = self.map_range(mem, VirtualAddress::new(a), PAGE_SIZE, frame.base(), perm) {
                debug!("grow: {e} at {a:#x}, rolling back");
                mem.free_4k(frame);
                self.shrink(mem, a, old_size);
                return Err(e);
            }
            frame.into_mapping();
            a += PAGE_SIZE;
        }
        Ok(new_size)
    }

    /// Shrink a user region from `old_size` to `new_size` bytes, freeing the
    /// pages that lie wholly above `new_size`. Returns the new size (or
    /// `old_size` if `new_size` is not smaller).
    ///
    /// Pages in the released range that are not mapped are skipped, so an
    /// `old_size` beyond the real extent (even beyond `MAX_VA`) is harmless.
    pub fn shrink<M: PhysMemory + ?Sized>(&mut self, mem: &M, old_size: u64, new_size: u64) -> u64 {
        if new_size >= old_size {
            return old_size;
        }

        let limit = MAX_VA.as_u64();
        let mut a = page_round_up(new_size.min(limit));
        let end = page_round_up(old_size.min(limit));
        while a < end {
            match self.walk(mem, VirtualAddress::new(a), false) {
                Some(pte) => {
                    if let EntryKind::Leaf(page, _) = pte.kind() {
                        *pte = PageTableEntry::zero();
                        // SAFETY: the leaf owned the frame and is now gone.
                        mem.free_4k(unsafe { Frame::from_page(page) });
                    }
                    a += PAGE_SIZE;
                }
                // No L0 table: nothing is mapped up to the next one.
                None => a = (a | (L0_SPAN - 1)) + 1,
            }
        }
        new_size
    }

    /// Free the user pages below `size`, then every table page and the root.
    ///
    /// # Panics
    /// If a leaf is left anywhere in the tree after the user pages are gone;
    /// the caller must unmap shared mappings (e.g. a trampoline) first.
    pub fn destroy<M: PhysMemory + ?Sized>(mut self, mem: &M, size: u64) {
        if size > 0 {
            self.unmap_range(mem, VirtualAddress::zero(), page_round_up(size) / PAGE_SIZE, true);
        }
        free_l2(mem, self.root);
    }

    /// Duplicate the user region `[0, size)` of `self` into `dst`.
    ///
    /// Every page gets a fresh frame with a copy of the contents and the same
    /// permissions.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`]; everything copied into `dst` by this call
    /// has been unmapped and freed again.
    ///
    /// # Panics
    /// If a page below `size` is not mapped in `self`.
    pub fn copy_address_space<M: PhysMemory + ?Sized>(
        &self,
        mem: &M,
        dst: &mut Self,
        size: u64,
    ) -> Result<(), VmError> {
        let mut a = 0;
        while a < size {
            let va = VirtualAddress::new(a);
            let Some(EntryKind::Leaf(src, perm)) = self.lookup(mem, va).map(PageTableEntry::kind)
            else {
                panic!("copy_address_space: {va:?} not mapped");
            };

            let result = match mem.alloc_4k() {
                None => Err(VmError::OutOfMemory),
                Some(frame) => {
                    // SAFETY: both frames are owned (by `self` and by us) and distinct.
                    let (to, from) = unsafe { (frame_bytes(mem, frame.page()), frame_bytes(mem, src)) };
                    to.copy_from_slice(from);
                    match dst.map_range(mem, va, PAGE_SIZE, frame.base(), perm) {
                        Ok(()) => {
                            frame.into_mapping();
                            Ok(())
                        }
                        Err(e) => {
                            mem.free_4k(frame);
                            Err(e)
                        }
                    }
                }
            };

            if let Err(e) = result {
                debug!("copy_address_space: {e} at {va:?}, rolling back");
                dst.unmap_range(mem, VirtualAddress::zero(), a / PAGE_SIZE, true);
                return Err(e);
            }
            a += PAGE_SIZE;
        }
        Ok(())
    }

    /// Make the page at `va` inaccessible from user mode (a guard page).
    ///
    /// # Panics
    /// If `va` has no L0 entry.
    pub fn clear_user_access<M: PhysMemory + ?Sized>(&mut self, mem: &M, va: VirtualAddress) {
        let Some(pte) = self.walk(mem, va, false) else {
            panic!("clear_user_access: {va:?} not mapped");
        };
        pte.set_bits(pte.bits().with_user(false));
    }

    /// Load `src` into a fresh page at VA 0, mapped `R | W | X | U`.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`].
    ///
    /// # Panics
    /// If `src` does not fit in less than one page.
    pub fn map_first<M: PhysMemory + ?Sized>(&mut self, mem: &M, src: &[u8]) -> Result<(), VmError> {
        assert!((src.len() as u64) < PAGE_SIZE, "map_first: more than a page");

        let frame = mem.alloc_4k().ok_or(VmError::OutOfMemory)?;
        zero_frame(mem, &frame);
        // SAFETY: we own the frame.
        let bytes = unsafe { frame_bytes(mem, frame.page()) };
        bytes[..src.len()].copy_from_slice(src);
        let perm = Permissions::RWX | Permissions::USER;
        if let Err(e) = self.map_range(mem, VirtualAddress::zero(), PAGE_SIZE, frame.base(), perm) {
            mem.free_4k(frame);
            return Err(e);
        }
        frame.into_mapping();
        Ok(())
    }
}

/// Follow `entry` to the next table, allocating one if asked.
fn descend<'t, M: PhysMemory + ?Sized>(
    mem: &M,
    entry: &mut PageTableEntry,
    alloc: bool,
) -> Option<&'t mut PageTable> {
    match entry.kind() {
        // SAFETY: table pages below an owned root are owned by the same tree.
        EntryKind::Table(page) => Some(unsafe { table_mut(mem, page) }),
        EntryKind::Leaf(..) => panic!("walk: leaf above L0"),
        EntryKind::Invalid if !alloc => None,
        EntryKind::Invalid => {
            let frame = mem.alloc_4k()?;
            zero_frame(mem, &frame);
            let page = frame.into_page();
            *entry = PageTableEntry::table(page);
            // SAFETY: freshly zeroed and now linked into the tree.
            Some(unsafe { table_mut(mem, page) })
        }
    }
}

fn next_table<'t, M: PhysMapper + ?Sized>(m: &M, entry: PageTableEntry) -> Option<&'t PageTable> {
    match entry.kind() {
        // SAFETY: see `descend`.
        EntryKind::Table(page) => Some(unsafe { table_ref(m, page) }),
        EntryKind::Leaf(..) => panic!("walk: leaf above L0"),
        EntryKind::Invalid => None,
    }
}

fn free_l2<M: PhysMemory + ?Sized>(mem: &M, root: PhysicalPage) {
    free_table(mem, root, |mem, page| free_table(mem, page, free_l0));
}

fn free_l0<M: PhysMemory + ?Sized>(mem: &M, page: PhysicalPage) {
    free_table(mem, page, |_, child| panic!("destroy: table pointer {child:?} in L0"));
}

/// Free the children of the table in `page` with `free_child`, then the table
/// itself. Any leaf still present is fatal.
fn free_table<M, F>(mem: &M, page: PhysicalPage, free_child: F)
where
    M: PhysMemory + ?Sized,
    F: Fn(&M, PhysicalPage),
{
    // SAFETY: the tree is being torn down by its owner.
    let table = unsafe { table_mut(mem, page) };
    for entry in table.entries_mut() {
        match entry.kind() {
            EntryKind::Invalid => {}
            EntryKind::Leaf(leaf, _) => panic!("destroy: leaf {leaf:?} still mapped"),
            EntryKind::Table(child) => {
                free_child(mem, child);
                *entry = PageTableEntry::zero();
            }
        }
    }
    // SAFETY: no entry refers to the table any more.
    mem.free_4k(unsafe { Frame::from_page(page) });
}
