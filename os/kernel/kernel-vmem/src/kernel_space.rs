//! # Kernel Page Table
//!
//! The kernel runs on a table that maps devices and RAM at their physical
//! addresses, plus the trampoline and one stack per process at the top of the
//! virtual range. [`KernelSpaceBuilder`] builds that table; boards needing
//! more device windows add them with [`KernelSpaceBuilder::with_region`].

use crate::{AddressSpace, FrameAlloc, PhysMemory, Permissions, VmError};
use kernel_info::boot::KernelImage;
use kernel_info::memory::{PHYSTOP, PLIC, PLIC_SIZE, TRAMPOLINE, UART0, VIRTIO0, kernel_stack};
use kernel_info::param::NPROC;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use log::info;

/// How many regions [`KernelSpaceBuilder::with_region`] accepts.
pub const MAX_EXTRA_REGIONS: usize = 4;

/// One contiguous mapping in the kernel table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Region {
    pub va: VirtualAddress,
    pub pa: PhysicalAddress,
    pub size: u64,
    pub perm: Permissions,
}

impl Region {
    /// Map `size` bytes at `pa` to the same virtual address.
    #[must_use]
    pub const fn direct(pa: u64, size: u64, perm: Permissions) -> Self {
        Self {
            va: VirtualAddress::new(pa),
            pa: PhysicalAddress::new(pa),
            size,
            perm,
        }
    }
}

const RW: Permissions = Permissions::READ.union(Permissions::WRITE);
const RX: Permissions = Permissions::READ.union(Permissions::EXECUTE);

/// Configures and builds the kernel's address space.
///
/// ```rust,no_run
/// # use kernel_vmem::{KernelSpaceBuilder, Region, Permissions};
/// # use kernel_info::{boot::KernelImage, memory::{CLINT, CLINT_SIZE}};
/// # fn f(image: KernelImage, mem: &impl kernel_vmem::PhysMemory) {
/// let space = KernelSpaceBuilder::new(image)
///     .with_region(Region::direct(CLINT, CLINT_SIZE, Permissions::READ | Permissions::WRITE))
///     .with_kernel_stacks(64)
///     .build(mem)
///     .expect("kernel page table");
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct KernelSpaceBuilder {
    image: KernelImage,
    extra: [Option<Region>; MAX_EXTRA_REGIONS],
    kernel_stacks: usize,
}

impl KernelSpaceBuilder {
    #[must_use]
    pub const fn new(image: KernelImage) -> Self {
        Self {
            image,
            extra: [None; MAX_EXTRA_REGIONS],
            kernel_stacks: 0,
        }
    }

    /// Map an additional region.
    ///
    /// # Panics
    /// If more than [`MAX_EXTRA_REGIONS`] are added.
    #[must_use]
    pub const fn with_region(mut self, region: Region) -> Self {
        let mut i = 0;
        while i < MAX_EXTRA_REGIONS {
            if self.extra[i].is_none() {
                self.extra[i] = Some(region);
                return self;
            }
            i += 1;
        }
        panic!("too many extra kernel regions");
    }

    /// Allocate and map `n` kernel stacks at [`kernel_stack`]`(0..n)`.
    ///
    /// # Panics
    /// If `n` exceeds [`NPROC`].
    #[must_use]
    pub const fn with_kernel_stacks(mut self, n: usize) -> Self {
        assert!(n <= NPROC, "more kernel stacks than processes");
        self.kernel_stacks = n;
        self
    }

    /// The regions every kernel table has.
    #[must_use]
    pub const fn standard_regions(&self) -> [Region; 6] {
        let text = self.image.text_start().as_u64();
        let text_end = self.image.text_end.as_u64();
        [
            Region::direct(UART0, PAGE_SIZE, RW),
            Region::direct(VIRTIO0, PAGE_SIZE, RW),
            Region::direct(PLIC, PLIC_SIZE, RW),
            Region::direct(text, text_end - text, RX),
            Region::direct(text_end, PHYSTOP - text_end, RW),
            Region {
                va: VirtualAddress::new(TRAMPOLINE),
                pa: self.image.trampoline,
                size: PAGE_SIZE,
                perm: RX,
            },
        ]
    }

    /// Standard regions followed by the extra ones.
    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        self.standard_regions()
            .into_iter()
            .chain(self.extra.iter().flatten().copied())
    }

    /// Build the table.
    ///
    /// Pages consumed by a failed build are not reclaimed.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`].
    pub fn build<M: PhysMemory + ?Sized>(&self, mem: &M) -> Result<AddressSpace, VmError> {
        let mut space = AddressSpace::create_empty(mem).ok_or(VmError::OutOfMemory)?;

        for region in self.regions().filter(|r| r.size > 0) {
            space.map_range(mem, region.va, region.size, region.pa, region.perm)?;
        }

        for i in 0..self.kernel_stacks {
            let frame = mem.alloc_4k().ok_or(VmError::OutOfMemory)?;
            let va = VirtualAddress::new(kernel_stack(i));
            if let Err(e) = space.map_range(mem, va, PAGE_SIZE, frame.base(), RW) {
                mem.free_4k(frame);
                return Err(e);
            }
            frame.into_mapping();
        }

        info!(
            "kernel page table at {}: {} regions, {} kernel stacks",
            space.root_page(),
            self.regions().count(),
            self.kernel_stacks
        );
        Ok(space)
    }
}
