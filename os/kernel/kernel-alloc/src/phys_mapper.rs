//! # Direct-map PhysMapper
//!
//! The kernel page table maps all RAM and every device window at its
//! physical address, so converting a physical address to a pointer is the
//! identity. The same holds for host tests, whose "physical memory" is a heap
//! block addressed by its host addresses.

use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for an identity (direct) map.
///
/// # Safety
/// Dereferencing the returned pointers is only sound for addresses that are
/// actually mapped; the mapper itself performs no checks.
#[derive(Copy, Clone, Debug, Default)]
pub struct IdentityMapper;

impl PhysMapper for IdentityMapper {
    #[inline]
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        core::ptr::with_exposed_provenance_mut(pa.as_u64() as usize)
    }
}
