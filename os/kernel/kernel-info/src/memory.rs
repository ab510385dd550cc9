//! # Memory Layout (QEMU `virt`)

use kernel_memory_addresses::{MAX_VA, PAGE_SIZE};

/// 16550a UART registers.
pub const UART0: u64 = 0x1000_0000;

/// virtio MMIO disk interface.
pub const VIRTIO0: u64 = 0x1000_1000;

/// Core local interruptor (timer).
pub const CLINT: u64 = 0x0200_0000;

/// Size of the CLINT register window.
pub const CLINT_SIZE: u64 = 0x1_0000;

/// Platform-level interrupt controller.
///
/// User images must stay strictly below this address; everything from here up
/// is reserved for memory-mapped devices.
pub const PLIC: u64 = 0x0c00_0000;

/// Size of the PLIC register window.
pub const PLIC_SIZE: u64 = 0x40_0000;

/// Start of RAM; the kernel is loaded here.
pub const KERNBASE: u64 = 0x8000_0000;

/// End of RAM used by the kernel.
pub const PHYSTOP: u64 = KERNBASE + 128 * 1024 * 1024;

/// The trampoline page, mapped at the highest virtual page in both the kernel
/// and every user address space.
pub const TRAMPOLINE: u64 = MAX_VA.as_u64() - PAGE_SIZE;

/// The per-process trap frame, just below the trampoline in user tables.
pub const TRAPFRAME: u64 = TRAMPOLINE - PAGE_SIZE;

/// Virtual address of kernel stack `i`.
///
/// Stacks sit below the trampoline, each followed (downwards) by an unmapped
/// guard page.
#[inline]
#[must_use]
pub const fn kernel_stack(i: usize) -> u64 {
    TRAMPOLINE - (i as u64 + 1) * 2 * PAGE_SIZE
}

const _: () = {
    assert!(PLIC + PLIC_SIZE <= UART0);
    assert!(UART0 < KERNBASE);
    assert!(PHYSTOP % PAGE_SIZE == 0);
    assert!(PHYSTOP < kernel_stack(crate::param::NPROC));
};
