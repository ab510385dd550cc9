//! # Kernel Configuration and Boot Interface
//!
//! Memory layout constants, kernel parameters and the boot hand-off values
//! shared by the allocator, the page-table code and the loader. This crate is
//! the single source of truth for where things live on the QEMU `virt`
//! board; nothing else hard-codes an MMIO address.
//!
//! ## Modules
//!
//! - [`memory`]: physical and virtual layout (devices, RAM, trampoline,
//!   kernel stacks).
//! - [`param`]: fixed kernel limits (argument count, process count).
//! - [`boot`]: the [`KernelImage`](boot::KernelImage) describing where the
//!   linker placed the kernel, handed to the allocator and the kernel page
//!   table builder explicitly.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_1000  boot ROM (provided by QEMU)
//! 0x0200_0000  CLINT
//! 0x0C00_0000  PLIC
//! 0x1000_0000  UART0
//! 0x1000_1000  virtio disk
//! 0x8000_0000  KERNBASE: kernel text, then data, then free RAM
//! 0x8800_0000  PHYSTOP: end of RAM used by the kernel
//! ```
//!
//! ## Virtual Memory Layout
//!
//! User space runs from `0` up to the process size. The kernel page table
//! direct-maps devices and RAM at their physical addresses and places the
//! trampoline, then the per-process kernel stacks (each with a guard page),
//! at the very top of the Sv39 range.
//!
//! ```text
//! MAX_VA        ┌────────────────────────┐
//!               │ trampoline             │ TRAMPOLINE
//!               │ trapframe              │ TRAPFRAME (user tables only)
//!               │ kstack 0, guard        │
//!               │ kstack 1, guard        │
//!               │ ...                    │
//! PHYSTOP       ├────────────────────────┤
//!               │ RAM (direct map)       │
//! KERNBASE      ├────────────────────────┤
//!               │ MMIO (direct map)      │
//! 0             └────────────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
pub mod param;
