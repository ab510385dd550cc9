//! # Kernel synchronization primitives
//!
//! A named spin lock guarding the physical page free list, and a once-cell
//! for globals that are installed exactly once at boot (the logger).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod sync_once_cell;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
