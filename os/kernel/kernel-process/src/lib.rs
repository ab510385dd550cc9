//! # Process Memory
//!
//! The memory half of a process: its user [`AddressSpace`] together with the
//! size `sz` of the zero-based user region. System calls that touch memory
//! (exec, sbrk, fork, sysinfo) go through [`UserMemory`].

#![cfg_attr(not(any(test, doctest)), no_std)]

mod sysinfo;
mod user_memory;

pub use sysinfo::SysInfo;
pub use user_memory::{ExecStart, UserMemory};

use kernel_exec::ExecError;
use kernel_vmem::VmError;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ProcessError {
    #[error("out of memory")]
    OutOfMemory,
    /// The requested size is negative or reaches the trapframe.
    #[error("user size out of range")]
    SizeLimit,
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Vm(#[from] VmError),
}
