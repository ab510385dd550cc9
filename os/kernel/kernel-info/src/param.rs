//! # Kernel Parameters

/// Maximum number of processes.
pub const NPROC: usize = 64;

/// Maximum number of `exec` arguments.
pub const MAX_ARG: usize = 32;
