//! # Process Image Loader
//!
//! Builds a fresh user address space from an ELF64 executable and an argument
//! vector:
//!
//! ```text
//!  sz ┌──────────────────────┐ ← stack pointer starts here, moves down
//!     │ stack page           │   argument strings, then argv[] pointers
//!     ├──────────────────────┤
//!     │ guard page (no U)    │
//!     ├──────────────────────┤ ← page-rounded end of the loaded image
//!     │ loadable segments    │
//!   0 └──────────────────────┘
//! ```
//!
//! [`load`] either returns a complete [`LoadedImage`] or frees everything it
//! allocated; the caller's current address space is never touched. Installing
//! the result (and releasing the old space) is left to the caller.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod elf;
mod image;
mod loader;

pub use image::ExecutableImage;
pub use loader::{LoadedImage, STACK_PAGES, load};

use kernel_vmem::VmError;

/// Why an image could not be loaded.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error("image shorter than its headers")]
    ShortRead,
    #[error("not an ELF image")]
    BadMagic,
    #[error("out of memory")]
    OutOfMemory,
    #[error("segment memory size smaller than file size")]
    SegmentSize,
    #[error("segment wraps the address space")]
    SegmentOverflow,
    #[error("segment address not page aligned")]
    SegmentMisaligned,
    #[error("segment reaches the device region")]
    SegmentInDeviceRegion,
    #[error("segment contents could not be read")]
    SegmentRead,
    #[error("too many arguments")]
    TooManyArguments,
    #[error("arguments overflow the stack page")]
    StackOverflow,
    #[error(transparent)]
    Vm(#[from] VmError),
}
