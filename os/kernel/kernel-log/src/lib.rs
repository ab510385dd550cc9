//! # Kernel Logging
//!
//! A `log::Log` backend for the kernel. Records are formatted as
//! `[LEVEL] target: message` and handed, one line at a time, to a sink
//! function chosen at boot. On the QEMU `virt` board the sink is the polled
//! 16550 UART ([`uart::uart_write`]); host tests install a capturing sink.
//!
//! Formatting never allocates: the record is rendered through
//! [`core::fmt::Arguments`] straight into the sink.
//!
//! ## Features
//!
//! * `enabled` (default): records reach the sink. Without it the logger still
//!   installs but drops everything, so call sites need no `cfg`.
//!
//! ```rust,no_run
//! use kernel_log::KernelLogger;
//! use log::{LevelFilter, info};
//!
//! fn sink(args: core::fmt::Arguments) {
//!     let _ = args;
//! }
//!
//! KernelLogger::new(LevelFilter::Debug, sink).init().expect("logger");
//! info!("memory subsystem up");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;
pub mod uart;

pub use logger::{KernelLogger, Sink, write_record};
