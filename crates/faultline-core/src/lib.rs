//! # faultline-core
//!
//! Crash-safe memory loads for signal-driven sampling profilers.
//!
//! A profiler that samples a thread by interrupting it with a signal has to
//! walk data structures the thread may be rewriting at that very moment. Any
//! pointer it follows can be stale. This crate provides:
//!
//! - Three protected load functions ([`safe_access::load`],
//!   [`safe_access::load32`], [`safe_access::load_ptr`]). They are the only
//!   places in the process where a fault counts as recoverable.
//! - A fault dispatcher ([`recovery::fault_recovery_handler`]) that resumes
//!   past a faulting protected load and forwards every other fault to the
//!   handler that was installed before it.
//! - A registry of installed signal handlers ([`registry`]) so nothing that
//!   was there before us is ever lost.
//! - Thread-directed signal delivery and profiling signal selection
//!   ([`delivery`]).
//! - Verification of the load sites against the instruction decoder
//!   ([`verify`]), in memory and in a built binary.
//!
//! ## Platform Support
//!
//! - **Linux/Android**: x86_64, x86, arm, aarch64
//! - **macOS**: x86_64, aarch64
//!
//! Other architectures on these systems build with a generic fallback. There
//! only faults in `load` can be recovered, and only where the signal context
//! exposes the registers (riscv64 Linux, in optimized builds). Everywhere else
//! the fallback forwards every fault.
//!
//! ## Why unsafe code is needed
//!
//! Resuming after a hardware fault means editing the register snapshot the
//! kernel hands to a signal handler, and the load sites themselves are
//! hand-written machine code. Both are inherently unsafe. The public surface
//! wraps them: the protected loads are safe functions, and only
//! [`context::FaultContext::from_raw`] asks the caller for a promise.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::ffi::c_void;
//!
//! use faultline_core::prelude::*;
//!
//! enable_fault_recovery()?;
//!
//! let stale = 0x8 as *const *mut c_void;
//! assert!(load(stale).is_null());
//! assert_eq!(load32(0x8 as *const u32, 42), 42);
//! # Ok::<(), FaultlineError>(())
//! ```

#![allow(unsafe_code)] // Required for signal handling and hand-written load sites

pub mod arch;
pub mod context;
pub mod delivery;
pub mod error;
mod platform;
pub mod prelude;
pub mod recovery;
pub mod registry;
pub mod safe_access;
pub mod stress;
pub mod types;
pub mod verify;

pub use error::{FaultlineError, FaultlineResult};
pub use safe_access::LoadSite;
pub use types::{Address, Architecture, SamplingMode, Signal, ThreadId};
