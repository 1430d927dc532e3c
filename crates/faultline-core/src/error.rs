//! # Error Types
//!
//! Error handling for the setup-time surface of the core.
//!
//! Nothing in here is ever constructed on the fault path: a recovered fault is
//! not an error (the caller just sees the default value), and an unrecoverable
//! fault is forwarded to whatever crash handler existed before us. These
//! variants cover installation, signal delivery, and decoder verification.
//!
//! We use `thiserror` to derive `Error` and the display messages.

use std::io;

use thiserror::Error;

use crate::safe_access::LoadSite;
use crate::types::{Signal, ThreadId};

/// Main error type for faultline operations
///
/// ## Error Categories
///
/// 1. **Signal errors**: InvalidSignal, SignalInstall, ChainFull
/// 2. **Delivery errors**: ThreadGone, DeliveryFailed
/// 3. **Decoder errors**: DecoderMismatch, UnsupportedArchitecture
/// 4. **Artifact errors**: Artifact
/// 5. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum FaultlineError
{
    /// The signal number is outside the range the platform supports
    #[error("Invalid signal number: {0}")]
    InvalidSignal(i32),

    /// `sigaction()` rejected the new disposition
    ///
    /// See: [sigaction(2) man page](https://man7.org/linux/man-pages/man2/sigaction.2.html)
    #[error("Failed to install handler for {signal}: {source}")]
    SignalInstall
    {
        /// Signal whose disposition could not be changed
        signal: Signal,
        /// Underlying OS error
        source: io::Error,
    },

    /// Too many distinct handlers were stacked on one signal
    ///
    /// The chain lives in fixed storage so that it can be read from a signal
    /// handler without allocating.
    #[error("Handler chain for {signal} is full ({capacity} entries)")]
    ChainFull
    {
        /// Signal whose chain overflowed
        signal: Signal,
        /// Maximum number of entries per chain
        capacity: usize,
    },

    /// The target thread no longer exists
    ///
    /// Threads routinely exit between being enumerated and being signaled.
    /// Callers treat this as "no sample for this thread this round".
    #[error("Thread {0} no longer exists")]
    ThreadGone(ThreadId),

    /// Signal delivery failed for a reason other than the thread having exited
    #[error("Failed to deliver {signal} to thread {thread}: {source}")]
    DeliveryFailed
    {
        /// Target thread
        thread: ThreadId,
        /// Signal that was being sent
        signal: Signal,
        /// Underlying OS error
        source: io::Error,
    },

    /// The bytes at a load site do not match what the decoder expects
    ///
    /// This happens when the code at a load site was not emitted the way the
    /// decoder assumes. Recovering a fault there would skip the wrong number
    /// of bytes, so fault recovery refuses to start.
    #[error("Decoder mismatch at {site}: expected {expected}, found {actual}")]
    DecoderMismatch
    {
        /// Load site that failed verification
        site: LoadSite,
        /// Expected instruction bytes (hex)
        expected: String,
        /// Bytes actually found (hex)
        actual: String,
    },

    /// A textual address could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// No architecture-specific implementation exists for this target
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(&'static str),

    /// A binary artifact could not be inspected
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// I/O error (reading artifacts, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<object::Error> for FaultlineError
{
    fn from(err: object::Error) -> Self
    {
        FaultlineError::Artifact(err.to_string())
    }
}

/// Convenience type alias for `Result<T, FaultlineError>`
///
/// ```rust
/// use faultline_core::error::FaultlineResult;
/// fn foo() -> FaultlineResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type FaultlineResult<T> = std::result::Result<T, FaultlineError>;
