//! # faultline Utilities
//!
//! Shared helpers for the faultline workspace. Today that is logging setup:
//! `tracing-subscriber` with an environment filter, pretty or JSON output,
//! and optional daily-rolling file output through `tracing-appender`.
//!
//! `faultline-core` only emits `tracing` events; installing a subscriber is
//! left to the binary, which calls [`init_logging_with`] once at startup.

pub mod logging;

// Re-export commonly used logging items for convenience
pub use logging::{init_logging, init_logging_with, LogConfig, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
