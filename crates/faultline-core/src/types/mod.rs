//! # Types
//!
//! Plain value types shared by every part of the core.
//!
//! Nothing in here touches the OS except `ThreadId::current()`; the rest are
//! newtypes and enums that keep raw integers (addresses, signal numbers,
//! thread IDs) from being mixed up.

pub mod address;
pub mod architecture;
pub mod signal;
pub mod thread;

// Re-export all public types
pub use address::Address;
pub use architecture::Architecture;
pub use signal::{SamplingMode, Signal, SIGNAL_LIMIT};
pub use thread::ThreadId;
