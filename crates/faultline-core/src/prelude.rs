//! Common module for library exports

pub use crate::delivery::{profiling_signal, send_signal_to_thread, try_send_signal_to_thread, WAKEUP_SIGNAL};
pub use crate::error::{FaultlineError, FaultlineResult};
pub use crate::recovery::{enable_fault_recovery, fault_stats, is_fault_recovery_enabled, FaultStats};
pub use crate::safe_access::{load, load32, load_ptr, LoadSite};
pub use crate::types::{Address, Architecture, SamplingMode, Signal, ThreadId};
pub use crate::verify::{self_check, verify_artifact, VerificationReport};
