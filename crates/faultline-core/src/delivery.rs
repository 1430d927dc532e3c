//! # Thread Signal Delivery
//!
//! Sending a signal to one specific thread (to take a sample on it, or to
//! kick it out of a blocking call) and choosing which signal each sampling
//! mode uses.
//!
//! ## Delivery races
//!
//! A thread can exit between being enumerated and being signaled. That is
//! reported as [`FaultlineError::ThreadGone`], which callers treat as "no
//! sample this round", never as a crash.
//!
//! ## Signal selection
//!
//! On Linux each mode starts from its preferred timer signal and walks the
//! signals a profiler may claim until it finds one that nobody else handles.
//! The step `(signo + 53) & 63` visits every number below 64 exactly once.
//! A signal qualifies when its disposition is `SIG_DFL`, `SIG_IGN`, or the
//! handler this crate installed for it, and the other mode has not taken it.
//! Before the other mode has chosen, its preferred signal is held back for
//! it.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::{FaultlineError, FaultlineResult};
use crate::platform;
use crate::registry;
use crate::types::{SamplingMode, Signal, ThreadId};

/// Signal reserved for interrupting blocking I/O; never used for sampling
pub const WAKEUP_SIGNAL: Signal = Signal::SIGIO;

/// Step between probed signal numbers; coprime with 64
const PROBE_STEP: i32 = 53;

static CHOSEN: [AtomicI32; 2] = [AtomicI32::new(0), AtomicI32::new(0)];
static SELECT_LOCK: Mutex<()> = Mutex::new(());

/// Deliver `signal` to `thread` (and only that thread)
///
/// ## Errors
///
/// - `ThreadGone`: the thread has exited
/// - `DeliveryFailed`: any other failure, e.g. `EPERM` or `EINVAL`
///
/// ## Example
///
/// ```rust,no_run
/// use faultline_core::delivery::{send_signal_to_thread, WAKEUP_SIGNAL};
/// use faultline_core::types::ThreadId;
///
/// send_signal_to_thread(ThreadId::current(), WAKEUP_SIGNAL)?;
/// # Ok::<(), faultline_core::error::FaultlineError>(())
/// ```
pub fn send_signal_to_thread(thread: ThreadId, signal: Signal) -> FaultlineResult<()>
{
    platform::send_signal_to_thread(thread.raw(), signal.raw()).map_err(|err| match err.raw_os_error() {
        Some(libc::ESRCH) => FaultlineError::ThreadGone(thread),
        _ => FaultlineError::DeliveryFailed {
            thread,
            signal,
            source: err,
        },
    })
}

/// Deliver `signal` to `thread`, reporting only whether it worked
pub fn try_send_signal_to_thread(thread: ThreadId, signal: Signal) -> bool
{
    send_signal_to_thread(thread, signal).is_ok()
}

/// Signal used to trigger samples for `mode`
///
/// The choice is remembered and reused as long as the signal stays
/// available. If every candidate is taken, the preferred signal is returned
/// anyway.
pub fn profiling_signal(mode: SamplingMode) -> Signal
{
    let _guard = SELECT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    let remembered = CHOSEN[mode.index()].load(Ordering::Acquire);
    let other = reserved_by(mode.other(), CHOSEN[mode.other().index()].load(Ordering::Acquire));
    if remembered != 0 && is_available(remembered) {
        if let Ok(signal) = Signal::new(remembered) {
            return signal;
        }
    }

    let allowed = platform::allowed_profiling_signals() & !(1u64 << WAKEUP_SIGNAL.raw());
    let preferred = mode.preferred_signal();
    let signal = match select(preferred.raw(), other, allowed, is_available).map(Signal::new) {
        Some(Ok(signal)) => signal,
        _ => {
            warn!("No free profiling signal for {} sampling; using {}", mode, preferred);
            preferred
        }
    };

    CHOSEN[mode.index()].store(signal.raw(), Ordering::Release);
    debug!("Selected {} for {} sampling", signal, mode);
    signal
}

/// Signal number held back for `mode`
///
/// Its chosen signal once there is one, its preferred signal until then.
fn reserved_by(mode: SamplingMode, chosen: i32) -> i32
{
    if chosen != 0 {
        chosen
    } else {
        mode.preferred_signal().raw()
    }
}

/// Walk candidate signals from `start`, returning the first usable one
fn select(start: i32, taken: i32, allowed: u64, available: impl Fn(i32) -> bool) -> Option<i32>
{
    let mut signo = start & 63;
    for _ in 0..64 {
        if allowed & (1u64 << signo) != 0 && signo != taken && available(signo) {
            return Some(signo);
        }
        signo = (signo + PROBE_STEP) & 63;
    }
    None
}

/// Whether nobody but us handles `signo`
fn is_available(signo: i32) -> bool
{
    let Ok(signal) = Signal::new(signo) else {
        return false;
    };
    let Ok(current) = registry::query(signal) else {
        return false;
    };

    let handler = current.sa_sigaction;
    handler == libc::SIG_DFL
        || handler == libc::SIG_IGN
        || registry::installed_action(signal).is_some_and(|ours| ours.address() == handler)
}
