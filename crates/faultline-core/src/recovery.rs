//! # Fault Recovery Dispatcher
//!
//! The process-wide SIGSEGV/SIGBUS handler. On a fault it looks at the
//! saved program counter:
//!
//! 1. Inside a load site window, with a load the decoder recognizes: move the
//!    PC past the load (zeroing the return register for `load`) and return.
//!    The load function then returns its default.
//! 2. Inside a window but with unrecognized bytes: treat it as a real crash.
//!    Skipping an unknown number of bytes would corrupt execution.
//! 3. Anywhere else: forward to the handler that was installed before ours,
//!    which may be the platform default (process termination).
//!
//! ## State machine
//!
//! ```text
//! unregistered --install_signal_handler / replace_crash_handler--> installed
//! installed    --further installs on the same signal------------> installed-with-chain
//! ```
//!
//! Installation goes through [`crate::registry`], which serializes it and
//! keeps every previous handler reachable.
//!
//! ## Signal safety
//!
//! The dispatcher and [`try_recover`] never allocate, lock, or log. The only
//! shared state they touch is the registry (atomic loads) and two counters.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use libc::{c_int, siginfo_t};
use tracing::{debug, info, warn};

use crate::context::FaultContext;
use crate::error::FaultlineResult;
use crate::registry::{self, SigAction, SigHandler, SigInfoHandler};
use crate::safe_access::{self, LoadSite};
use crate::types::Signal;
use crate::verify;

static ENABLED: AtomicBool = AtomicBool::new(false);
static ENABLE_LOCK: Mutex<()> = Mutex::new(());

static RECOVERED: AtomicU64 = AtomicU64::new(0);
static FORWARDED: AtomicU64 = AtomicU64::new(0);

/// Outcome of examining one fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Recovery
{
    /// The fault was inside a load site; execution resumes after the load
    Resumed
    {
        /// Site that faulted
        site: LoadSite,
        /// Program counter of the faulting load
        pc: usize,
        /// Bytes skipped
        skipped: usize,
    },
    /// The fault did not happen inside any load site
    NotLoadSite
    {
        /// Program counter of the faulting instruction
        pc: usize,
    },
    /// The fault was inside a load site but the bytes were not the expected load
    Unrecognized
    {
        /// Site whose window contained the PC
        site: LoadSite,
        /// Program counter of the faulting instruction
        pc: usize,
    },
    /// The register snapshot could not be read or written on this target
    Unsupported,
}

impl Recovery
{
    /// Whether the fault was absorbed
    pub fn is_resumed(self) -> bool
    {
        matches!(self, Recovery::Resumed { .. })
    }
}

/// Fault counters since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats
{
    /// Faults absorbed inside a load site
    pub recovered: u64,
    /// Faults handed to the previous handler
    pub forwarded: u64,
}

/// Install `action` (or the plain `handler`) for `signal`
///
/// Installs with `SA_SIGINFO | SA_RESTART` for `action`, or with
/// `SA_RESTART` for `handler` when one is given. Installing again on the
/// same signal chains: the handler that was live is kept and can be reached
/// through [`registry::previous_of`].
///
/// Returns the disposition that was live before the call.
///
/// ## Errors
///
/// - `ChainFull`: too many distinct handlers on this signal
/// - `SignalInstall`: `sigaction()` failed
pub fn install_signal_handler(signal: Signal, action: SigInfoHandler, handler: Option<SigHandler>) -> FaultlineResult<SigAction>
{
    let disposition = match handler {
        Some(handler) => SigAction::plain(handler),
        None => SigAction::siginfo(action),
    }
    .with_flags(libc::SA_RESTART);

    let previous = registry::install(signal, disposition, None)?;
    debug!("Installed {} for {} (previous: {})", disposition, signal, previous);
    Ok(previous)
}

/// Install `action` as the handler for SIGSEGV and SIGBUS
///
/// The existing `sa_flags` and `sa_mask` of each signal are kept (plus
/// `SA_SIGINFO`, minus `SA_RESETHAND`), so an alternate-stack handler stays
/// on the alternate stack.
/// Returns the SIGSEGV disposition that was live before the call.
///
/// ## Errors
///
/// - `ChainFull`, `SignalInstall`: see [`install_signal_handler`]
pub fn replace_crash_handler(action: SigInfoHandler) -> FaultlineResult<SigAction>
{
    let mut previous_segv = SigAction::DEFAULT;

    for signal in Signal::FAULT_SIGNALS {
        let current = registry::query(signal)?;
        let disposition = SigAction::siginfo(action).with_flags(current.sa_flags & !libc::SA_RESETHAND);
        let previous = registry::install(signal, disposition, Some(current.sa_mask))?;
        debug!("Replaced crash handler for {} (previous: {})", signal, previous);

        if signal == Signal::SIGSEGV {
            previous_segv = previous;
        }
    }

    Ok(previous_segv)
}

/// Examine a fault and, if it happened in a load site, resume past the load
///
/// Exposed so a crash handler installed by the host can absorb load-site
/// faults itself and keep its own forwarding logic for everything else.
///
/// ## Example
///
/// ```rust,no_run
/// use std::ffi::c_void;
///
/// use faultline_core::context::FaultContext;
/// use faultline_core::recovery::try_recover;
///
/// extern "C" fn host_crash_handler(signo: i32, info: *mut libc::siginfo_t, uc: *mut c_void)
/// {
///     if let Some(mut ctx) = unsafe { FaultContext::from_raw(info, uc) } {
///         if try_recover(&mut ctx).is_resumed() {
///             return;
///         }
///     }
///     // report the crash ...
/// }
/// ```
pub fn try_recover(ctx: &mut FaultContext<'_>) -> Recovery
{
    let Some(pc) = ctx.pc() else {
        return Recovery::Unsupported;
    };
    let Some(site) = LoadSite::containing(pc) else {
        return Recovery::NotLoadSite { pc };
    };

    let skipped = safe_access::skip_load(pc) + safe_access::skip_load_arg(pc);
    if skipped == 0 {
        return Recovery::Unrecognized { site, pc };
    }
    if !site.takes_default() && !ctx.clear_return_value() {
        return Recovery::Unsupported;
    }
    if !ctx.advance_pc(skipped) {
        return Recovery::Unsupported;
    }

    RECOVERED.fetch_add(1, Ordering::Relaxed);
    Recovery::Resumed { site, pc, skipped }
}

/// The dispatcher installed by [`enable_fault_recovery`]
///
/// Has the `SA_SIGINFO` handler signature, so it can also be passed to
/// [`replace_crash_handler`] directly.
pub extern "C" fn fault_recovery_handler(signo: c_int, info: *mut siginfo_t, ucontext: *mut c_void)
{
    // SAFETY: the kernel passed these pointers to this invocation.
    if let Some(mut ctx) = unsafe { FaultContext::from_raw(info, ucontext) } {
        if try_recover(&mut ctx).is_resumed() {
            return;
        }
    }

    FORWARDED.fetch_add(1, Ordering::Relaxed);
    // SAFETY: same pointers, still owned by this invocation.
    unsafe { registry::forward(signo, fault_recovery_handler as usize, info, ucontext) }
}

/// Turn on fault recovery for the process
///
/// Verifies the load sites against the decoder, then installs
/// [`fault_recovery_handler`] on SIGSEGV and SIGBUS. Calling it again is a
/// no-op.
///
/// ## Errors
///
/// - `DecoderMismatch`: a load site's bytes disagree with the decoder; no
///   handler is installed
/// - `ChainFull`, `SignalInstall`: see [`replace_crash_handler`]
pub fn enable_fault_recovery() -> FaultlineResult<()>
{
    let _guard = ENABLE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if ENABLED.load(Ordering::Acquire) {
        return Ok(());
    }

    let report = verify::self_check()?;
    report.ensure_recoverable()?;
    if !safe_access::LOAD_RECOVERABLE {
        warn!("No register access in the signal context on this target; every fault will be forwarded");
    } else if !report.is_fully_verified() {
        warn!("Load sites are not hand-written for this target; only `load` faults can be recovered");
    }

    let previous = replace_crash_handler(fault_recovery_handler)?;
    ENABLED.store(true, Ordering::Release);
    info!("Fault recovery enabled on {} (chained to {})", report.architecture, previous);
    Ok(())
}

/// Whether [`enable_fault_recovery`] has succeeded in this process
pub fn is_fault_recovery_enabled() -> bool
{
    ENABLED.load(Ordering::Acquire)
}

/// Counters of faults seen by the dispatcher
pub fn fault_stats() -> FaultStats
{
    FaultStats {
        recovered: RECOVERED.load(Ordering::Relaxed),
        forwarded: FORWARDED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_recovery_is_resumed()
    {
        let resumed = Recovery::Resumed {
            site: LoadSite::Load,
            pc: 0x1000,
            skipped: 3,
        };
        assert!(resumed.is_resumed());
        assert!(!Recovery::NotLoadSite { pc: 0 }.is_resumed());
        assert!(!Recovery::Unsupported.is_resumed());
    }

    #[cfg(all(any(target_os = "linux", target_os = "android"), faultline_native_sites))]
    #[test]
    fn test_try_recover_on_synthetic_context()
    {
        let mut uc: libc::ucontext_t = unsafe { std::mem::zeroed() };
        let mut ctx = unsafe { FaultContext::from_raw(std::ptr::null_mut(), (&mut uc as *mut libc::ucontext_t).cast()) }.unwrap();

        let pc = LoadSite::Load32.load_address().as_usize();
        assert!(ctx.set_pc(pc));
        match try_recover(&mut ctx) {
            Recovery::Resumed { site, skipped, .. } => {
                assert_eq!(site, LoadSite::Load32);
                assert_eq!(ctx.pc(), Some(pc + skipped));
            }
            other => panic!("unexpected {other:?}"),
        }

        let elsewhere = test_try_recover_on_synthetic_context as usize;
        assert!(ctx.set_pc(elsewhere));
        assert_eq!(try_recover(&mut ctx), Recovery::NotLoadSite { pc: elsewhere });
    }
}
