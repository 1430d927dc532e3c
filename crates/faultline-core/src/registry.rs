//! # Signal Registration Registry
//!
//! Process-wide record of every handler installed through this crate, kept
//! per signal as a short stack (the "chain"). Entry 0 is whatever disposition
//! the signal had when we first touched it; each later entry is a handler
//! that replaced the one below it. Forwarding a fault means calling the entry
//! directly below the handler that received it.
//!
//! ## Concurrency
//!
//! Writers take a setup-time [`Mutex`] around both the `sigaction()` call and
//! the chain update, so concurrent installs for different signals never
//! interleave. Readers run inside signal handlers and use atomic loads only:
//! no locks, no allocation.
//!
//! ## Idempotence
//!
//! A handler appears in a chain at most once. Re-installing the handler on top
//! changes nothing; re-installing one further down moves it to the top. A
//! chain can therefore never contain a cycle, and forwarding never invokes the
//! same handler twice.
//!
//! See: [sigaction(2) man page](https://man7.org/linux/man-pages/man2/sigaction.2.html)

use std::ffi::c_void;
use std::fmt;
use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

pub use libc::{c_int, siginfo_t};

use crate::error::{FaultlineError, FaultlineResult};
use crate::types::{Signal, SIGNAL_LIMIT};

/// Maximum number of distinct handlers remembered per signal
pub const CHAIN_CAPACITY: usize = 8;

/// `SA_SIGINFO`-style handler: `(signo, info, ucontext)`
pub type SigInfoHandler = extern "C" fn(c_int, *mut siginfo_t, *mut c_void);

/// Plain handler: `(signo)`
pub type SigHandler = extern "C" fn(c_int);

/// A signal disposition: handler address plus `sa_flags`
///
/// The handler address may also be `SIG_DFL` or `SIG_IGN`. `SA_SIGINFO` in
/// the flags tells which calling convention the address uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigAction
{
    handler: usize,
    flags: c_int,
}

impl SigAction
{
    /// Platform default action
    pub const DEFAULT: SigAction = SigAction {
        handler: libc::SIG_DFL,
        flags: 0,
    };

    /// Ignore the signal
    pub const IGNORE: SigAction = SigAction {
        handler: libc::SIG_IGN,
        flags: 0,
    };

    /// Disposition for a three-argument handler
    pub fn siginfo(handler: SigInfoHandler) -> Self
    {
        SigAction {
            handler: handler as usize,
            flags: libc::SA_SIGINFO,
        }
    }

    /// Disposition for a one-argument handler
    pub fn plain(handler: SigHandler) -> Self
    {
        SigAction {
            handler: handler as usize,
            flags: 0,
        }
    }

    /// Build from the raw fields of a `struct sigaction`
    pub const fn from_raw(handler: usize, flags: c_int) -> Self
    {
        SigAction { handler, flags }
    }

    /// Handler address (or `SIG_DFL`/`SIG_IGN`)
    pub const fn address(self) -> usize
    {
        self.handler
    }

    /// `sa_flags` the handler was installed with
    pub const fn flags(self) -> c_int
    {
        self.flags
    }

    /// Same disposition with extra `sa_flags` set
    #[must_use]
    pub const fn with_flags(self, flags: c_int) -> Self
    {
        SigAction {
            handler: self.handler,
            flags: self.flags | flags,
        }
    }

    /// Whether this is `SIG_DFL`
    pub const fn is_default(self) -> bool
    {
        self.handler == libc::SIG_DFL
    }

    /// Whether this is `SIG_IGN`
    pub const fn is_ignore(self) -> bool
    {
        self.handler == libc::SIG_IGN
    }

    /// Whether the handler takes `(signo, info, ucontext)`
    pub const fn is_siginfo(self) -> bool
    {
        self.flags & libc::SA_SIGINFO != 0
    }
}

impl fmt::Display for SigAction
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.is_default() {
            write!(f, "SIG_DFL")
        } else if self.is_ignore() {
            write!(f, "SIG_IGN")
        } else {
            write!(f, "{:#x} (flags {:#x})", self.handler, self.flags)
        }
    }
}

struct Slot
{
    handler: AtomicUsize,
    flags: AtomicI32,
}

impl Slot
{
    #[allow(clippy::declare_interior_mutable_const)]
    const EMPTY: Slot = Slot {
        handler: AtomicUsize::new(0),
        flags: AtomicI32::new(0),
    };

    fn load(&self) -> SigAction
    {
        SigAction {
            handler: self.handler.load(Ordering::Acquire),
            flags: self.flags.load(Ordering::Acquire),
        }
    }

    fn store(&self, action: SigAction)
    {
        // flags first: a reader that sees the new handler also sees its flags
        self.flags.store(action.flags, Ordering::Release);
        self.handler.store(action.handler, Ordering::Release);
    }
}

/// Handler stack for one signal
pub(crate) struct HandlerChain
{
    len: AtomicUsize,
    slots: [Slot; CHAIN_CAPACITY],
    installed: Slot,
    has_installed: AtomicBool,
}

impl HandlerChain
{
    #[allow(clippy::declare_interior_mutable_const)]
    const EMPTY: HandlerChain = HandlerChain::new();

    pub(crate) const fn new() -> Self
    {
        HandlerChain {
            len: AtomicUsize::new(0),
            slots: [Slot::EMPTY; CHAIN_CAPACITY],
            installed: Slot::EMPTY,
            has_installed: AtomicBool::new(false),
        }
    }

    pub(crate) fn len(&self) -> usize
    {
        self.len.load(Ordering::Acquire).min(CHAIN_CAPACITY)
    }

    pub(crate) fn entries(&self) -> Vec<SigAction>
    {
        self.slots[..self.len()].iter().map(Slot::load).collect()
    }

    fn top(&self) -> Option<SigAction>
    {
        self.len().checked_sub(1).map(|i| self.slots[i].load())
    }

    fn position(&self, handler: usize) -> Option<usize>
    {
        self.slots[..self.len()]
            .iter()
            .position(|slot| slot.handler.load(Ordering::Acquire) == handler)
    }

    /// The entry directly below `handler`
    pub(crate) fn previous_of(&self, handler: usize) -> Option<SigAction>
    {
        match self.position(handler)? {
            0 => None,
            i => Some(self.slots[i - 1].load()),
        }
    }

    pub(crate) fn installed(&self) -> Option<SigAction>
    {
        self.has_installed.load(Ordering::Acquire).then(|| self.installed.load())
    }

    /// Number of new slots `record(replaced, action)` would consume
    fn slots_needed(&self, replaced: SigAction, action: SigAction) -> usize
    {
        let mut needed = 0;
        let replaced_is_top = self.top().is_some_and(|top| top.handler == replaced.handler);
        if !replaced_is_top && self.position(replaced.handler).is_none() {
            needed += 1;
        }
        if action.handler != replaced.handler && self.position(action.handler).is_none() {
            needed += 1;
        }
        needed
    }

    /// Record that `action` replaced `replaced` as the live disposition
    ///
    /// `replaced` normally equals the current top. It differs on first use,
    /// and when something outside this registry changed the disposition; in
    /// both cases it is pushed (or promoted) first so it stays reachable.
    pub(crate) fn record(&self, replaced: SigAction, action: SigAction) -> Result<(), usize>
    {
        if self.len() + self.slots_needed(replaced, action) > CHAIN_CAPACITY {
            return Err(CHAIN_CAPACITY);
        }
        if self.top().map(|top| top.handler) != Some(replaced.handler) {
            self.promote_or_push(replaced);
        }
        self.promote_or_push(action);
        self.installed.store(action);
        self.has_installed.store(true, Ordering::Release);
        Ok(())
    }

    fn promote_or_push(&self, action: SigAction)
    {
        let len = self.len();
        match self.position(action.handler) {
            Some(i) => {
                for j in i..len - 1 {
                    self.slots[j].store(self.slots[j + 1].load());
                }
                self.slots[len - 1].store(action);
            }
            None => {
                self.slots[len].store(action);
                self.len.store(len + 1, Ordering::Release);
            }
        }
    }
}

static REGISTRY: [HandlerChain; SIGNAL_LIMIT] = [HandlerChain::EMPTY; SIGNAL_LIMIT];

static SETUP: Mutex<()> = Mutex::new(());

fn chain(signal: Signal) -> &'static HandlerChain
{
    &REGISTRY[signal.index()]
}

fn chain_raw(signo: c_int) -> Option<&'static HandlerChain>
{
    usize::try_from(signo).ok().and_then(|i| REGISTRY.get(i))
}

/// Swap the OS disposition of `signal` and record the change
///
/// `mask` replaces `sa_mask`; `None` blocks nothing extra. Returns the
/// disposition that was live before the call.
///
/// ## Errors
///
/// - `ChainFull`: the chain has no room; the OS disposition is left alone
/// - `SignalInstall`: `sigaction()` refused the new disposition
pub(crate) fn install(signal: Signal, action: SigAction, mask: Option<libc::sigset_t>) -> FaultlineResult<SigAction>
{
    let _guard = SETUP.lock().unwrap_or_else(PoisonError::into_inner);

    let current = query_locked(signal)?;
    let chain = chain(signal);
    if chain.len() + chain.slots_needed(SigAction::from_raw(current.sa_sigaction, current.sa_flags), action) > CHAIN_CAPACITY {
        return Err(FaultlineError::ChainFull {
            signal,
            capacity: CHAIN_CAPACITY,
        });
    }

    // SAFETY: an all-zero sigaction is valid; every field we rely on is set below.
    let mut new: libc::sigaction = unsafe { mem::zeroed() };
    new.sa_sigaction = action.handler;
    new.sa_flags = action.flags;
    match mask {
        Some(mask) => new.sa_mask = mask,
        // SAFETY: sa_mask is a valid sigset_t owned by `new`.
        None => unsafe {
            libc::sigemptyset(&mut new.sa_mask);
        },
    }

    // SAFETY: both pointers reference live, initialised sigaction structs.
    let mut old: libc::sigaction = unsafe { mem::zeroed() };
    if unsafe { libc::sigaction(signal.raw(), &new, &mut old) } != 0 {
        return Err(FaultlineError::SignalInstall {
            signal,
            source: io::Error::last_os_error(),
        });
    }

    let replaced = SigAction::from_raw(old.sa_sigaction, old.sa_flags);
    chain
        .record(replaced, action)
        .map_err(|capacity| FaultlineError::ChainFull { signal, capacity })?;
    Ok(replaced)
}

/// Current OS disposition of `signal`, including its mask
pub(crate) fn query(signal: Signal) -> FaultlineResult<libc::sigaction>
{
    let _guard = SETUP.lock().unwrap_or_else(PoisonError::into_inner);
    query_locked(signal)
}

fn query_locked(signal: Signal) -> FaultlineResult<libc::sigaction>
{
    // SAFETY: a null `act` only reads the disposition into `old`.
    let mut old: libc::sigaction = unsafe { mem::zeroed() };
    if unsafe { libc::sigaction(signal.raw(), ptr::null(), &mut old) } != 0 {
        return Err(FaultlineError::SignalInstall {
            signal,
            source: io::Error::last_os_error(),
        });
    }
    Ok(old)
}

/// The handler recorded directly below `handler` for `signal`
///
/// `None` if `handler` is not in the chain or is its oldest entry.
pub fn previous_of(signal: Signal, handler: usize) -> Option<SigAction>
{
    chain(signal).previous_of(handler)
}

/// The disposition most recently installed for `signal` through this registry
pub fn installed_action(signal: Signal) -> Option<SigAction>
{
    chain(signal).installed()
}

/// Every disposition recorded for `signal`, oldest first
pub fn chain_of(signal: Signal) -> Vec<SigAction>
{
    chain(signal).entries()
}

/// Hand a signal to the handler below `from`
///
/// Runs inside a signal handler. A real handler is called with the calling
/// convention its flags declare. `SIG_DFL` and `SIG_IGN`, or an empty chain,
/// are applied by resetting the OS disposition: when the handler returns,
/// the faulting instruction runs again and the platform default takes over.
///
/// ## Safety
///
/// `info` and `ucontext` must be the pointers the kernel passed to the
/// currently running handler.
pub(crate) unsafe fn forward(signo: c_int, from: usize, info: *mut siginfo_t, ucontext: *mut c_void)
{
    let previous = chain_raw(signo).and_then(|chain| chain.previous_of(from));
    match previous {
        Some(prev) if !prev.is_default() && !prev.is_ignore() => {
            if prev.is_siginfo() {
                let handler = mem::transmute::<usize, SigInfoHandler>(prev.handler);
                handler(signo, info, ucontext);
            } else {
                let handler = mem::transmute::<usize, SigHandler>(prev.handler);
                handler(signo);
            }
        }
        Some(prev) => restore(signo, prev.handler),
        None => restore(signo, libc::SIG_DFL),
    }
}

/// Reset `signo` to `SIG_DFL`/`SIG_IGN` from inside a handler and raise it
/// again
///
/// The raised signal stays pending while the handler runs and is delivered
/// under the restored disposition once it returns, so a sent fault signal
/// terminates the process the same way a hardware fault does.
/// `sigaction()` and `raise()` are async-signal-safe. The chain is left as is.
unsafe fn restore(signo: c_int, disposition: usize)
{
    let mut act: libc::sigaction = mem::zeroed();
    act.sa_sigaction = disposition;
    libc::sigemptyset(&mut act.sa_mask);
    libc::sigaction(signo, &act, ptr::null_mut());
    libc::raise(signo);
}
