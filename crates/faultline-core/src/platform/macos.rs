//! # macOS Platform Support
//!
//! Register access through `uc_mcontext` (a pointer to the Darwin machine
//! context on this platform) and thread-directed delivery through
//! `pthread_kill(3)` on the pthread that owns a Mach thread port.
//!
//! ## References
//!
//! - [pthread_kill(3)](https://developer.apple.com/library/archive/documentation/System/Conceptual/ManPages_iPhoneOS/man3/pthread_kill.3.html)
//! - [sigaction(2)](https://developer.apple.com/library/archive/documentation/System/Conceptual/ManPages_iPhoneOS/man2/sigaction.2.html)

use std::io;

use libc::{siginfo_t, ucontext_t};

/// Whether `pc`, `set_pc` and `clear_return_value` reach real registers
pub(crate) const CONTEXT_REGISTERS: bool = cfg!(any(target_arch = "x86_64", target_arch = "aarch64"));

mod ffi
{
    use libc::{mach_port_t, pthread_t};

    extern "C" {
        /// Mach thread port of a pthread
        pub fn pthread_mach_thread_np(thread: pthread_t) -> mach_port_t;

        /// Pthread owning a Mach thread port, or 0 if none does
        pub fn pthread_from_mach_thread_np(port: mach_port_t) -> pthread_t;
    }
}

#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn pc(uc: *const ucontext_t) -> Option<usize>
{
    let mcontext = (*uc).uc_mcontext;
    if mcontext.is_null() {
        return None;
    }
    Some((*mcontext).__ss.__rip as usize)
}

#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn set_pc(uc: *mut ucontext_t, pc: usize) -> bool
{
    let mcontext = (*uc).uc_mcontext;
    if mcontext.is_null() {
        return false;
    }
    (*mcontext).__ss.__rip = pc as u64;
    true
}

#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn clear_return_value(uc: *mut ucontext_t) -> bool
{
    let mcontext = (*uc).uc_mcontext;
    if mcontext.is_null() {
        return false;
    }
    (*mcontext).__ss.__rax = 0;
    true
}

#[cfg(target_arch = "aarch64")]
pub(crate) unsafe fn pc(uc: *const ucontext_t) -> Option<usize>
{
    let mcontext = (*uc).uc_mcontext;
    if mcontext.is_null() {
        return None;
    }
    Some((*mcontext).__ss.__pc as usize)
}

#[cfg(target_arch = "aarch64")]
pub(crate) unsafe fn set_pc(uc: *mut ucontext_t, pc: usize) -> bool
{
    let mcontext = (*uc).uc_mcontext;
    if mcontext.is_null() {
        return false;
    }
    (*mcontext).__ss.__pc = pc as u64;
    true
}

#[cfg(target_arch = "aarch64")]
pub(crate) unsafe fn clear_return_value(uc: *mut ucontext_t) -> bool
{
    let mcontext = (*uc).uc_mcontext;
    if mcontext.is_null() {
        return false;
    }
    (*mcontext).__ss.__x[0] = 0;
    true
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) unsafe fn pc(_uc: *const ucontext_t) -> Option<usize>
{
    None
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) unsafe fn set_pc(_uc: *mut ucontext_t, _pc: usize) -> bool
{
    false
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) unsafe fn clear_return_value(_uc: *mut ucontext_t) -> bool
{
    false
}

/// Faulting data address reported by the kernel
pub(crate) unsafe fn fault_address(info: *const siginfo_t) -> usize
{
    (*info).si_addr as usize
}

/// Mach port of the calling thread
pub(crate) fn current_thread_id() -> u64
{
    // SAFETY: pthread_self() is always valid for the calling thread.
    let port = unsafe { ffi::pthread_mach_thread_np(libc::pthread_self()) };
    u64::from(port)
}

/// Send `signo` to the pthread owning Mach port `port`
pub(crate) fn send_signal_to_thread(port: u64, signo: i32) -> io::Result<()>
{
    let port = libc::mach_port_t::try_from(port).map_err(|_| io::Error::from_raw_os_error(libc::ESRCH))?;
    // SAFETY: the lookup only reads the port number.
    let thread = unsafe { ffi::pthread_from_mach_thread_np(port) };
    if thread == 0 {
        return Err(io::Error::from_raw_os_error(libc::ESRCH));
    }
    // SAFETY: `thread` was just resolved from a live port.
    match unsafe { libc::pthread_kill(thread, signo) } {
        0 => Ok(()),
        errno => Err(io::Error::from_raw_os_error(errno)),
    }
}

/// Signals a profiler may claim on macOS
///
/// There are no spare real-time signals, so only the two timer signals.
pub(crate) fn allowed_profiling_signals() -> u64
{
    1u64 << libc::SIGPROF | 1u64 << libc::SIGVTALRM
}
