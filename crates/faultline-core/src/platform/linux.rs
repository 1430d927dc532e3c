//! # Linux Platform Support
//!
//! Register access on the `ucontext_t` the kernel hands to `SA_SIGINFO`
//! handlers, and thread-directed signal delivery through `tgkill(2)`.
//!
//! ## References
//!
//! - [sigaction(2) man page](https://man7.org/linux/man-pages/man2/sigaction.2.html)
//! - [tgkill(2) man page](https://man7.org/linux/man-pages/man2/tgkill.2.html)
//! - [signal(7) man page](https://man7.org/linux/man-pages/man7/signal.7.html)

use std::io;

use libc::{siginfo_t, ucontext_t};

/// Whether `pc`, `set_pc` and `clear_return_value` reach real registers
pub(crate) const CONTEXT_REGISTERS: bool = cfg!(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64",
    target_arch = "arm",
    target_arch = "riscv64"
));

/// Saved program counter
#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn pc(uc: *const ucontext_t) -> Option<usize>
{
    Some((*uc).uc_mcontext.gregs[libc::REG_RIP as usize] as usize)
}

#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn set_pc(uc: *mut ucontext_t, pc: usize) -> bool
{
    (*uc).uc_mcontext.gregs[libc::REG_RIP as usize] = pc as libc::greg_t;
    true
}

#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn clear_return_value(uc: *mut ucontext_t) -> bool
{
    (*uc).uc_mcontext.gregs[libc::REG_RAX as usize] = 0;
    true
}

#[cfg(target_arch = "x86")]
pub(crate) unsafe fn pc(uc: *const ucontext_t) -> Option<usize>
{
    Some((*uc).uc_mcontext.gregs[libc::REG_EIP as usize] as usize)
}

#[cfg(target_arch = "x86")]
pub(crate) unsafe fn set_pc(uc: *mut ucontext_t, pc: usize) -> bool
{
    (*uc).uc_mcontext.gregs[libc::REG_EIP as usize] = pc as libc::greg_t;
    true
}

#[cfg(target_arch = "x86")]
pub(crate) unsafe fn clear_return_value(uc: *mut ucontext_t) -> bool
{
    (*uc).uc_mcontext.gregs[libc::REG_EAX as usize] = 0;
    true
}

#[cfg(target_arch = "aarch64")]
pub(crate) unsafe fn pc(uc: *const ucontext_t) -> Option<usize>
{
    Some((*uc).uc_mcontext.pc as usize)
}

#[cfg(target_arch = "aarch64")]
pub(crate) unsafe fn set_pc(uc: *mut ucontext_t, pc: usize) -> bool
{
    (*uc).uc_mcontext.pc = pc as u64;
    true
}

#[cfg(target_arch = "aarch64")]
pub(crate) unsafe fn clear_return_value(uc: *mut ucontext_t) -> bool
{
    (*uc).uc_mcontext.regs[0] = 0;
    true
}

#[cfg(target_arch = "arm")]
pub(crate) unsafe fn pc(uc: *const ucontext_t) -> Option<usize>
{
    Some((*uc).uc_mcontext.arm_pc as usize)
}

#[cfg(target_arch = "arm")]
pub(crate) unsafe fn set_pc(uc: *mut ucontext_t, pc: usize) -> bool
{
    (*uc).uc_mcontext.arm_pc = pc as libc::c_ulong;
    true
}

#[cfg(target_arch = "arm")]
pub(crate) unsafe fn clear_return_value(uc: *mut ucontext_t) -> bool
{
    (*uc).uc_mcontext.arm_r0 = 0;
    true
}

// `__gregs[0]` holds the pc and `__gregs[1..32]` are x1..x31.
#[cfg(target_arch = "riscv64")]
const RISCV_REG_PC: usize = 0;

#[cfg(target_arch = "riscv64")]
const RISCV_REG_A0: usize = 10;

#[cfg(target_arch = "riscv64")]
pub(crate) unsafe fn pc(uc: *const ucontext_t) -> Option<usize>
{
    Some((*uc).uc_mcontext.__gregs[RISCV_REG_PC] as usize)
}

#[cfg(target_arch = "riscv64")]
pub(crate) unsafe fn set_pc(uc: *mut ucontext_t, pc: usize) -> bool
{
    (*uc).uc_mcontext.__gregs[RISCV_REG_PC] = pc as libc::c_ulong;
    true
}

#[cfg(target_arch = "riscv64")]
pub(crate) unsafe fn clear_return_value(uc: *mut ucontext_t) -> bool
{
    (*uc).uc_mcontext.__gregs[RISCV_REG_A0] = 0;
    true
}

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64",
    target_arch = "arm",
    target_arch = "riscv64"
)))]
pub(crate) unsafe fn pc(_uc: *const ucontext_t) -> Option<usize>
{
    None
}

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64",
    target_arch = "arm",
    target_arch = "riscv64"
)))]
pub(crate) unsafe fn set_pc(_uc: *mut ucontext_t, _pc: usize) -> bool
{
    false
}

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64",
    target_arch = "arm",
    target_arch = "riscv64"
)))]
pub(crate) unsafe fn clear_return_value(_uc: *mut ucontext_t) -> bool
{
    false
}

/// Faulting data address reported by the kernel
pub(crate) unsafe fn fault_address(info: *const siginfo_t) -> usize
{
    (*info).si_addr() as usize
}

/// Kernel thread ID of the caller
#[allow(clippy::cast_sign_loss)]
pub(crate) fn current_thread_id() -> u64
{
    // SAFETY: gettid takes no arguments and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as u64 }
}

/// Send `signo` to thread `tid` of this process
///
/// `tgkill` (rather than `tkill`) pins the target to our thread group, so a
/// recycled TID belonging to another process is never hit.
pub(crate) fn send_signal_to_thread(tid: u64, signo: i32) -> io::Result<()>
{
    let tid = libc::pid_t::try_from(tid).map_err(|_| io::Error::from_raw_os_error(libc::ESRCH))?;
    // SAFETY: tgkill only reads its integer arguments.
    let rc = unsafe { libc::syscall(libc::SYS_tgkill, libc::getpid(), tid, signo) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Signals a profiler may claim on Linux, as a bitmask indexed by number
///
/// `SIGPROF`, `SIGVTALRM`, the two unused legacy signals `SIGSTKFLT` and
/// `SIGPWR`, and every real-time signal from `SIGRTMIN` up.
pub(crate) fn allowed_profiling_signals() -> u64
{
    let rtmin = libc::SIGRTMIN();
    let realtime = if (0..64).contains(&rtmin) { u64::MAX << rtmin } else { 0 };
    1u64 << libc::SIGPROF | 1u64 << libc::SIGVTALRM | 1u64 << libc::SIGSTKFLT | 1u64 << libc::SIGPWR | realtime
}
