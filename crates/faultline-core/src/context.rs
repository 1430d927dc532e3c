//! # Fault Context
//!
//! A borrowed view of the register snapshot the kernel passes to an
//! `SA_SIGINFO` handler. The dispatcher reads the saved program counter,
//! moves it forward past a faulting load, and for the generic load site
//! zeroes the return-value register. Nothing else in the snapshot is touched.
//!
//! Every accessor is allocation- and lock-free, so the type can be used from
//! inside a signal handler.

use std::ffi::c_void;
use std::marker::PhantomData;

use libc::{siginfo_t, ucontext_t};

use crate::platform;

/// Register snapshot of a thread interrupted by a signal
///
/// Construct one inside a signal handler with [`FaultContext::from_raw`]. The
/// lifetime ties it to the handler invocation that received the pointers.
#[derive(Debug)]
pub struct FaultContext<'a>
{
    info: *mut siginfo_t,
    ucontext: *mut ucontext_t,
    _handler: PhantomData<&'a mut ucontext_t>,
}

impl FaultContext<'_>
{
    /// Wrap the second and third arguments of an `SA_SIGINFO` handler
    ///
    /// Returns `None` if `ucontext` is null.
    ///
    /// ## Safety
    ///
    /// Both pointers must be the ones the kernel passed to the currently
    /// running handler (or null), and must not be used elsewhere while the
    /// returned context is alive.
    pub unsafe fn from_raw(info: *mut siginfo_t, ucontext: *mut c_void) -> Option<Self>
    {
        if ucontext.is_null() {
            return None;
        }
        Some(FaultContext {
            info,
            ucontext: ucontext.cast(),
            _handler: PhantomData,
        })
    }

    /// Saved program counter, or `None` on targets where it is not known
    pub fn pc(&self) -> Option<usize>
    {
        // SAFETY: ucontext is non-null and valid for the handler's duration.
        unsafe { platform::pc(self.ucontext) }
    }

    /// Overwrite the saved program counter
    ///
    /// Returns `false` if this target cannot write it.
    pub fn set_pc(&mut self, pc: usize) -> bool
    {
        // SAFETY: see `pc`. We hold the only reference to the snapshot.
        unsafe { platform::set_pc(self.ucontext, pc) }
    }

    /// Move the saved program counter forward by `bytes`
    pub fn advance_pc(&mut self, bytes: usize) -> bool
    {
        match self.pc() {
            Some(pc) => self.set_pc(pc.wrapping_add(bytes)),
            None => false,
        }
    }

    /// Zero the register holding a function's return value
    ///
    /// `rax`/`eax` on x86, `x0`/`r0` on ARM.
    pub fn clear_return_value(&mut self) -> bool
    {
        // SAFETY: see `set_pc`.
        unsafe { platform::clear_return_value(self.ucontext) }
    }

    /// Data address whose access raised the fault, if the kernel reported one
    pub fn fault_address(&self) -> Option<usize>
    {
        if self.info.is_null() {
            return None;
        }
        // SAFETY: info is non-null and points at the handler's siginfo_t.
        let addr = unsafe { platform::fault_address(self.info) };
        Some(addr)
    }
}
