//! # Protected Loads
//!
//! The three load sites are the only places in the process where a fault is
//! considered recoverable. Each performs a single raw read; if the read faults
//! while fault recovery is enabled, the dispatcher skips the load and the
//! function returns a default instead.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::ptr;
//!
//! use faultline_core::recovery::enable_fault_recovery;
//! use faultline_core::safe_access;
//!
//! enable_fault_recovery()?;
//!
//! let bogus = 0x10 as *const *mut std::ffi::c_void;
//! assert!(safe_access::load(bogus).is_null());
//!
//! let value = 7u32;
//! assert_eq!(safe_access::load32(&value, 42), 7);
//! # Ok::<(), faultline_core::error::FaultlineError>(())
//! ```
//!
//! ## What "safe" means here
//!
//! These functions are safe to call with any address. With fault recovery
//! enabled, an unreadable address yields the default. Without it, the process
//! dies exactly as it would on any other wild read. Either way no memory is
//! written and the read is a single naturally aligned access, so a racing
//! writer can be observed before or after its store but never torn.

use std::ffi::c_void;
use std::fmt;

use crate::arch::{self, LoadDecoder, NativeDecoder};
use crate::types::Address;

/// Size of the address window that counts as "inside" a load site
///
/// Hand-written sites are 16-byte aligned and no longer than this, so windows
/// never overlap. The generic fallback has no layout guarantee and only
/// claims the first instruction.
pub const LOAD_SITE_WINDOW: usize = if NATIVE_LOAD_SITES { 16 } else { 4 };

/// Whether this target has hand-written load sites
///
/// Without them a fault in [`load32`] or [`load_ptr`] is forwarded like any
/// other crash, and a fault in [`load`] is recovered only where
/// [`LOAD_RECOVERABLE`] holds.
pub const NATIVE_LOAD_SITES: bool = cfg!(faultline_native_sites);

/// Whether a fault in [`load`] can be recovered on this target
///
/// Needs register access in the signal context. Every native target has it;
/// among the fallback targets only riscv64 Linux does, and there the load
/// must be the first instruction of the site, as it is in optimized builds.
pub const LOAD_RECOVERABLE: bool = crate::platform::CONTEXT_REGISTERS;

/// One of the three protected load functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadSite
{
    /// `load(ptr)`: pointer load, null on fault
    Load,
    /// `load32(ptr, default)`: 32-bit load, `default` on fault
    Load32,
    /// `load_ptr(ptr, default)`: pointer load, `default` on fault
    LoadPtr,
}

impl LoadSite
{
    /// Every load site
    pub const ALL: [LoadSite; 3] = [LoadSite::Load, LoadSite::Load32, LoadSite::LoadPtr];

    /// Entry address of the site's machine code
    pub fn address(self) -> Address
    {
        Address::from(arch::site_entry(self))
    }

    /// Symbol name the site is exported under (without platform prefix)
    pub const fn symbol(self) -> &'static str
    {
        match self {
            LoadSite::Load => "faultline_load",
            LoadSite::Load32 => "faultline_load32",
            LoadSite::LoadPtr => "faultline_load_ptr",
        }
    }

    /// Whether the caller supplies the value returned on fault
    pub const fn takes_default(self) -> bool
    {
        matches!(self, LoadSite::Load32 | LoadSite::LoadPtr)
    }

    /// Whether `pc` falls inside this site's window
    pub fn contains(self, pc: usize) -> bool
    {
        pc.wrapping_sub(arch::site_entry(self)) < LOAD_SITE_WINDOW
    }

    /// The site whose window contains `pc`, if any
    pub fn containing(pc: usize) -> Option<LoadSite>
    {
        LoadSite::ALL.into_iter().find(|site| site.contains(pc))
    }

    /// Address of the protected load instruction itself
    pub fn load_address(self) -> Address
    {
        self.address() + NativeDecoder::load_offset(self) as u64
    }
}

impl fmt::Display for LoadSite
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.symbol())
    }
}

/// Load a pointer, or null if `ptr` cannot be read
#[inline]
pub fn load(ptr: *const *mut c_void) -> *mut c_void
{
    // SAFETY: the load site performs one read of `ptr`. An unreadable address
    // either resumes with null (recovery enabled) or terminates the process.
    unsafe { arch::faultline_load(ptr) }
}

/// Load a `u32`, or `default` if `ptr` cannot be read
#[inline]
pub fn load32(ptr: *const u32, default: u32) -> u32
{
    // SAFETY: see `load`.
    unsafe { arch::faultline_load32(ptr, default) }
}

/// Load a pointer, or `default` if `ptr` cannot be read
#[inline]
pub fn load_ptr(ptr: *const *mut c_void, default: *mut c_void) -> *mut c_void
{
    // SAFETY: see `load`.
    unsafe { arch::faultline_load_ptr(ptr, default) }
}

/// Bytes to skip for a fault at `pc` in the generic `load` site
///
/// Returns 0 when `pc` is outside that site's window, or when the bytes at
/// `pc` are not the load the decoder expects.
pub fn skip_load(pc: usize) -> usize
{
    if !LoadSite::Load.contains(pc) {
        return 0;
    }
    // SAFETY: pc is inside the load site window.
    NativeDecoder::decode_load(unsafe { arch::code_at(pc) })
}

/// Bytes to skip for a fault at `pc` in `load32` or `load_ptr`
///
/// Returns 0 outside those two windows. Skipping these loads leaves the
/// caller's default in the result register, so no further fix-up is needed.
pub fn skip_load_arg(pc: usize) -> usize
{
    if !LoadSite::Load32.contains(pc) && !LoadSite::LoadPtr.contains(pc) {
        return 0;
    }
    // SAFETY: pc is inside a load site window.
    NativeDecoder::decode_load_arg(unsafe { arch::code_at(pc) })
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_windows_are_disjoint()
    {
        for a in LoadSite::ALL {
            for b in LoadSite::ALL {
                if a != b {
                    assert!(!a.contains(arch::site_entry(b)), "{a} window covers {b}");
                }
            }
        }
    }

    #[test]
    fn test_containing_finds_each_site()
    {
        for site in LoadSite::ALL {
            let entry = arch::site_entry(site);
            assert_eq!(LoadSite::containing(entry), Some(site));
            assert_eq!(LoadSite::containing(entry + LOAD_SITE_WINDOW - 1), Some(site));
        }
    }

    #[test]
    fn test_skip_is_zero_outside_windows()
    {
        let elsewhere = test_skip_is_zero_outside_windows as usize;
        assert_eq!(skip_load(elsewhere), 0);
        assert_eq!(skip_load_arg(elsewhere), 0);
        assert_eq!(skip_load(0), 0);
    }

    #[test]
    fn test_skip_load_and_skip_load_arg_do_not_overlap()
    {
        let load_pc = LoadSite::Load.load_address().as_usize();
        assert_eq!(skip_load_arg(load_pc), 0);

        let load32_pc = LoadSite::Load32.load_address().as_usize();
        assert_eq!(skip_load(load32_pc), 0);
    }

    #[test]
    fn test_native_sites_have_register_access()
    {
        if NATIVE_LOAD_SITES {
            assert!(LOAD_RECOVERABLE);
        }
        assert_eq!(
            LOAD_RECOVERABLE,
            NATIVE_LOAD_SITES || cfg!(all(any(target_os = "linux", target_os = "android"), target_arch = "riscv64"))
        );
    }

    #[test]
    fn test_valid_reads_return_the_value()
    {
        let value = 0xdead_beefu32;
        assert_eq!(load32(&value, 1), 0xdead_beef);

        let mut target = 5u8;
        let slot: *mut c_void = (&mut target as *mut u8).cast();
        assert_eq!(load(&slot), slot);
        assert_eq!(load_ptr(&slot, std::ptr::null_mut()), slot);
    }
}
