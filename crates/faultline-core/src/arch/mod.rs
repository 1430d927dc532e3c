//! # Architecture Decoders and Load Site Code
//!
//! Each supported instruction set contributes two things:
//!
//! - The three load sites, written as a hand-rolled instruction sequence in a
//!   `global_asm!` block. Every site starts on a 16-byte boundary, fits in 16
//!   bytes, and performs exactly one naturally aligned read. Writing them in
//!   assembly is what makes the decoder's assumptions hold: the compiler can
//!   neither inline, clone, merge, nor reschedule them.
//! - A pure decoder that, given the first four code bytes at a faulting PC,
//!   returns how many bytes the load occupies (or 0 if the bytes are not the
//!   expected load).
//!
//! The decoders are compiled for every architecture so they can be unit
//! tested on any host; only the `global_asm!` blocks are target-specific.
//!
//! ## Load site layout
//!
//! | Site        | Returns on fault | How                                         |
//! |-------------|------------------|---------------------------------------------|
//! | `load`      | null             | dispatcher zeroes the return register        |
//! | `load32`    | default          | load targets the register holding the default |
//! | `load_ptr`  | default          | load targets the register holding the default |

pub mod aarch64;
pub mod arm;
pub mod generic;
pub mod x86;
pub mod x86_64;

use std::ffi::c_void;

use crate::safe_access::LoadSite;
use crate::types::Architecture;

/// Instruction-set specific knowledge about the load sites
///
/// Implementations are zero-sized markers; everything is an associated
/// function so the native decoder can be picked with a type alias.
pub trait LoadDecoder
{
    /// Architecture this decoder understands
    const ARCH: Architecture;

    /// Length of the generic (`load`) site's load instruction, or 0
    fn decode_load(code: [u8; 4]) -> usize;

    /// Length of a default-taking site's load instruction, or 0
    fn decode_load_arg(code: [u8; 4]) -> usize;

    /// Exact bytes the protected load at `site` is assembled to
    ///
    /// Empty when the site is not hand-written for this architecture.
    fn expected_encoding(site: LoadSite) -> &'static [u8];

    /// Offset of the protected load from the site's entry point
    fn load_offset(_site: LoadSite) -> usize
    {
        0
    }
}

#[cfg(all(faultline_native_sites, target_arch = "x86_64"))]
pub type NativeDecoder = x86_64::X86_64Decoder;

#[cfg(all(faultline_native_sites, target_arch = "x86"))]
pub type NativeDecoder = x86::X86Decoder;

#[cfg(all(faultline_native_sites, target_arch = "arm"))]
pub type NativeDecoder = arm::ArmDecoder;

#[cfg(all(faultline_native_sites, target_arch = "aarch64"))]
pub type NativeDecoder = aarch64::Arm64Decoder;

#[cfg(not(faultline_native_sites))]
pub type NativeDecoder = generic::GenericDecoder;

// Symbols defined by the global_asm! block of the native architecture module.
#[cfg(faultline_native_sites)]
extern "C" {
    pub(crate) fn faultline_load(ptr: *const *mut c_void) -> *mut c_void;
    pub(crate) fn faultline_load32(ptr: *const u32, default: u32) -> u32;
    pub(crate) fn faultline_load_ptr(ptr: *const *mut c_void, default: *mut c_void) -> *mut c_void;
}

#[cfg(not(faultline_native_sites))]
pub(crate) use generic::{faultline_load, faultline_load32, faultline_load_ptr};

/// Entry address of a load site's code
pub(crate) fn site_entry(site: LoadSite) -> usize
{
    match site {
        LoadSite::Load => faultline_load as usize,
        LoadSite::Load32 => faultline_load32 as usize,
        LoadSite::LoadPtr => faultline_load_ptr as usize,
    }
}

/// Read the four code bytes starting at `pc`
///
/// ## Safety
///
/// `pc` must point at a load site's protected load. Hand-written sites are
/// padded out to their 16-byte window and no load starts more than 12 bytes
/// in, so the read stays inside mapped, readable text.
pub(crate) unsafe fn code_at(pc: usize) -> [u8; 4]
{
    std::ptr::read_unaligned(pc as *const [u8; 4])
}
