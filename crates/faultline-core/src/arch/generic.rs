//! # Generic Fallback
//!
//! Used on architectures without hand-written load sites. The sites are plain
//! Rust functions doing one volatile read, so the compiler decides their
//! layout. The decoder assumes the load is the first instruction, which holds
//! in optimized builds, and sizes it from the encoding where the instruction
//! set allows it (RISC-V marks compressed instructions in the low two bits)
//! and from the nominal width otherwise. It has no way to preserve a default
//! across a skipped load, so faults in the default-taking sites are never
//! recovered here. The self-check reports every site as unverified.
//!
//! Recovery also needs register access in the signal context, which exists
//! for riscv64 Linux. On every other fallback target the dispatcher forwards
//! all faults.

use std::ffi::c_void;

use super::LoadDecoder;
use crate::safe_access::LoadSite;
use crate::types::Architecture;

/// Fallback decoder
pub struct GenericDecoder;

impl LoadDecoder for GenericDecoder
{
    const ARCH: Architecture = Architecture::current();

    fn decode_load(code: [u8; 4]) -> usize
    {
        instruction_length(Self::ARCH, code)
    }

    fn decode_load_arg(_code: [u8; 4]) -> usize
    {
        0
    }

    fn expected_encoding(_site: LoadSite) -> &'static [u8]
    {
        &[]
    }
}

/// Length of the instruction starting with `code` on `arch`
fn instruction_length(arch: Architecture, code: [u8; 4]) -> usize
{
    match arch {
        Architecture::Unknown("riscv64" | "riscv32") if code[0] & 0b11 != 0b11 => 2,
        _ => arch.nominal_instruction_width(),
    }
}

#[cfg_attr(faultline_native_sites, allow(dead_code))]
#[inline(never)]
pub(crate) unsafe extern "C" fn faultline_load(ptr: *const *mut c_void) -> *mut c_void
{
    ptr.read_volatile()
}

#[cfg_attr(faultline_native_sites, allow(dead_code))]
#[inline(never)]
pub(crate) unsafe extern "C" fn faultline_load32(ptr: *const u32, _default: u32) -> u32
{
    ptr.read_volatile()
}

#[cfg_attr(faultline_native_sites, allow(dead_code))]
#[inline(never)]
pub(crate) unsafe extern "C" fn faultline_load_ptr(ptr: *const *mut c_void, _default: *mut c_void) -> *mut c_void
{
    ptr.read_volatile()
}
