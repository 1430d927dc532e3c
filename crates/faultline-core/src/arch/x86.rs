//! # x86-32 Load Sites
//!
//! cdecl passes arguments on the stack, so each site first fetches them into
//! registers. Those fetches read the caller's own stack and cannot fault; the
//! protected load is the instruction after them.
//!
//! ```text
//! faultline_load:      8b 44 24 04  mov eax, [esp+4]
//!                      8b 00        mov eax, [eax]      ; protected
//!                      c3           ret
//! faultline_load32:    8b 44 24 08  mov eax, [esp+8]    ; default
//!                      8b 4c 24 04  mov ecx, [esp+4]    ; ptr
//!                      8b 01        mov eax, [ecx]      ; protected
//!                      c3           ret
//! faultline_load_ptr:  (same as faultline_load32)
//! ```

use super::LoadDecoder;
use crate::safe_access::LoadSite;
use crate::types::Architecture;

/// x86-32 decoder
pub struct X86Decoder;

/// `8b /r` with `mod == 00` and neither SIB nor disp32 addressing
fn decode_register_indirect_mov(code: [u8; 4]) -> usize
{
    let modrm = code[1];
    let rm = modrm & 0b111;
    if code[0] == 0x8b && modrm >> 6 == 0b00 && rm != 0b100 && rm != 0b101 {
        2
    } else {
        0
    }
}

impl LoadDecoder for X86Decoder
{
    const ARCH: Architecture = Architecture::X86;

    fn decode_load(code: [u8; 4]) -> usize
    {
        decode_register_indirect_mov(code)
    }

    fn decode_load_arg(code: [u8; 4]) -> usize
    {
        decode_register_indirect_mov(code)
    }

    fn expected_encoding(site: LoadSite) -> &'static [u8]
    {
        match site {
            LoadSite::Load => &[0x8b, 0x00],
            LoadSite::Load32 | LoadSite::LoadPtr => &[0x8b, 0x01],
        }
    }

    fn load_offset(site: LoadSite) -> usize
    {
        match site {
            LoadSite::Load => 4,
            LoadSite::Load32 | LoadSite::LoadPtr => 8,
        }
    }
}

#[cfg(all(faultline_native_sites, target_arch = "x86"))]
core::arch::global_asm!(
    ".text",
    ".p2align 4",
    ".globl faultline_load",
    ".type faultline_load, @function",
    "faultline_load:",
    "mov eax, dword ptr [esp + 4]",
    "mov eax, dword ptr [eax]",
    "ret",
    ".size faultline_load, . - faultline_load",
    ".p2align 4",
    ".globl faultline_load32",
    ".type faultline_load32, @function",
    "faultline_load32:",
    "mov eax, dword ptr [esp + 8]",
    "mov ecx, dword ptr [esp + 4]",
    "mov eax, dword ptr [ecx]",
    "ret",
    ".size faultline_load32, . - faultline_load32",
    ".p2align 4",
    ".globl faultline_load_ptr",
    ".type faultline_load_ptr, @function",
    "faultline_load_ptr:",
    "mov eax, dword ptr [esp + 8]",
    "mov ecx, dword ptr [esp + 4]",
    "mov eax, dword ptr [ecx]",
    "ret",
    ".size faultline_load_ptr, . - faultline_load_ptr",
    ".p2align 4",
);
