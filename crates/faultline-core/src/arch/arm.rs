//! # ARM (A32) Load Sites
//!
//! AAPCS: `ptr` in `r0`, `default` in `r1`, result in `r0`. The sites are
//! assembled in A32 state even on Thumb-default targets; `.type %function`
//! lets the linker insert interworking calls.
//!
//! ```text
//! faultline_load:      e5900000  ldr r0, [r0]
//!                      e12fff1e  bx lr
//! faultline_load32:    e5901000  ldr r1, [r0]       ; default lives in r1
//!                      e1a00001  mov r0, r1
//!                      e12fff1e  bx lr
//! faultline_load_ptr:  (same as faultline_load32)
//! ```

use super::LoadDecoder;
use crate::safe_access::LoadSite;
use crate::types::Architecture;

/// Width of every A32 instruction
const INSTRUCTION_SIZE: usize = 4;

/// Single data transfer, load, word, with the destination register field kept
const LDR_RD_MASK: u32 = 0x0e50_f000;

/// ARM decoder
pub struct ArmDecoder;

impl LoadDecoder for ArmDecoder
{
    const ARCH: Architecture = Architecture::Arm;

    fn decode_load(code: [u8; 4]) -> usize
    {
        // ldr r0, [rN]
        if u32::from_le_bytes(code) & LDR_RD_MASK == 0x0410_0000 {
            INSTRUCTION_SIZE
        } else {
            0
        }
    }

    fn decode_load_arg(code: [u8; 4]) -> usize
    {
        // ldr r1, [rN]
        if u32::from_le_bytes(code) & LDR_RD_MASK == 0x0410_1000 {
            INSTRUCTION_SIZE
        } else {
            0
        }
    }

    fn expected_encoding(site: LoadSite) -> &'static [u8]
    {
        match site {
            LoadSite::Load => &[0x00, 0x00, 0x90, 0xe5],
            LoadSite::Load32 | LoadSite::LoadPtr => &[0x00, 0x10, 0x90, 0xe5],
        }
    }
}

#[cfg(all(faultline_native_sites, target_arch = "arm"))]
core::arch::global_asm!(
    ".text",
    ".arm",
    ".p2align 4",
    ".globl faultline_load",
    ".type faultline_load, %function",
    "faultline_load:",
    "ldr r0, [r0]",
    "bx lr",
    ".size faultline_load, . - faultline_load",
    ".p2align 4",
    ".globl faultline_load32",
    ".type faultline_load32, %function",
    "faultline_load32:",
    "ldr r1, [r0]",
    "mov r0, r1",
    "bx lr",
    ".size faultline_load32, . - faultline_load32",
    ".p2align 4",
    ".globl faultline_load_ptr",
    ".type faultline_load_ptr, %function",
    "faultline_load_ptr:",
    "ldr r1, [r0]",
    "mov r0, r1",
    "bx lr",
    ".size faultline_load_ptr, . - faultline_load_ptr",
    ".p2align 4",
);

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_decode_load_r0()
    {
        assert_eq!(ArmDecoder::decode_load(0xe590_0000u32.to_le_bytes()), 4);
        // ldrne r0, [r2, #8]: any condition, any base, immediate offset
        assert_eq!(ArmDecoder::decode_load(0x1592_0008u32.to_le_bytes()), 4);
    }

    #[test]
    fn test_decode_load_rejects_byte_loads_and_stores()
    {
        // ldrb r0, [r0]
        assert_eq!(ArmDecoder::decode_load(0xe5d0_0000u32.to_le_bytes()), 0);
        // str r0, [r0]
        assert_eq!(ArmDecoder::decode_load(0xe580_0000u32.to_le_bytes()), 0);
    }

    #[test]
    fn test_decode_load_arg_r1()
    {
        assert_eq!(ArmDecoder::decode_load_arg(0xe590_1000u32.to_le_bytes()), 4);
        assert_eq!(ArmDecoder::decode_load_arg(0xe590_0000u32.to_le_bytes()), 0);
        assert_eq!(ArmDecoder::decode_load(0xe590_1000u32.to_le_bytes()), 0);
    }
}
