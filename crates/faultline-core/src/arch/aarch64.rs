//! # AArch64 Load Sites
//!
//! AAPCS64: `ptr` in `x0`, `default` in `x1`/`w1`, result in `x0`/`w0`.
//!
//! ```text
//! faultline_load:      f9400000  ldr x0, [x0]
//!                      d65f03c0  ret
//! faultline_load32:    b9400001  ldr w1, [x0]       ; default lives in w1
//!                      2a0103e0  mov w0, w1
//!                      d65f03c0  ret
//! faultline_load_ptr:  f9400001  ldr x1, [x0]       ; default lives in x1
//!                      aa0103e0  mov x0, x1
//!                      d65f03c0  ret
//! ```

use super::LoadDecoder;
use crate::safe_access::LoadSite;
use crate::types::Architecture;

/// Width of every A64 instruction
const INSTRUCTION_SIZE: usize = 4;

/// AArch64 decoder
pub struct Arm64Decoder;

impl LoadDecoder for Arm64Decoder
{
    const ARCH: Architecture = Architecture::Arm64;

    fn decode_load(code: [u8; 4]) -> usize
    {
        // ldr x0, [xN, #imm]
        let insn = u32::from_le_bytes(code);
        if insn & 0xffc0_001f == 0xf940_0000 {
            INSTRUCTION_SIZE
        } else {
            0
        }
    }

    fn decode_load_arg(code: [u8; 4]) -> usize
    {
        // ldr w1, [xN, #imm] or ldr x1, [xN, #imm]; bit 30 selects the width
        let insn = u32::from_le_bytes(code);
        if insn & 0xbfc0_001f == 0xb940_0001 {
            INSTRUCTION_SIZE
        } else {
            0
        }
    }

    fn expected_encoding(site: LoadSite) -> &'static [u8]
    {
        match site {
            LoadSite::Load => &[0x00, 0x00, 0x40, 0xf9],
            LoadSite::Load32 => &[0x01, 0x00, 0x40, 0xb9],
            LoadSite::LoadPtr => &[0x01, 0x00, 0x40, 0xf9],
        }
    }
}

// Mach-O has no `.type`/`.size`; ELF needs both for the sites to be
// function symbols with a size.
#[cfg(all(faultline_native_sites, target_arch = "aarch64", target_vendor = "apple"))]
core::arch::global_asm!(
    ".text",
    ".p2align 4",
    ".globl _faultline_load",
    "_faultline_load:",
    "ldr x0, [x0]",
    "ret",
    ".p2align 4",
    ".globl _faultline_load32",
    "_faultline_load32:",
    "ldr w1, [x0]",
    "mov w0, w1",
    "ret",
    ".p2align 4",
    ".globl _faultline_load_ptr",
    "_faultline_load_ptr:",
    "ldr x1, [x0]",
    "mov x0, x1",
    "ret",
    ".p2align 4",
);

#[cfg(all(faultline_native_sites, target_arch = "aarch64", not(target_vendor = "apple")))]
core::arch::global_asm!(
    ".text",
    ".p2align 4",
    ".globl faultline_load",
    ".type faultline_load, %function",
    "faultline_load:",
    "ldr x0, [x0]",
    "ret",
    ".size faultline_load, . - faultline_load",
    ".p2align 4",
    ".globl faultline_load32",
    ".type faultline_load32, %function",
    "faultline_load32:",
    "ldr w1, [x0]",
    "mov w0, w1",
    "ret",
    ".size faultline_load32, . - faultline_load32",
    ".p2align 4",
    ".globl faultline_load_ptr",
    ".type faultline_load_ptr, %function",
    "faultline_load_ptr:",
    "ldr x1, [x0]",
    "mov x0, x1",
    "ret",
    ".size faultline_load_ptr, . - faultline_load_ptr",
    ".p2align 4",
);

#[cfg(test)]
mod tests
{
    use super::*;

    fn bytes(insn: u32) -> [u8; 4]
    {
        insn.to_le_bytes()
    }

    #[test]
    fn test_decode_load_x0()
    {
        assert_eq!(Arm64Decoder::decode_load(bytes(0xf940_0000)), 4);
        // ldr x0, [x3, #16]
        assert_eq!(Arm64Decoder::decode_load(bytes(0xf940_0860)), 4);
    }

    #[test]
    fn test_decode_load_rejects_other_destinations()
    {
        // ldr x1, [x0]
        assert_eq!(Arm64Decoder::decode_load(bytes(0xf940_0001)), 0);
        // ldr w0, [x0]
        assert_eq!(Arm64Decoder::decode_load(bytes(0xb940_0000)), 0);
        // ret
        assert_eq!(Arm64Decoder::decode_load(bytes(0xd65f_03c0)), 0);
    }

    #[test]
    fn test_decode_load_arg_both_widths()
    {
        assert_eq!(Arm64Decoder::decode_load_arg(bytes(0xb940_0001)), 4);
        assert_eq!(Arm64Decoder::decode_load_arg(bytes(0xf940_0001)), 4);
        assert_eq!(Arm64Decoder::decode_load_arg(bytes(0xf940_0000)), 0);
    }

    #[test]
    fn test_expected_encodings_match_decoder()
    {
        assert_eq!(Arm64Decoder::decode_load(bytes(0xf940_0000)), 4);
        assert_eq!(Arm64Decoder::expected_encoding(LoadSite::Load), &bytes(0xf940_0000));
        assert_eq!(Arm64Decoder::expected_encoding(LoadSite::Load32), &bytes(0xb940_0001));
        assert_eq!(Arm64Decoder::expected_encoding(LoadSite::LoadPtr), &bytes(0xf940_0001));
    }
}
