//! # x86-64 Load Sites
//!
//! System V calling convention: `ptr` arrives in `rdi`, `default` in
//! `rsi`/`esi`, the result leaves in `rax`/`eax`.
//!
//! ```text
//! faultline_load:      48 8b 07     mov rax, [rdi]
//!                      c3           ret
//! faultline_load32:    8b 37        mov esi, [rdi]     ; default lives in esi
//!                      89 f0        mov eax, esi
//!                      c3           ret
//! faultline_load_ptr:  48 8b 37     mov rsi, [rdi]     ; default lives in rsi
//!                      48 89 f0     mov rax, rsi
//!                      c3           ret
//! ```
//!
//! The default-taking sites load straight into the register that holds the
//! default, so skipping a faulting load leaves the default in place.

use super::LoadDecoder;
use crate::safe_access::LoadSite;
use crate::types::Architecture;

/// `mov r32/r64, r/m` opcode
const MOV_LOAD_OPCODE: u8 = 0x8b;

/// x86-64 decoder
pub struct X86_64Decoder;

/// Decode `[REX.W] 8b /r` with a plain register-indirect operand
///
/// Only ModRM `mod == 00` forms without SIB (`r/m == 100`) or RIP-relative
/// displacement (`r/m == 101`) are accepted; those are the only forms the
/// load sites use, and anything else means the code is not ours.
fn decode_register_indirect_mov(code: [u8; 4], require_rex_w: bool) -> usize
{
    let has_rex_w = code[0] & 0xf8 == 0x48;
    if require_rex_w && !has_rex_w {
        return 0;
    }

    let prefix = usize::from(has_rex_w);
    let opcode = code[prefix];
    let modrm = code[prefix + 1];
    if opcode != MOV_LOAD_OPCODE {
        return 0;
    }

    let mode = modrm >> 6;
    let rm = modrm & 0b111;
    if mode != 0b00 || rm == 0b100 || rm == 0b101 {
        return 0;
    }

    prefix + 2
}

impl LoadDecoder for X86_64Decoder
{
    const ARCH: Architecture = Architecture::X86_64;

    fn decode_load(code: [u8; 4]) -> usize
    {
        // mov rax, [reg]
        decode_register_indirect_mov(code, true)
    }

    fn decode_load_arg(code: [u8; 4]) -> usize
    {
        // mov esi, [reg] or mov rsi, [reg]
        decode_register_indirect_mov(code, false)
    }

    fn expected_encoding(site: LoadSite) -> &'static [u8]
    {
        match site {
            LoadSite::Load => &[0x48, 0x8b, 0x07],
            LoadSite::Load32 => &[0x8b, 0x37],
            LoadSite::LoadPtr => &[0x48, 0x8b, 0x37],
        }
    }
}

// Mach-O has no `.type`/`.size`; ELF needs both for the sites to be
// function symbols with a size.
#[cfg(all(faultline_native_sites, target_arch = "x86_64", target_vendor = "apple"))]
core::arch::global_asm!(
    ".text",
    ".p2align 4",
    ".globl _faultline_load",
    "_faultline_load:",
    "mov rax, qword ptr [rdi]",
    "ret",
    ".p2align 4",
    ".globl _faultline_load32",
    "_faultline_load32:",
    "mov esi, dword ptr [rdi]",
    "mov eax, esi",
    "ret",
    ".p2align 4",
    ".globl _faultline_load_ptr",
    "_faultline_load_ptr:",
    "mov rsi, qword ptr [rdi]",
    "mov rax, rsi",
    "ret",
    ".p2align 4",
);

#[cfg(all(faultline_native_sites, target_arch = "x86_64", not(target_vendor = "apple")))]
core::arch::global_asm!(
    ".text",
    ".p2align 4",
    ".globl faultline_load",
    ".type faultline_load, @function",
    "faultline_load:",
    "mov rax, qword ptr [rdi]",
    "ret",
    ".size faultline_load, . - faultline_load",
    ".p2align 4",
    ".globl faultline_load32",
    ".type faultline_load32, @function",
    "faultline_load32:",
    "mov esi, dword ptr [rdi]",
    "mov eax, esi",
    "ret",
    ".size faultline_load32, . - faultline_load32",
    ".p2align 4",
    ".globl faultline_load_ptr",
    ".type faultline_load_ptr, @function",
    "faultline_load_ptr:",
    "mov rsi, qword ptr [rdi]",
    "mov rax, rsi",
    "ret",
    ".size faultline_load_ptr, . - faultline_load_ptr",
    ".p2align 4",
);

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_decode_load_rax_from_rdi()
    {
        assert_eq!(X86_64Decoder::decode_load([0x48, 0x8b, 0x07, 0xc3]), 3);
    }

    #[test]
    fn test_decode_load_accepts_other_base_registers()
    {
        // mov rax, [rsi]
        assert_eq!(X86_64Decoder::decode_load([0x48, 0x8b, 0x06, 0xc3]), 3);
        // mov rax, [r9] (REX.WB)
        assert_eq!(X86_64Decoder::decode_load([0x49, 0x8b, 0x01, 0xc3]), 3);
    }

    #[test]
    fn test_decode_load_rejects_32bit_form()
    {
        assert_eq!(X86_64Decoder::decode_load([0x8b, 0x07, 0xc3, 0x90]), 0);
    }

    #[test]
    fn test_decode_load_rejects_displacement_and_sib()
    {
        // mov rax, [rdi + 8]
        assert_eq!(X86_64Decoder::decode_load([0x48, 0x8b, 0x47, 0x08]), 0);
        // mov rax, [rsp] needs a SIB byte
        assert_eq!(X86_64Decoder::decode_load([0x48, 0x8b, 0x04, 0x24]), 0);
        // mov rax, [rip + disp32]
        assert_eq!(X86_64Decoder::decode_load([0x48, 0x8b, 0x05, 0x00]), 0);
    }

    #[test]
    fn test_decode_load_rejects_other_opcodes()
    {
        // mov [rdi], rax (store)
        assert_eq!(X86_64Decoder::decode_load([0x48, 0x89, 0x07, 0xc3]), 0);
        assert_eq!(X86_64Decoder::decode_load([0x90, 0x90, 0x90, 0x90]), 0);
    }

    #[test]
    fn test_decode_load_arg_both_widths()
    {
        assert_eq!(X86_64Decoder::decode_load_arg([0x8b, 0x37, 0x89, 0xf0]), 2);
        assert_eq!(X86_64Decoder::decode_load_arg([0x48, 0x8b, 0x37, 0x48]), 3);
    }

    #[test]
    fn test_expected_encodings_decode_to_their_length()
    {
        for site in LoadSite::ALL {
            let mut code = [0xc3; 4];
            let bytes = X86_64Decoder::expected_encoding(site);
            code[..bytes.len()].copy_from_slice(bytes);

            let decoded = if site.takes_default() {
                X86_64Decoder::decode_load_arg(code)
            } else {
                X86_64Decoder::decode_load(code)
            };
            assert_eq!(decoded, bytes.len(), "{site}");
        }
    }
}
