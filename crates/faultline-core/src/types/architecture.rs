//! Target architecture type.

use std::fmt;

/// CPU architecture the core was compiled for
///
/// The load sites and their decoders are chosen at compile time, so the
/// "current" architecture is the only one that matters at runtime. The enum
/// exists so reports and the CLI can name it.
///
/// ## Example
///
/// ```rust
/// use faultline_core::types::Architecture;
///
/// match Architecture::current() {
///     Architecture::X86_64 => println!("x86-64 load sites"),
///     Architecture::Arm64 => println!("AArch64 load sites"),
///     other => println!("{other} load sites"),
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// 64-bit x86 (Intel/AMD)
    ///
    /// Variable-length instructions; the decoder inspects the REX prefix,
    /// opcode, and ModRM byte.
    ///
    /// See: [Intel 64 and IA-32 Architectures Software Developer's Manual](https://www.intel.com/content/www/us/en/developer/articles/technical/intel-sdm.html)
    X86_64,
    /// 32-bit x86
    X86,
    /// 32-bit ARM (A32 encoding)
    Arm,
    /// 64-bit ARM
    ///
    /// See: [ARM64 Architecture Reference Manual](https://developer.arm.com/documentation/ddi0487/latest)
    Arm64,
    /// Any other architecture
    ///
    /// The `&'static str` contains the architecture name (e.g., "riscv64").
    /// These targets use the generic fallback load sites.
    Unknown(&'static str),
}

impl Architecture
{
    /// Architecture of the running binary, resolved at compile time
    pub const fn current() -> Self
    {
        #[cfg(target_arch = "x86_64")]
        {
            Architecture::X86_64
        }

        #[cfg(target_arch = "x86")]
        {
            Architecture::X86
        }

        #[cfg(target_arch = "arm")]
        {
            Architecture::Arm
        }

        #[cfg(target_arch = "aarch64")]
        {
            Architecture::Arm64
        }

        #[cfg(not(any(
            target_arch = "x86_64",
            target_arch = "x86",
            target_arch = "arm",
            target_arch = "aarch64"
        )))]
        {
            Architecture::Unknown(std::env::consts::ARCH)
        }
    }

    /// Size of a pointer in bytes for this architecture.
    #[must_use]
    pub const fn pointer_size_bytes(self) -> u8
    {
        match self {
            Architecture::X86_64 | Architecture::Arm64 => 8,
            Architecture::X86 | Architecture::Arm => 4,
            Architecture::Unknown(_) => std::mem::size_of::<usize>() as u8,
        }
    }

    /// Nominal width of one instruction, used when nothing better is known
    ///
    /// Fixed-width ISAs report their real width. x86 has no nominal width;
    /// 1 is reported because the decoder never relies on it there.
    #[must_use]
    pub const fn nominal_instruction_width(self) -> usize
    {
        match self {
            Architecture::X86_64 | Architecture::X86 => 1,
            Architecture::Arm | Architecture::Arm64 | Architecture::Unknown(_) => 4,
        }
    }

    /// Whether hand-written load sites exist for this architecture
    #[must_use]
    pub const fn has_native_load_sites(self) -> bool
    {
        !matches!(self, Architecture::Unknown(_))
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::X86 => write!(f, "x86"),
            Architecture::Arm => write!(f, "arm"),
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::Unknown(name) => write!(f, "{name}"),
        }
    }
}
