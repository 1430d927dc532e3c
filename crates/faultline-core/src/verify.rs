//! # Load Site Verification
//!
//! The decoder is only correct if the bytes at each load site are exactly
//! the instruction it expects. This module checks that two ways:
//!
//! - [`self_check`]: reads the sites from the running process's own text.
//!   [`crate::recovery::enable_fault_recovery`] refuses to install the
//!   dispatcher when this finds a mismatch.
//! - [`verify_artifact`]: parses a built binary with `object`, finds the
//!   three site symbols, and checks the bytes stored in the file. Every
//!   decoder is compiled on every host, so an artifact for any supported
//!   architecture can be checked.

use std::fmt;
use std::fs;
use std::path::Path;

use object::{BinaryFormat, Object, ObjectSection, ObjectSymbol};
use once_cell::sync::OnceCell;

use crate::arch::aarch64::Arm64Decoder;
use crate::arch::arm::ArmDecoder;
use crate::arch::x86::X86Decoder;
use crate::arch::x86_64::X86_64Decoder;
use crate::arch::{self, LoadDecoder, NativeDecoder};
use crate::error::{FaultlineError, FaultlineResult};
use crate::safe_access::{self, LoadSite};
use crate::types::{Address, Architecture};

static SELF_CHECK: OnceCell<VerificationReport> = OnceCell::new();

/// Result of checking one load site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteStatus
{
    /// Bytes and decoded length match the reference encoding
    Verified,
    /// Bytes or decoded length disagree with the reference encoding
    Mismatch,
    /// No reference encoding exists (generic fallback)
    Unverified,
}

impl fmt::Display for SiteStatus
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            SiteStatus::Verified => write!(f, "ok"),
            SiteStatus::Mismatch => write!(f, "MISMATCH"),
            SiteStatus::Unverified => write!(f, "unverified"),
        }
    }
}

/// Check of a single load site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteCheck
{
    /// Site checked
    pub site: LoadSite,
    /// Address of the protected load (in memory, or in the artifact)
    pub address: Address,
    /// First four bytes found at `address`
    pub bytes: Vec<u8>,
    /// Reference encoding of the protected load
    pub expected: &'static [u8],
    /// Length the decoder reports for `bytes`
    pub decoded_len: usize,
    /// Length of the reference encoding
    pub expected_len: usize,
    /// Outcome
    pub status: SiteStatus,
}

impl SiteCheck
{
    fn new(site: LoadSite, address: Address, bytes: [u8; 4], expected: &'static [u8], decoded_len: usize) -> Self
    {
        let status = if expected.is_empty() {
            SiteStatus::Unverified
        } else if bytes.starts_with(expected) && decoded_len == expected.len() {
            SiteStatus::Verified
        } else {
            SiteStatus::Mismatch
        };

        SiteCheck {
            site,
            address,
            bytes: bytes.to_vec(),
            expected,
            decoded_len,
            expected_len: expected.len(),
            status,
        }
    }
}

/// Verification of all three load sites
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport
{
    /// Architecture the sites were decoded for
    pub architecture: Architecture,
    /// Where the bytes came from: `"memory"` or the artifact path
    pub source: String,
    /// One entry per load site
    pub sites: Vec<SiteCheck>,
}

impl VerificationReport
{
    /// Whether every site matched its reference encoding
    pub fn is_fully_verified(&self) -> bool
    {
        self.sites.iter().all(|check| check.status == SiteStatus::Verified)
    }

    /// Fail if any site disagrees with the decoder
    ///
    /// Unverified sites pass: the generic fallback has nothing to compare
    /// against, and its decoder already refuses the sites it cannot handle.
    ///
    /// ## Errors
    ///
    /// - `DecoderMismatch`: the first site with status [`SiteStatus::Mismatch`]
    pub fn ensure_recoverable(&self) -> FaultlineResult<()>
    {
        match self.sites.iter().find(|check| check.status == SiteStatus::Mismatch) {
            Some(check) => Err(FaultlineError::DecoderMismatch {
                site: check.site,
                expected: hex(check.expected),
                actual: hex(&check.bytes),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for VerificationReport
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        writeln!(f, "Load site verification ({}, {})", self.architecture, self.source)?;
        for check in &self.sites {
            writeln!(
                f,
                "  {:<20} {}  {:<11}  decoded {} expected {}  {}",
                check.site.symbol(),
                check.address,
                hex(&check.bytes),
                check.decoded_len,
                check.expected_len,
                check.status
            )?;
        }
        Ok(())
    }
}

/// Check the load sites of the running process
///
/// Reads each site's protected load from memory and confirms that
/// `skip_load + skip_load_arg` at that address equals the reference
/// encoding's length. The result is computed once per process.
///
/// ## Errors
///
/// Never fails today; the `Result` leaves room for targets where reading
/// our own text needs an OS call.
pub fn self_check() -> FaultlineResult<VerificationReport>
{
    SELF_CHECK
        .get_or_try_init(|| {
            let sites = LoadSite::ALL
                .into_iter()
                .map(|site| {
                    let address = site.load_address();
                    let pc = address.as_usize();
                    // SAFETY: pc is a load site's protected load.
                    let bytes = unsafe { arch::code_at(pc) };
                    let decoded = safe_access::skip_load(pc) + safe_access::skip_load_arg(pc);
                    SiteCheck::new(site, address, bytes, NativeDecoder::expected_encoding(site), decoded)
                })
                .collect();

            Ok(VerificationReport {
                architecture: NativeDecoder::ARCH,
                source: "memory".to_string(),
                sites,
            })
        })
        .cloned()
}

/// Check the load sites stored in a built binary
///
/// ## Errors
///
/// - `Io`: the file cannot be read
/// - `Artifact`: the file is not a parsable object, or lacks a site symbol
/// - `UnsupportedArchitecture`: no decoder exists for the file's architecture
pub fn verify_artifact(path: impl AsRef<Path>) -> FaultlineResult<VerificationReport>
{
    let path = path.as_ref();
    let data = fs::read(path)?;
    let file =
        object::File::parse(&*data).map_err(|err| FaultlineError::Artifact(format!("failed to parse {}: {err}", path.display())))?;

    let architecture = match file.architecture() {
        object::Architecture::X86_64 => Architecture::X86_64,
        object::Architecture::I386 => Architecture::X86,
        object::Architecture::Arm => Architecture::Arm,
        object::Architecture::Aarch64 => Architecture::Arm64,
        _ => return Err(FaultlineError::UnsupportedArchitecture("no load site decoder for this artifact")),
    };

    let mut sites = Vec::with_capacity(LoadSite::ALL.len());
    for site in LoadSite::ALL {
        let entry = find_symbol(&file, site.symbol())
            .ok_or_else(|| FaultlineError::Artifact(format!("{} has no symbol {}", path.display(), site.symbol())))?;
        let check = match architecture {
            Architecture::X86_64 => check_artifact_site::<X86_64Decoder>(&file, site, entry),
            Architecture::X86 => check_artifact_site::<X86Decoder>(&file, site, entry),
            Architecture::Arm => check_artifact_site::<ArmDecoder>(&file, site, entry),
            Architecture::Arm64 => check_artifact_site::<Arm64Decoder>(&file, site, entry),
            Architecture::Unknown(name) => return Err(FaultlineError::UnsupportedArchitecture(name)),
        }?;
        sites.push(check);
    }

    Ok(VerificationReport {
        architecture,
        source: path.display().to_string(),
        sites,
    })
}

/// Address of `name` in the file's symbol tables
///
/// Mach-O prefixes C symbols with an underscore. Any defined symbol placed
/// in a section counts, whatever its recorded kind.
fn find_symbol(file: &object::File<'_>, name: &str) -> Option<(u64, object::SectionIndex)>
{
    let strip_underscore = file.format() == BinaryFormat::MachO;
    file.symbols().chain(file.dynamic_symbols()).find_map(|symbol| {
        let raw = symbol.name().ok()?;
        let plain = if strip_underscore { raw.strip_prefix('_').unwrap_or(raw) } else { raw };
        if plain != name || symbol.is_undefined() {
            return None;
        }
        Some((symbol.address(), symbol.section_index()?))
    })
}

fn check_artifact_site<D: LoadDecoder>(
    file: &object::File<'_>,
    site: LoadSite,
    (entry, section_index): (u64, object::SectionIndex),
) -> FaultlineResult<SiteCheck>
{
    let section = file.section_by_index(section_index)?;
    let data = section.data()?;

    // Thumb symbols carry the mode in bit 0
    let load = (entry & !1) + D::load_offset(site) as u64;
    let start = load
        .checked_sub(section.address())
        .and_then(|offset| usize::try_from(offset).ok())
        .ok_or_else(|| FaultlineError::Artifact(format!("{} lies outside its section", site.symbol())))?;
    let bytes: [u8; 4] = data
        .get(start..start + 4)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| FaultlineError::Artifact(format!("{} is truncated", site.symbol())))?;

    let decoded = if site.takes_default() {
        D::decode_load_arg(bytes)
    } else {
        D::decode_load(bytes)
    };
    Ok(SiteCheck::new(site, Address::new(load), bytes, D::expected_encoding(site), decoded))
}

fn hex(bytes: &[u8]) -> String
{
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}
