//! Tests for load site verification

use std::io::Write;

use faultline_core::error::FaultlineError;
use faultline_core::safe_access::{LoadSite, NATIVE_LOAD_SITES};
use faultline_core::types::Architecture;
use faultline_core::verify::{self_check, verify_artifact, SiteStatus};

#[test]
fn test_self_check_covers_every_site()
{
    let report = self_check().unwrap();
    assert_eq!(report.source, "memory");
    assert_eq!(report.sites.len(), LoadSite::ALL.len());
    for (check, site) in report.sites.iter().zip(LoadSite::ALL) {
        assert_eq!(check.site, site);
        assert_eq!(check.address, site.load_address());
    }
    report.ensure_recoverable().unwrap();
}

#[test]
fn test_self_check_on_native_target()
{
    if !NATIVE_LOAD_SITES {
        return;
    }
    let report = self_check().unwrap();
    assert_eq!(report.architecture, Architecture::current());
    assert!(report.is_fully_verified(), "{report}");
    for check in &report.sites {
        assert_eq!(check.decoded_len, check.expected_len);
        assert!(check.bytes.starts_with(check.expected));
    }
}

#[test]
fn test_self_check_is_cached()
{
    assert_eq!(self_check().unwrap(), self_check().unwrap());
}

#[test]
fn test_verify_running_binary()
{
    if !NATIVE_LOAD_SITES {
        return;
    }
    let exe = std::env::current_exe().unwrap();
    let report = verify_artifact(&exe).unwrap();
    assert_eq!(report.architecture, Architecture::current());
    assert!(report.sites.iter().all(|check| check.status == SiteStatus::Verified), "{report}");

    let in_memory = self_check().unwrap();
    for (file, memory) in report.sites.iter().zip(&in_memory.sites) {
        assert_eq!(file.bytes, memory.bytes);
    }
}

#[test]
fn test_verify_garbage_file()
{
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"definitely not an object file").unwrap();
    file.flush().unwrap();

    match verify_artifact(file.path()) {
        Err(FaultlineError::Artifact(msg)) => assert!(msg.contains("failed to parse"), "{msg}"),
        other => panic!("expected Artifact error, got {other:?}"),
    }
}

#[test]
fn test_verify_missing_file()
{
    let dir = tempfile::tempdir().unwrap();
    match verify_artifact(dir.path().join("missing")) {
        Err(FaultlineError::Io(err)) => assert_eq!(err.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected Io error, got {other:?}"),
    }
}

#[test]
fn test_report_display_lists_sites()
{
    let text = self_check().unwrap().to_string();
    for site in LoadSite::ALL {
        assert!(text.contains(site.symbol()), "{text}");
    }
}

#[cfg(target_os = "linux")]
#[test]
fn test_site_symbols_are_sized_functions()
{
    use object::{Object, ObjectSymbol, SymbolKind};

    if !NATIVE_LOAD_SITES {
        return;
    }
    let exe = std::env::current_exe().unwrap();
    let data = std::fs::read(&exe).unwrap();
    let file = object::File::parse(&*data).unwrap();
    for name in ["faultline_load", "faultline_load32", "faultline_load_ptr"] {
        let symbol = file
            .symbols()
            .find(|symbol| symbol.name().map_or(false, |found| found == name))
            .unwrap_or_else(|| panic!("{name} missing from symbol table"));
        assert_eq!(symbol.kind(), SymbolKind::Text, "{name}");
        assert!(symbol.size() > 0, "{name}");
        assert!(symbol.is_definition(), "{name}");
    }
}
