//! Tests for error types

use std::io;

use faultline_core::error::FaultlineError;
use faultline_core::safe_access::LoadSite;
use faultline_core::types::{Signal, ThreadId};

#[test]
fn test_invalid_signal_display()
{
    let err = FaultlineError::InvalidSignal(99);
    assert_eq!(err.to_string(), "Invalid signal number: 99");
}

#[test]
fn test_thread_gone_display()
{
    let err = FaultlineError::ThreadGone(ThreadId::from(4242));
    assert_eq!(err.to_string(), "Thread 4242 no longer exists");
}

#[test]
fn test_chain_full_display()
{
    let err = FaultlineError::ChainFull {
        signal: Signal::SIGSEGV,
        capacity: 8,
    };
    assert_eq!(err.to_string(), "Handler chain for SIGSEGV is full (8 entries)");
}

#[test]
fn test_decoder_mismatch_display()
{
    let err = FaultlineError::DecoderMismatch {
        site: LoadSite::Load32,
        expected: "8b 37".to_string(),
        actual: "90 90 90 90".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Decoder mismatch at faultline_load32: expected 8b 37, found 90 90 90 90"
    );
}

#[test]
fn test_delivery_failed_display()
{
    let err = FaultlineError::DeliveryFailed {
        thread: ThreadId::from(7),
        signal: Signal::SIGPROF,
        source: io::Error::from_raw_os_error(libc::EPERM),
    };
    let msg = err.to_string();
    assert!(msg.starts_with("Failed to deliver SIGPROF to thread 7: "), "{msg}");
}

#[test]
fn test_io_error_conversion()
{
    let err: FaultlineError = io::Error::new(io::ErrorKind::NotFound, "no such artifact").into();
    match err {
        FaultlineError::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::NotFound),
        other => panic!("expected Io, got {other:?}"),
    }
}

#[test]
fn test_unsupported_architecture_display()
{
    let err = FaultlineError::UnsupportedArchitecture("riscv64");
    assert_eq!(err.to_string(), "Unsupported architecture: riscv64");
}
