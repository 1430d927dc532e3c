//! Tests that faults outside the load sites reach the previous crash handler
//!
//! Kept to a single test: the order of installation is the point, and the
//! signal dispositions are process-wide.

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use faultline_core::recovery::{enable_fault_recovery, fault_recovery_handler, fault_stats, install_signal_handler};
use faultline_core::registry::{chain_of, installed_action, previous_of, siginfo_t};
use faultline_core::safe_access::load;
use faultline_core::types::Signal;

static GUARDED_PAGE: AtomicUsize = AtomicUsize::new(0);
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);
static HOST_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Crash handler of the "host": makes the guarded page readable and retries
extern "C" fn host_crash_handler(_signo: i32, _info: *mut siginfo_t, _ucontext: *mut c_void)
{
    HOST_CALLS.fetch_add(1, Ordering::SeqCst);
    let page = GUARDED_PAGE.load(Ordering::SeqCst);
    if page != 0 {
        // SAFETY: the page was mapped by the test and is still mapped.
        unsafe {
            libc::mprotect(page as *mut c_void, PAGE_SIZE.load(Ordering::SeqCst), libc::PROT_READ);
        }
    }
}

#[test]
fn test_foreign_fault_is_forwarded_to_previous_handler()
{
    // SAFETY: anonymous mapping owned by this test.
    let (page, size) = unsafe {
        let size = usize::try_from(libc::sysconf(libc::_SC_PAGESIZE)).unwrap();
        let page = libc::mmap(ptr::null_mut(), size, libc::PROT_NONE, libc::MAP_PRIVATE | libc::MAP_ANON, -1, 0);
        assert_ne!(page, libc::MAP_FAILED);
        (page, size)
    };
    PAGE_SIZE.store(size, Ordering::SeqCst);
    GUARDED_PAGE.store(page as usize, Ordering::SeqCst);

    // The host handler must be in place before recovery chains onto it.
    for signal in Signal::FAULT_SIGNALS {
        install_signal_handler(signal, host_crash_handler, None).unwrap();
    }
    enable_fault_recovery().unwrap();

    let dispatcher = fault_recovery_handler as usize;
    let below = previous_of(Signal::SIGSEGV, dispatcher).unwrap();
    assert_eq!(below.address(), host_crash_handler as usize);
    assert_eq!(installed_action(Signal::SIGSEGV).unwrap().address(), dispatcher);

    // A load-site fault is absorbed without involving the host.
    let before = fault_stats();
    assert!(load(ptr::null()).is_null());
    assert_eq!(HOST_CALLS.load(Ordering::SeqCst), 0);
    assert!(fault_stats().recovered > before.recovered);

    // A plain read of the guarded page is not ours: the host sees it, fixes
    // the protection, and the read is retried.
    // SAFETY: the page is mapped; the first access faults into the host handler.
    let value = unsafe { ptr::read_volatile(page.cast::<u64>()) };
    assert_eq!(value, 0);
    assert_eq!(HOST_CALLS.load(Ordering::SeqCst), 1);
    assert!(fault_stats().forwarded > before.forwarded);

    let chain = chain_of(Signal::SIGSEGV);
    assert_eq!(chain.last().unwrap().address(), dispatcher);
    assert_eq!(chain.iter().filter(|action| action.address() == dispatcher).count(), 1);

    GUARDED_PAGE.store(0, Ordering::SeqCst);
    // SAFETY: mapped above, unmapped once.
    unsafe {
        libc::munmap(page, size);
    }
}
