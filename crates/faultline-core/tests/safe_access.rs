//! Tests for the protected loads with fault recovery enabled
//!
//! Every test enables recovery first; enabling is idempotent, so the order
//! in which the harness runs them does not matter.

use std::ffi::c_void;
use std::ptr;

use faultline_core::recovery::{enable_fault_recovery, fault_stats, is_fault_recovery_enabled};
use faultline_core::safe_access::{load, load32, load_ptr, LoadSite, LOAD_RECOVERABLE, NATIVE_LOAD_SITES};

/// Address of a page that was mapped and then unmapped again
fn unmapped_page() -> usize
{
    // SAFETY: plain anonymous mapping, released before anything reads it.
    unsafe {
        let size = usize::try_from(libc::sysconf(libc::_SC_PAGESIZE)).unwrap();
        let page = libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        );
        assert_ne!(page, libc::MAP_FAILED);
        assert_eq!(libc::munmap(page, size), 0);
        page as usize
    }
}

/// Whether a fault in `load` comes back as null on this build
///
/// The fallback site only starts with its load in optimized builds.
fn load_faults_recover() -> bool
{
    LOAD_RECOVERABLE && (NATIVE_LOAD_SITES || !cfg!(debug_assertions))
}

#[test]
fn test_enable_fault_recovery()
{
    enable_fault_recovery().unwrap();
    assert!(is_fault_recovery_enabled());
}

#[test]
fn test_load_valid_pointer()
{
    enable_fault_recovery().unwrap();

    let mut target = 7u64;
    let slot: *mut c_void = ptr::addr_of_mut!(target).cast();
    assert_eq!(load(&slot), slot);
}

#[test]
fn test_load_null_returns_null()
{
    enable_fault_recovery().unwrap();
    if !load_faults_recover() {
        return;
    }

    let before = fault_stats().recovered;
    assert!(load(ptr::null()).is_null());
    assert!(fault_stats().recovered > before);
}

#[test]
fn test_load_unmapped_returns_null()
{
    enable_fault_recovery().unwrap();
    if !load_faults_recover() {
        return;
    }

    let page = unmapped_page();
    assert!(load(page as *const *mut c_void).is_null());
}

#[test]
fn test_load32_valid_ignores_default()
{
    enable_fault_recovery().unwrap();

    let value = 0xdead_beef_u32;
    assert_eq!(load32(&value, 42), 0xdead_beef);
}

#[test]
fn test_load_then_load32_default()
{
    if !NATIVE_LOAD_SITES {
        return;
    }
    enable_fault_recovery().unwrap();

    let mut target = 1u32;
    let slot: *mut c_void = ptr::addr_of_mut!(target).cast();
    let p = load(&slot);
    assert_eq!(load32(p.cast::<u32>(), 42), 1);

    let bogus = load(ptr::null());
    assert!(bogus.is_null());
    assert_eq!(load32(bogus.cast::<u32>(), 42), 42);
}

#[test]
fn test_load32_unmapped_returns_default()
{
    if !NATIVE_LOAD_SITES {
        return;
    }
    enable_fault_recovery().unwrap();

    let page = unmapped_page();
    assert_eq!(load32(page as *const u32, 42), 42);
    assert_eq!(load32(page as *const u32, 0), 0);
}

#[test]
fn test_load_ptr_default()
{
    if !NATIVE_LOAD_SITES {
        return;
    }
    enable_fault_recovery().unwrap();

    let sentinel = 0x1234_usize as *mut c_void;
    assert_eq!(load_ptr(ptr::null(), sentinel), sentinel);

    let mut target = 3u8;
    let slot: *mut c_void = ptr::addr_of_mut!(target).cast();
    assert_eq!(load_ptr(&slot, sentinel), slot);
}

#[test]
fn test_recovered_load_leaves_memory_alone()
{
    if !NATIVE_LOAD_SITES {
        return;
    }
    enable_fault_recovery().unwrap();

    let guard = [0x5a5a_5a5a_u32; 16];
    let cell = 99u64;
    for _ in 0..100 {
        assert!(load(ptr::null()).is_null());
        assert_eq!(load32(ptr::null(), 1), 1);
        assert!(load_ptr(ptr::null(), ptr::null_mut()).is_null());
    }
    assert!(guard.iter().all(|&word| word == 0x5a5a_5a5a));
    assert_eq!(cell, 99);
}

#[test]
fn test_recovery_from_many_threads()
{
    if !NATIVE_LOAD_SITES {
        return;
    }
    enable_fault_recovery().unwrap();

    let handles: Vec<_> = (0..4u32)
        .map(|n| {
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    assert_eq!(load32(ptr::null(), n), n);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_site_lookup()
{
    for site in LoadSite::ALL {
        let entry = site.address().as_usize();
        assert_eq!(LoadSite::containing(entry), Some(site));
        assert!(site.load_address() >= site.address());
    }
    assert_eq!(LoadSite::containing(0), None);
}
