//! # Race Harness
//!
//! Exercises the fault path under real concurrency. A mutator thread keeps a
//! short linked list of nodes, each on its own anonymous page: it pushes a
//! fresh node at the head and unmaps the oldest one. The oldest surviving
//! node's `next` therefore always points at a page that is already gone.
//! The walker follows the list from the head with protected loads only, so
//! every walk that reaches the tail faults and must be recovered.

use std::collections::VecDeque;
use std::ffi::c_void;
use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{FaultlineError, FaultlineResult};
use crate::recovery::{enable_fault_recovery, fault_stats};
use crate::safe_access::{load, load32, load_ptr, NATIVE_LOAD_SITES};

/// Value stored in every live node
pub const NODE_MARKER: u32 = 0x5afe_10ad;

/// Default passed to `load32`; never a valid node value
const MISSING: u32 = 0;

/// Offset of `Node::marker`
const MARKER_OFFSET: usize = mem::size_of::<*mut c_void>();

#[repr(C)]
struct Node
{
    next: *mut c_void,
    marker: u32,
}

/// Harness parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig
{
    /// Number of list walks performed by the walker
    pub iterations: u64,
    /// Number of nodes the mutator keeps mapped
    pub depth: usize,
}

impl Default for StressConfig
{
    fn default() -> Self
    {
        StressConfig {
            iterations: 10_000,
            depth: 4,
        }
    }
}

/// What a harness run observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StressReport
{
    /// List walks completed
    pub iterations: u64,
    /// Protected loads issued by the walker
    pub loads: u64,
    /// Loads that returned the default
    pub defaults: u64,
    /// Marker loads that returned neither the marker nor the default
    ///
    /// Only possible when an unmapped node's address was reused by some
    /// other mapping before the walker got there.
    pub unexpected: u64,
    /// Nodes the mutator unmapped
    pub unmapped: u64,
    /// Faults the dispatcher recovered during the run
    pub recovered_faults: u64,
    /// Wall time of the run
    pub elapsed: Duration,
}

/// Run the harness on the calling thread plus one mutator thread
///
/// Enables fault recovery first.
///
/// ## Errors
///
/// - `UnsupportedArchitecture`: the target only has the generic fallback,
///   where the walker's `load32` faults could not be recovered
/// - Anything [`enable_fault_recovery`] returns
/// - `Io`: the mutator thread could not be spawned, or `mmap` failed
pub fn run(config: StressConfig) -> FaultlineResult<StressReport>
{
    if !NATIVE_LOAD_SITES {
        return Err(FaultlineError::UnsupportedArchitecture(std::env::consts::ARCH));
    }
    enable_fault_recovery()?;

    let depth = config.depth.max(1);
    let head = Arc::new(AtomicPtr::new(ptr::null_mut::<c_void>()));
    let stop = Arc::new(AtomicBool::new(false));
    let unmapped = Arc::new(AtomicU64::new(0));
    let before = fault_stats();
    let started = Instant::now();

    // Seed the list so the first walks have something to follow.
    let mut pages = NodePages::with_capacity(depth + 1);
    for _ in 0..depth {
        let page = map_node(head.load(Ordering::Acquire))?;
        head.store(page, Ordering::Release);
        pages.push(page);
    }

    let mutator = {
        let head = Arc::clone(&head);
        let stop = Arc::clone(&stop);
        let unmapped = Arc::clone(&unmapped);
        thread::Builder::new()
            .name("faultline-mutator".to_string())
            .spawn(move || mutate(&head, &stop, &unmapped, pages, depth))?
    };

    // Once one node is gone the tail always links to an unmapped page.
    while unmapped.load(Ordering::Acquire) == 0 && !mutator.is_finished() {
        thread::yield_now();
    }

    let mut report = StressReport::default();
    for i in 0..config.iterations {
        walk(head.load(Ordering::Acquire), depth + 2, i, &mut report);
        report.iterations += 1;
    }

    stop.store(true, Ordering::Release);
    match mutator.join() {
        Ok(result) => result?,
        Err(_) => return Err(io::Error::other("mutator thread panicked").into()),
    }
    report.unmapped = unmapped.load(Ordering::Acquire);
    report.recovered_faults = fault_stats().recovered - before.recovered;
    report.elapsed = started.elapsed();

    info!(
        "Stress run: {} walks, {} loads, {} defaults, {} recovered faults in {:?}",
        report.iterations, report.loads, report.defaults, report.recovered_faults, report.elapsed
    );
    Ok(report)
}

/// Follow up to `max_nodes` links from `node`
///
/// Rotates through the three load sites so each of them faults regularly.
fn walk(mut node: *mut c_void, max_nodes: usize, round: u64, report: &mut StressReport)
{
    for hop in 0..max_nodes {
        if node.is_null() {
            return;
        }

        let marker_ptr = node.cast::<u8>().wrapping_add(MARKER_OFFSET).cast::<u32>();
        let marker = load32(marker_ptr, MISSING);
        report.loads += 1;
        match marker {
            NODE_MARKER => {}
            MISSING => report.defaults += 1,
            _ => report.unexpected += 1,
        }

        let next_ptr = node.cast::<*mut c_void>().cast_const();
        node = if (round + hop as u64) % 2 == 0 {
            load(next_ptr)
        } else {
            load_ptr(next_ptr, ptr::null_mut())
        };
        report.loads += 1;
        if node.is_null() {
            report.defaults += 1;
        }
    }
}

/// Node pages the mutator still has mapped, oldest first
///
/// Whatever is left when the set is dropped gets unmapped, so an early
/// return on any path leaves no mapping behind.
struct NodePages(VecDeque<usize>);

impl NodePages
{
    fn with_capacity(capacity: usize) -> Self
    {
        NodePages(VecDeque::with_capacity(capacity))
    }

    fn push(&mut self, page: *mut c_void)
    {
        self.0.push_back(page as usize);
    }

    fn len(&self) -> usize
    {
        self.0.len()
    }

    /// Unmap the oldest page
    fn unmap_oldest(&mut self) -> io::Result<()>
    {
        match self.0.pop_front() {
            Some(oldest) => unmap_node(oldest),
            None => Ok(()),
        }
    }

    /// Unmap every page, reporting the first failure
    fn release(mut self) -> io::Result<()>
    {
        let mut result = Ok(());
        for page in self.0.drain(..) {
            if let Err(err) = unmap_node(page) {
                result = result.and(Err(err));
            }
        }
        result
    }
}

impl Drop for NodePages
{
    fn drop(&mut self)
    {
        for page in self.0.drain(..) {
            let _ = unmap_node(page);
        }
    }
}

fn mutate(
    head: &AtomicPtr<c_void>,
    stop: &AtomicBool,
    unmapped: &AtomicU64,
    pages: NodePages,
    depth: usize,
) -> FaultlineResult<()>
{
    mutate_with(head, stop, unmapped, pages, depth, map_node)
}

fn mutate_with(
    head: &AtomicPtr<c_void>,
    stop: &AtomicBool,
    unmapped: &AtomicU64,
    mut pages: NodePages,
    depth: usize,
    mut map: impl FnMut(*mut c_void) -> io::Result<*mut c_void>,
) -> FaultlineResult<()>
{
    while !stop.load(Ordering::Acquire) {
        let page = map(head.load(Ordering::Acquire))?;
        head.store(page, Ordering::Release);
        pages.push(page);

        while pages.len() > depth {
            pages.unmap_oldest()?;
            unmapped.fetch_add(1, Ordering::Release);
        }
        thread::yield_now();
    }

    pages.release()?;
    debug!("Mutator unmapped {} nodes", unmapped.load(Ordering::Relaxed));
    Ok(())
}

fn page_size() -> usize
{
    // SAFETY: sysconf has no preconditions.
    usize::try_from(unsafe { libc::sysconf(libc::_SC_PAGESIZE) }).unwrap_or(4096)
}

/// Map one page holding a node that links to `next`
fn map_node(next: *mut c_void) -> io::Result<*mut c_void>
{
    // SAFETY: anonymous private mapping with no address hint.
    let page = unsafe {
        libc::mmap(
            ptr::null_mut(),
            page_size(),
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    if page == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: the page is freshly mapped, writable, and page aligned.
    unsafe {
        page.cast::<Node>().write(Node {
            next,
            marker: NODE_MARKER,
        });
    }
    Ok(page)
}

fn unmap_node(page: usize) -> io::Result<()>
{
    // SAFETY: `page` came from map_node and is unmapped exactly once.
    if unsafe { libc::munmap(page as *mut c_void, page_size()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[cfg(target_os = "linux")]
    fn is_mapped(page: usize) -> bool
    {
        let mut residency = [0u8; 1];
        // SAFETY: mincore only inspects the range and writes one byte per page.
        unsafe { libc::mincore(page as *mut c_void, page_size(), residency.as_mut_ptr()) == 0 }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_mapping_unmaps_every_node()
    {
        let head = AtomicPtr::new(ptr::null_mut::<c_void>());
        let stop = AtomicBool::new(false);
        let unmapped = AtomicU64::new(0);

        let mut pages = NodePages::with_capacity(4);
        let mut mapped = Vec::new();
        for _ in 0..3 {
            let page = map_node(head.load(Ordering::Acquire)).unwrap();
            head.store(page, Ordering::Release);
            pages.push(page);
            mapped.push(page as usize);
        }

        let mut calls = 0;
        let result = mutate_with(&head, &stop, &unmapped, pages, 3, |next| {
            calls += 1;
            if calls > 2 {
                return Err(io::Error::from_raw_os_error(libc::ENOMEM));
            }
            let page = map_node(next)?;
            mapped.push(page as usize);
            Ok(page)
        });

        assert!(matches!(result, Err(FaultlineError::Io(_))));
        assert_eq!(unmapped.load(Ordering::Acquire), 2);
        assert_eq!(mapped.len(), 5);
        for page in mapped {
            assert!(!is_mapped(page), "{page:#x} still mapped");
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dropped_pages_are_unmapped()
    {
        let page = map_node(ptr::null_mut()).unwrap();
        assert!(is_mapped(page as usize));

        let mut pages = NodePages::with_capacity(1);
        pages.push(page);
        drop(pages);
        assert!(!is_mapped(page as usize));
    }

    #[test]
    fn test_stopped_mutator_releases_its_pages()
    {
        let head = AtomicPtr::new(ptr::null_mut::<c_void>());
        let stop = AtomicBool::new(true);
        let unmapped = AtomicU64::new(0);

        let mut pages = NodePages::with_capacity(2);
        pages.push(map_node(ptr::null_mut()).unwrap());
        pages.push(map_node(ptr::null_mut()).unwrap());
        mutate_with(&head, &stop, &unmapped, pages, 2, |_| panic!("no mapping after stop")).unwrap();
        assert_eq!(unmapped.load(Ordering::Acquire), 0);
    }
}
