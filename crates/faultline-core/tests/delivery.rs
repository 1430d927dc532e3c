//! Tests for thread-directed signal delivery and profiling signal selection

use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use faultline_core::delivery::{profiling_signal, send_signal_to_thread, try_send_signal_to_thread, WAKEUP_SIGNAL};
use faultline_core::error::FaultlineError;
use faultline_core::recovery::install_signal_handler;
use faultline_core::registry::siginfo_t;
use faultline_core::types::{SamplingMode, Signal, ThreadId};

static SAMPLES: AtomicU64 = AtomicU64::new(0);

extern "C" fn on_sample(_signo: i32, _info: *mut siginfo_t, _ucontext: *mut c_void)
{
    SAMPLES.fetch_add(1, Ordering::SeqCst);
}

fn wait_for(mut done: impl FnMut() -> bool) -> bool
{
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

#[test]
fn test_profiling_signals_are_distinct()
{
    let cpu = profiling_signal(SamplingMode::Cpu);
    let wall = profiling_signal(SamplingMode::Wall);
    assert_ne!(cpu, wall);
    assert_ne!(cpu, WAKEUP_SIGNAL);
    assert_ne!(wall, WAKEUP_SIGNAL);

    // The choice is remembered.
    assert_eq!(profiling_signal(SamplingMode::Cpu), cpu);
    assert_eq!(profiling_signal(SamplingMode::Wall), wall);
}

#[test]
fn test_signal_reaches_live_thread()
{
    let signal = profiling_signal(SamplingMode::Cpu);
    install_signal_handler(signal, on_sample, None).unwrap();
    // Our own handler keeps the signal available.
    assert_eq!(profiling_signal(SamplingMode::Cpu), signal);

    let (tid_tx, tid_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let worker = thread::spawn(move || {
        tid_tx.send(ThreadId::current()).unwrap();
        let _ = stop_rx.recv_timeout(Duration::from_secs(5));
    });

    let target = tid_rx.recv().unwrap();
    let before = SAMPLES.load(Ordering::SeqCst);
    send_signal_to_thread(target, signal).unwrap();
    assert!(wait_for(|| SAMPLES.load(Ordering::SeqCst) > before));

    stop_tx.send(()).unwrap();
    worker.join().unwrap();
}

#[test]
fn test_signal_to_self()
{
    let signal = Signal::new(libc::SIGWINCH).unwrap();
    install_signal_handler(signal, on_sample, None).unwrap();

    let before = SAMPLES.load(Ordering::SeqCst);
    assert!(try_send_signal_to_thread(ThreadId::current(), signal));
    assert!(wait_for(|| SAMPLES.load(Ordering::SeqCst) > before));
}

#[test]
fn test_exited_thread_is_gone()
{
    // A late delivery lands in our handler.
    let signal = profiling_signal(SamplingMode::Cpu);
    install_signal_handler(signal, on_sample, None).unwrap();
    let gone = thread::spawn(ThreadId::current).join().unwrap();

    // The kernel may still be tearing the thread down right after join.
    let mut last = None;
    let reported_gone = wait_for(|| match send_signal_to_thread(gone, signal) {
        Err(FaultlineError::ThreadGone(thread)) => {
            last = Some(thread);
            true
        }
        _ => false,
    });
    assert!(reported_gone);
    assert_eq!(last, Some(gone));
    assert!(!try_send_signal_to_thread(gone, signal));
}
