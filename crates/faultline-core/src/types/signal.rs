//! Signal number and sampling mode types.

use std::fmt;
use std::str::FromStr;

use crate::error::{FaultlineError, FaultlineResult};

/// One past the highest signal number the platform defines
#[cfg(any(target_os = "linux", target_os = "android"))]
pub const SIGNAL_LIMIT: usize = 65;

/// One past the highest signal number the platform defines
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub const SIGNAL_LIMIT: usize = 32;

/// Validated signal number
///
/// Wraps a raw `c_int` signal number that is known to be in `1..SIGNAL_LIMIT`,
/// so it can index the handler registry without further checks.
///
/// ## Example
///
/// ```rust
/// use faultline_core::types::Signal;
///
/// let sig = Signal::new(libc::SIGPROF)?;
/// assert_eq!(sig, Signal::SIGPROF);
/// assert_eq!(sig.to_string(), "SIGPROF");
/// assert!(Signal::new(0).is_err());
/// # Ok::<(), faultline_core::error::FaultlineError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signal(i32);

impl Signal
{
    /// Invalid memory reference
    pub const SIGSEGV: Signal = Signal(libc::SIGSEGV);
    /// Bus error (misaligned or unbacked access)
    pub const SIGBUS: Signal = Signal(libc::SIGBUS);
    /// Profiling timer expired; preferred signal for CPU sampling
    pub const SIGPROF: Signal = Signal(libc::SIGPROF);
    /// Virtual timer expired; preferred signal for wall-clock sampling
    pub const SIGVTALRM: Signal = Signal(libc::SIGVTALRM);
    /// I/O possible; used to interrupt blocking I/O
    pub const SIGIO: Signal = Signal(libc::SIGIO);

    /// Fault signals the recovery dispatcher intercepts
    pub const FAULT_SIGNALS: [Signal; 2] = [Signal::SIGSEGV, Signal::SIGBUS];

    /// Validate a raw signal number
    ///
    /// ## Errors
    ///
    /// - `InvalidSignal`: the number is 0, negative, or beyond the platform limit
    pub fn new(signo: i32) -> FaultlineResult<Self>
    {
        match usize::try_from(signo) {
            Ok(n) if (1..SIGNAL_LIMIT).contains(&n) => Ok(Signal(signo)),
            _ => Err(FaultlineError::InvalidSignal(signo)),
        }
    }

    /// Raw signal number
    pub const fn raw(self) -> i32
    {
        self.0
    }

    /// Registry slot for this signal
    #[allow(clippy::cast_sign_loss)]
    pub(crate) const fn index(self) -> usize
    {
        self.0 as usize
    }

    /// Conventional name of the signal, if it has one
    pub fn name(self) -> Option<&'static str>
    {
        let name = match self.0 {
            libc::SIGHUP => "SIGHUP",
            libc::SIGINT => "SIGINT",
            libc::SIGQUIT => "SIGQUIT",
            libc::SIGILL => "SIGILL",
            libc::SIGTRAP => "SIGTRAP",
            libc::SIGABRT => "SIGABRT",
            libc::SIGBUS => "SIGBUS",
            libc::SIGFPE => "SIGFPE",
            libc::SIGKILL => "SIGKILL",
            libc::SIGUSR1 => "SIGUSR1",
            libc::SIGSEGV => "SIGSEGV",
            libc::SIGUSR2 => "SIGUSR2",
            libc::SIGPIPE => "SIGPIPE",
            libc::SIGALRM => "SIGALRM",
            libc::SIGTERM => "SIGTERM",
            libc::SIGCHLD => "SIGCHLD",
            libc::SIGCONT => "SIGCONT",
            libc::SIGSTOP => "SIGSTOP",
            libc::SIGTSTP => "SIGTSTP",
            libc::SIGTTIN => "SIGTTIN",
            libc::SIGTTOU => "SIGTTOU",
            libc::SIGURG => "SIGURG",
            libc::SIGXCPU => "SIGXCPU",
            libc::SIGXFSZ => "SIGXFSZ",
            libc::SIGVTALRM => "SIGVTALRM",
            libc::SIGPROF => "SIGPROF",
            libc::SIGWINCH => "SIGWINCH",
            libc::SIGIO => "SIGIO",
            libc::SIGSYS => "SIGSYS",
            #[cfg(any(target_os = "linux", target_os = "android"))]
            libc::SIGSTKFLT => "SIGSTKFLT",
            #[cfg(any(target_os = "linux", target_os = "android"))]
            libc::SIGPWR => "SIGPWR",
            _ => return None,
        };
        Some(name)
    }
}

impl TryFrom<i32> for Signal
{
    type Error = FaultlineError;

    fn try_from(signo: i32) -> Result<Self, Self::Error>
    {
        Signal::new(signo)
    }
}

impl From<Signal> for i32
{
    fn from(signal: Signal) -> Self
    {
        signal.0
    }
}

impl fmt::Display for Signal
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "signal {}", self.0),
        }
    }
}

impl FromStr for Signal
{
    type Err = FaultlineError;

    /// Parse either a number (`27`) or a name with or without the `SIG`
    /// prefix (`SIGPROF`, `prof`)
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let s = s.trim();
        if let Ok(signo) = s.parse::<i32>() {
            return Signal::new(signo);
        }

        let upper = s.to_ascii_uppercase();
        let wanted = if upper.starts_with("SIG") { upper } else { format!("SIG{upper}") };
        (1..SIGNAL_LIMIT)
            .filter_map(|n| i32::try_from(n).ok())
            .map(Signal)
            .find(|sig| sig.name() == Some(wanted.as_str()))
            .ok_or(FaultlineError::InvalidSignal(-1))
    }
}

/// Sampling strategy a profiling signal is requested for
///
/// CPU-time and wall-clock sampling run concurrently in some profilers, so
/// each mode gets its own signal and the two never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplingMode
{
    /// CPU-time sampling (prefers `SIGPROF`)
    Cpu,
    /// Wall-clock sampling (prefers `SIGVTALRM`)
    Wall,
}

impl SamplingMode
{
    /// Both modes, in index order
    pub const ALL: [SamplingMode; 2] = [SamplingMode::Cpu, SamplingMode::Wall];

    pub(crate) const fn index(self) -> usize
    {
        match self {
            SamplingMode::Cpu => 0,
            SamplingMode::Wall => 1,
        }
    }

    /// The other sampling mode
    pub const fn other(self) -> Self
    {
        match self {
            SamplingMode::Cpu => SamplingMode::Wall,
            SamplingMode::Wall => SamplingMode::Cpu,
        }
    }

    /// Signal this mode starts probing from
    pub const fn preferred_signal(self) -> Signal
    {
        match self {
            SamplingMode::Cpu => Signal::SIGPROF,
            SamplingMode::Wall => Signal::SIGVTALRM,
        }
    }
}

impl FromStr for SamplingMode
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "cpu" | "itimer" => Ok(SamplingMode::Cpu),
            "wall" | "wallclock" => Ok(SamplingMode::Wall),
            _ => Err(format!("Unknown sampling mode: {s}. Use 'cpu' or 'wall'")),
        }
    }
}

impl fmt::Display for SamplingMode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            SamplingMode::Cpu => write!(f, "cpu"),
            SamplingMode::Wall => write!(f, "wall"),
        }
    }
}
