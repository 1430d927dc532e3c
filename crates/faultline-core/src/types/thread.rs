//! Thread identifier type.

use std::fmt;

/// Thread identifier
///
/// Opaque handle used only to aim a signal at one specific thread. The
/// representation is platform-specific:
///
/// - **Linux/Android**: kernel thread ID (TID), as returned by `gettid(2)`
/// - **macOS**: Mach thread port (`thread_act_t`)
///
/// Enumerating threads is the caller's business; the core only needs a valid
/// identifier to target delivery.
///
/// ## Example
///
/// ```rust
/// use faultline_core::types::ThreadId;
///
/// let thread = ThreadId::from(12345u64);
/// assert_eq!(thread.raw(), 12345);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Identifier of the calling thread
    ///
    /// The kernel TID on Linux/Android
    /// ([gettid(2)](https://man7.org/linux/man-pages/man2/gettid.2.html)),
    /// the Mach port of the current pthread on macOS.
    pub fn current() -> Self
    {
        ThreadId(crate::platform::current_thread_id())
    }

    /// Get the raw `u64` representation of the thread identifier
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}
