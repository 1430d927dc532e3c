//! # Platform-Specific Implementations
//!
//! Everything that depends on the operating system's signal ABI lives here:
//!
//! - **Linux/Android**: `ucontext_t::uc_mcontext` register layout, `gettid`, `tgkill`
//!   - See: [signal(7) man page](https://man7.org/linux/man-pages/man7/signal.7.html)
//! - **macOS**: Darwin machine context, Mach thread ports, `pthread_kill`
//!
//! Each module exposes the same set of `pub(crate)` functions, so the rest of
//! the core calls `platform::pc(...)` without caring which one was compiled.

#[cfg(any(target_os = "linux", target_os = "android"))]
mod linux;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) use linux::*;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
pub(crate) use macos::*;

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
compile_error!("faultline-core supports Linux, Android and macOS only");
