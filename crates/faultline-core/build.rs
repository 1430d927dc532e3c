//! Build script for faultline-core
//!
//! This script checks the toolchain and decides which load site
//! implementation the target gets:
//! - Minimum Rust version (`global_asm!` = Rust 1.59.0+)
//! - Hand-written load sites for supported OS/architecture pairs
//!   (`cfg(faultline_native_sites)`)
//! - A warning when the generic fallback is used
//!
//! ## Supported targets
//!
//! - **Linux/Android**: x86_64, x86, arm, aarch64
//! - **macOS**: x86_64, aarch64
//!
//! Anything else builds with the generic fallback. Faults in default-taking
//! load sites are never recovered there, and faults in `load` only on
//! riscv64 Linux.

use std::env;

fn main()
{
    // global_asm! and asm! were stabilized together in Rust 1.59.0
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 59, 0);

        if rustc_version < min_rust_version {
            panic!(
                "faultline-core requires Rust {} or newer (global_asm!), found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    println!("cargo:rustc-check-cfg=cfg(faultline_native_sites)");
    println!("cargo:rerun-if-changed=build.rs");

    // The build script runs on the host, so cfg!(target_arch) would describe
    // the host. Cargo passes the real target through the environment.
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    if has_native_sites(&arch, &os) {
        println!("cargo:rustc-cfg=faultline_native_sites");
    } else {
        println!(
            "cargo:warning=faultline-core has no hand-written load sites for {arch}-{os}; \
             using the generic fallback"
        );
    }
}

fn has_native_sites(arch: &str, os: &str) -> bool
{
    match os {
        "linux" | "android" => matches!(arch, "x86_64" | "x86" | "arm" | "aarch64"),
        "macos" => matches!(arch, "x86_64" | "aarch64"),
        _ => false,
    }
}
