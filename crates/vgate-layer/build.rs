//! Build script for vgate-layer
//!
//! Compiles the C variadic boundary that reads `va_list` correctly on macOS.
//! Apple ARM64 passes variadic arguments on the stack, so `open`, `openat` and
//! `fcntl` cannot be declared with a fixed Rust signature there. Linux targets
//! pass them in the same registers as fixed arguments and need no C.

fn main() {
    println!("cargo:rerun-if-changed=src/c/variadic_boundary.c");

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "macos" {
        cc::Build::new()
            .file("src/c/variadic_boundary.c")
            .opt_level(2)
            .compile("variadic_boundary");
    }
}
