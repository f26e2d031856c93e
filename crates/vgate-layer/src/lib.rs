//! # vgate-layer
//!
//! LD_PRELOAD / DYLD_INSERT_LIBRARIES filesystem interception layer.
//! Zero-allocation and lock-free on every interposed path.
//!
//! Intercepted calls are routed by the bootstrap level:
//!
//! ```text
//! libc caller ─► interpose (symbol / __interpose) ─► dispatch
//!                                                     ├─ < Ready ─► raw syscall
//!                                                     └─ Ready ───► resolver table
//! ```
//!
//! # Init-phase rules
//!
//! Until the bootstrap state is `Ready`, code reachable from an interposed
//! symbol must not:
//! - allocate (`String`, `Vec`, `format!`) → use `macros::StackWriter`
//! - take locks or touch Rust TLS
//! - call libc filesystem functions (they come straight back here) → use
//!   `syscalls::fs`
//! - panic → return `-1` with errno
//!
//! Resolvers plug in through [`resolver::install_resolver`] or the C export
//! `vgate_install_resolver`.

// Allow unsafe FFI functions without safety docs - these are inherently unsafe C ABI
#![allow(clippy::missing_safety_doc)]

// Macros must be defined before modules that use them
#[macro_use]
pub mod macros;

pub mod descriptor;
pub mod dispatch;
pub mod errno;
pub mod interpose;
pub mod log;
pub mod profile;
pub mod resolver;
pub mod state;
pub mod syscalls;

pub use dispatch::{Dispatcher, DISPATCH};
pub use errno::{vgate_get_errno, vgate_set_errno};
pub use resolver::{install_resolver, ResolverKind, ResolverSlot, ResolverTable, RESOLVER};
pub use state::{BootstrapCell, Level, BOOTSTRAP};
pub use syscalls::raw::RawOutcome;

/// Telemetry export for diagnostics tooling.
/// Writes a NUL-terminated JSON object to `buf`.
/// Returns its length (without the NUL), or -1 if `buf` is null or too small.
#[no_mangle]
pub unsafe extern "C" fn vgate_get_telemetry(
    buf: *mut libc::c_char,
    buf_size: usize,
) -> libc::c_int {
    use std::fmt::Write;
    if buf.is_null() || buf_size == 0 {
        return -1;
    }

    let mut scratch = [0u8; 2048];
    let mut writer = crate::macros::StackWriter::new(&mut scratch);

    let pid = libc::getpid();
    let level = BOOTSTRAP.load();
    let kind = RESOLVER.kind();

    let _ = write!(writer, "{{");
    let _ = write!(writer, "\"pid\":{},", pid);
    let _ = write!(writer, "\"bootstrap_level\":\"{}\",", level.as_str());
    let _ = write!(writer, "\"resolver\":\"{}\",", kind.as_str());
    let _ = write!(
        writer,
        "\"passthrough\":{},",
        kind != ResolverKind::Custom
    );
    let _ = write!(writer, "\"log_level\":\"{}\",", log::level().as_str());
    let _ = write!(writer, "\"debug\":{},", log::debug_enabled());
    let _ = write!(writer, "\"log_bytes\":{},", log::LOGGER.bytes_logged());
    write_profile(&mut writer);
    let _ = write!(writer, "}}");

    if writer.overflowed() {
        return -1;
    }
    let out = writer.as_str().as_bytes();
    if out.len() + 1 > buf_size {
        return -1;
    }

    std::ptr::copy_nonoverlapping(out.as_ptr(), buf as *mut u8, out.len());
    *buf.add(out.len()) = 0;
    out.len() as libc::c_int
}

/// `"profile":{...}`. Per-function counts are listed only while profiling is on.
fn write_profile(writer: &mut crate::macros::StackWriter<'_>) {
    use std::fmt::Write;
    use std::sync::atomic::Ordering::Relaxed;

    let p = &profile::PROFILE;
    let on = profile::enabled();
    let _ = write!(writer, "\"profile\":{{\"enabled\":{}", on);
    let _ = write!(writer, ",\"direct\":{}", p.direct.load(Relaxed));
    let _ = write!(writer, ",\"resolved\":{}", p.resolved.load(Relaxed));
    let _ = write!(writer, ",\"nested\":{}", p.nested.load(Relaxed));
    if on {
        let _ = write!(writer, ",\"calls\":{{");
        let mut first = true;
        for d in descriptor::ALL {
            if let Some(n) = p.calls(d.name) {
                let sep = if first { "" } else { "," };
                let _ = write!(writer, "{}\"{}\":{}", sep, d.name, n);
                first = false;
            }
        }
        let _ = write!(writer, "}}");
    }
    let _ = write!(writer, "}}");
}
