// =============================================================================
// state/init.rs: Load-time hooks
// =============================================================================
//
// The two hooks that move BOOTSTRAP forward:
//
//   - runtime_safe_hook()  earliest initializer. SIGPIPE disposition, debug
//                          and profile switches (getenv only, no
//                          allocation) → RuntimeSafe
//   - ready_hook()         latest initializer. LayerConfig::from_env(),
//                          log level, forced pass-through, exit dump → Ready
//
// Linux orders them through .init_array priorities; Mach-O has none, so macOS
// gets one two-element __mod_init_func array.
// =============================================================================

use std::ffi::CStr;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use vgate_config::LayerConfig;

use super::{BootstrapCell, Level, BOOTSTRAP};
use crate::log::{self, LOGGER};
use crate::profile;
use crate::resolver::{ResolverSlot, RESOLVER};

/// Ignore SIGPIPE unless the host already chose a disposition. Returns true
/// when the ignore disposition was installed.
pub fn install_sigpipe_guard() -> bool {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    match unsafe { sigaction(Signal::SIGPIPE, &ignore) } {
        Ok(old) if matches!(old.handler(), SigHandler::SigDfl) => true,
        Ok(old) => {
            // Host handler or explicit ignore: put it back untouched
            let _ = unsafe { sigaction(Signal::SIGPIPE, &old) };
            false
        }
        Err(_) => false,
    }
}

/// Environment switch read without allocating, with the same vocabulary as
/// the ready hook's config. Unset or unrecognized values are false.
pub(crate) fn env_flag(name: &CStr) -> bool {
    let ptr = unsafe { libc::getenv(name.as_ptr()) };
    if ptr.is_null() {
        return false;
    }
    let value = unsafe { CStr::from_ptr(ptr) }.to_bytes();
    vgate_config::flag_value(value) == Some(true)
}

#[inline(never)]
pub(crate) fn enter_runtime_safe(state: &BootstrapCell) {
    install_sigpipe_guard();
    if env_flag(c"VGATE_DEBUG") {
        log::set_debug(true);
    }
    if env_flag(c"VGATE_PROFILE") {
        profile::set_enabled(true);
    }
    state.advance_to(Level::RuntimeSafe);
}

/// Apply `cfg` and publish `Ready` on `state`. Everything the dispatcher
/// consults must be in place before the level changes.
#[inline(never)]
pub(crate) fn enter_ready(cfg: &LayerConfig, state: &BootstrapCell, resolver: &ResolverSlot) {
    log::set_level(cfg.log_level.into());
    log::set_debug(cfg.debug);
    resolver.set_forced_passthrough(cfg.passthrough);

    let previous = state.advance_to(Level::Ready);
    vgate_info!(
        "ready (was {}), resolver={}, log_level={}",
        previous.as_str(),
        resolver.kind().as_str(),
        log::level().as_str()
    );
}

extern "C" fn dump_at_exit() {
    LOGGER.write_to(2);
}

unsafe extern "C" fn runtime_safe_hook() {
    enter_runtime_safe(&BOOTSTRAP);
}

unsafe extern "C" fn ready_hook() {
    let (cfg, rejected) = LayerConfig::from_env();
    if cfg.dump_log_on_exit {
        libc::atexit(dump_at_exit);
    }
    enter_ready(&cfg, &BOOTSTRAP, &RESOLVER);
    for err in &rejected {
        vgate_warn!("ignoring environment override: {}", err);
    }
}

// .init_array.NNNNN entries run in ascending priority before the plain
// .init_array ones; 0-100 are reserved for the toolchain.
#[cfg(target_os = "linux")]
#[used]
#[link_section = ".init_array.00101"]
static RUNTIME_SAFE_HOOK: unsafe extern "C" fn() = runtime_safe_hook;

#[cfg(target_os = "linux")]
#[used]
#[link_section = ".init_array"]
static READY_HOOK: unsafe extern "C" fn() = ready_hook;

#[cfg(target_os = "macos")]
#[used]
#[link_section = "__DATA,__mod_init_func"]
static INIT_HOOKS: [unsafe extern "C" fn(); 2] = [runtime_safe_hook, ready_hook];
