//! Bootstrap state machine.
//!
//! # Levels
//! - `Early` (0): image mapped, nothing else known. Heap, TLS and signals
//!   may not be usable; every call goes straight to the kernel.
//! - `RuntimeSafe` (1): the earliest load-time hook has run (signal
//!   disposition installed, debug switch read). Calls still go to the kernel.
//! - `Ready` (2): every static initializer has run; calls go to the resolver.
//!
//! The value only ever moves up. Readers use one acquire load; the two hooks
//! publish with `fetch_max`, so once any thread sees `Ready` no thread can
//! later see less.

pub mod guard;
pub mod init;

use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Early = 0,
    RuntimeSafe = 1,
    Ready = 2,
}

impl Level {
    /// Values outside the three levels read as `Early`.
    #[inline]
    pub const fn from_u8(v: u8) -> Self {
        match v {
            1 => Level::RuntimeSafe,
            2 => Level::Ready,
            _ => Level::Early,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Early => "early",
            Level::RuntimeSafe => "runtime_safe",
            Level::Ready => "ready",
        }
    }
}

pub struct BootstrapCell {
    level: AtomicU8,
}

impl Default for BootstrapCell {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapCell {
    pub const fn new() -> Self {
        Self {
            level: AtomicU8::new(Level::Early as u8),
        }
    }

    /// One atomic read; no side effects.
    #[inline(always)]
    pub fn load(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Acquire))
    }

    /// Raise the level to `target`. A lower or equal target leaves the value
    /// as it is. Returns the level observed before the call.
    #[inline]
    pub fn advance_to(&self, target: Level) -> Level {
        Level::from_u8(self.level.fetch_max(target as u8, Ordering::AcqRel))
    }

    #[inline(always)]
    pub fn is_ready(&self) -> bool {
        self.load() == Level::Ready
    }
}

/// The process-wide state, advanced only by the hooks in [`init`].
pub static BOOTSTRAP: BootstrapCell = BootstrapCell::new();

/// Current level as `0/1/2`.
#[no_mangle]
pub extern "C" fn vgate_bootstrap_level() -> libc::c_int {
    BOOTSTRAP.load() as u8 as libc::c_int
}
