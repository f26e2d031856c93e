//! Flight log: a fixed ring of bytes that records layer activity without
//! allocating or locking, at any bootstrap level.
//!
//! Writers reserve space with one `fetch_add` on `head` and copy their bytes
//! in; concurrent writers never share a byte range until the ring wraps.
//! Readers are diagnostic only and may see a record that is still being
//! written.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use libc::{c_int, c_void};

use crate::descriptor;
use crate::syscalls::{fs, raw};

pub(crate) const LOG_BUF_SIZE: usize = 64 * 1024;

/// Layer log levels; same order and names as `vgate_config::LogLevel`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Off = 5,
}

impl From<vgate_config::LogLevel> for LogLevel {
    fn from(level: vgate_config::LogLevel) -> Self {
        match level {
            vgate_config::LogLevel::Trace => LogLevel::Trace,
            vgate_config::LogLevel::Debug => LogLevel::Debug,
            vgate_config::LogLevel::Info => LogLevel::Info,
            vgate_config::LogLevel::Warn => LogLevel::Warn,
            vgate_config::LogLevel::Error => LogLevel::Error,
            vgate_config::LogLevel::Off => LogLevel::Off,
        }
    }
}

impl LogLevel {
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            4 => LogLevel::Error,
            _ => LogLevel::Off,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

pub static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
pub static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

pub struct Logger {
    buffer: UnsafeCell<[u8; LOG_BUF_SIZE]>,
    pub(crate) head: AtomicUsize,
}

// Writers only touch the range they reserved through `head`.
unsafe impl Sync for Logger {}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    pub const fn new() -> Self {
        Self {
            buffer: UnsafeCell::new([0u8; LOG_BUF_SIZE]),
            head: AtomicUsize::new(0),
        }
    }

    pub fn log(&self, msg: &str) {
        let len = msg.len();
        if len == 0 || len > LOG_BUF_SIZE {
            return;
        }

        let start = self.head.fetch_add(len, Ordering::AcqRel);
        let base = self.buffer.get() as *mut u8;
        for (i, &b) in msg.as_bytes().iter().enumerate() {
            unsafe {
                *base.add((start + i) % LOG_BUF_SIZE) = b;
            }
        }
    }

    /// Total bytes ever logged (not capped at the ring size).
    pub fn bytes_logged(&self) -> usize {
        self.head.load(Ordering::Acquire)
    }

    /// The retained bytes in write order, as at most two slices.
    fn retained(&self) -> (&[u8], &[u8]) {
        let head = self.head.load(Ordering::Acquire);
        let buf = unsafe { &*self.buffer.get() };
        if head <= LOG_BUF_SIZE {
            (&buf[..head], &[])
        } else {
            let split = head % LOG_BUF_SIZE;
            (&buf[split..], &buf[..split])
        }
    }

    /// Write the retained log to `fd` through the raw invoker. Returns the
    /// number of bytes written, or -1 with errno set.
    pub fn write_to(&self, fd: c_int) -> isize {
        let (first, second) = self.retained();
        let mut total = 0isize;
        for part in [first, second] {
            let mut rest = part;
            while !rest.is_empty() {
                let n = unsafe { fs::write(fd, rest.as_ptr() as *const c_void, rest.len()) };
                if n < 0 {
                    return -1;
                }
                if n == 0 {
                    return total;
                }
                total += n;
                rest = &rest[n as usize..];
            }
        }
        total
    }
}

pub static LOGGER: Logger = Logger::new();

#[inline]
pub fn enabled(level: LogLevel) -> bool {
    LOG_LEVEL.load(Ordering::Relaxed) <= level as u8
}

pub fn level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_debug(on: bool) {
    DEBUG_ENABLED.store(on, Ordering::Relaxed);
}

pub fn debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Append a formatted record; mirror it to stderr when debug is on.
pub fn emit(msg: &str) {
    LOGGER.log(msg);
    if debug_enabled() {
        mirror(libc::STDERR_FILENO, msg);
    }
}

/// Best-effort copy of `msg` to `fd`. Errors are dropped without touching
/// errno: records are emitted from inside intercepted calls.
pub(crate) fn mirror(fd: c_int, msg: &str) {
    let _ = unsafe {
        raw::call(
            &descriptor::WRITE,
            &[raw::int_word(fd), msg.as_ptr() as usize, msg.len()],
        )
    };
}

/// Write the flight log to `fd`. Returns bytes written or -1.
#[no_mangle]
pub extern "C" fn vgate_dump_log(fd: c_int) -> isize {
    LOGGER.write_to(fd)
}
