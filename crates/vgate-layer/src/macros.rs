/// Fixed-buffer `fmt::Write` sink. Output past the end of the buffer is
/// dropped (cut back to a char boundary) and remembered in `overflowed`.
pub struct StackWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    overflowed: bool,
}

impl<'a> StackWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overflowed: false,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.buf[..self.pos]).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }
}

impl<'a> std::fmt::Write for StackWriter<'a> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let remaining = self.buf.len() - self.pos;
        let mut to_copy = std::cmp::min(s.len(), remaining);
        if to_copy < s.len() {
            self.overflowed = true;
            while !s.is_char_boundary(to_copy) {
                to_copy -= 1;
            }
        }
        self.buf[self.pos..self.pos + to_copy].copy_from_slice(&s.as_bytes()[..to_copy]);
        self.pos += to_copy;
        Ok(())
    }
}

/// Format on the stack and append to the flight log; mirrored to stderr when
/// debug output is on. Usable at any bootstrap level.
#[macro_export]
macro_rules! vgate_log_at_level {
    ($level:expr, $tag:expr, $($arg:tt)*) => {
        {
            if $crate::log::enabled($level) {
                use std::fmt::Write;
                let mut buf = [0u8; 512];
                let mut wrapper = $crate::macros::StackWriter::new(&mut buf);
                let pid = unsafe { libc::getpid() };
                let _ = write!(wrapper, "[VGATE][{}][{}] ", pid, $tag);
                let _ = write!(wrapper, $($arg)*);
                let _ = writeln!(wrapper);
                $crate::log::emit(wrapper.as_str());
            }
        }
    };
}

#[macro_export]
macro_rules! vgate_trace { ($($arg:tt)*) => { $crate::vgate_log_at_level!($crate::log::LogLevel::Trace, "TRACE", $($arg)*) }; }
#[macro_export]
macro_rules! vgate_debug { ($($arg:tt)*) => { $crate::vgate_log_at_level!($crate::log::LogLevel::Debug, "DEBUG", $($arg)*) }; }
#[macro_export]
macro_rules! vgate_info { ($($arg:tt)*) => { $crate::vgate_log_at_level!($crate::log::LogLevel::Info, "INFO", $($arg)*) }; }
#[macro_export]
macro_rules! vgate_warn { ($($arg:tt)*) => { $crate::vgate_log_at_level!($crate::log::LogLevel::Warn, "WARN", $($arg)*) }; }
#[macro_export]
macro_rules! vgate_error { ($($arg:tt)*) => { $crate::vgate_log_at_level!($crate::log::LogLevel::Error, "ERROR", $($arg)*) }; }
