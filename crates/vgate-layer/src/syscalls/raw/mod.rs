//! Raw kernel invocation.
//!
//! One [`invoke`] per (OS, arch) issues the trap with up to six argument
//! words and returns a [`RawOutcome`]. Nothing on this path allocates, locks,
//! touches TLS or calls into libc, so it is safe from the first instruction
//! after the image is mapped and never recurses into the layer's own exports.
//!
//! Two kernel error conventions exist:
//! - Linux returns `-errno` in `[-4095, -1]` ([`normalize_negative`])
//! - Darwin sets the carry flag and leaves errno in the result register
//!   ([`normalize_carry`])

use libc::{c_int, ssize_t};

use crate::descriptor::{SyscallDescriptor, MAX_ARGS};

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::invoke;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
pub use macos::invoke;

/// Kernel result split into value and error code. `errno` is 0 on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawOutcome {
    pub ret: isize,
    pub errno: c_int,
}

impl RawOutcome {
    pub const fn ok(ret: isize) -> Self {
        Self { ret, errno: 0 }
    }

    pub const fn fail(errno: c_int) -> Self {
        Self { ret: -1, errno }
    }

    pub const fn is_err(&self) -> bool {
        self.errno != 0
    }

    /// C contract for `int` returning calls: -1 with errno set, or the value.
    #[inline]
    pub unsafe fn into_c_int(self) -> c_int {
        if self.is_err() {
            crate::errno::set_errno(self.errno);
            -1
        } else {
            self.ret as c_int
        }
    }

    /// C contract for `ssize_t` returning calls.
    #[inline]
    pub unsafe fn into_ssize(self) -> ssize_t {
        if self.is_err() {
            crate::errno::set_errno(self.errno);
            -1
        } else {
            self.ret as ssize_t
        }
    }
}

/// Highest errno the Linux kernel encodes in a return value.
pub const MAX_ERRNO: isize = 4095;

/// Linux convention: `[-4095, -1]` is `-errno`, everything else is a result
/// (large unsigned values such as mmap addresses included).
#[inline]
pub const fn normalize_negative(raw: isize) -> RawOutcome {
    if raw < 0 && raw >= -MAX_ERRNO {
        RawOutcome::fail(-raw as c_int)
    } else {
        RawOutcome::ok(raw)
    }
}

/// Darwin convention: carry set means `raw` is the errno.
#[inline]
pub const fn normalize_carry(carry: bool, raw: isize) -> RawOutcome {
    if carry {
        RawOutcome::fail(raw as c_int)
    } else {
        RawOutcome::ok(raw)
    }
}

/// Lower `args` through the descriptor's shape and trap.
#[inline]
pub unsafe fn call(desc: &SyscallDescriptor, args: &[usize]) -> RawOutcome {
    let (nr, words): (usize, [usize; MAX_ARGS]) = desc.shape.lower(args);
    invoke(nr, words)
}

/// Sign-extend an `int` argument into a register word.
#[inline(always)]
pub const fn int_word(v: c_int) -> usize {
    v as isize as usize
}
