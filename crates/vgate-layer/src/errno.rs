//! Errno bridge: the calling thread's error cell, shared by the layer, the
//! C boundary and resolvers written in other languages.

use libc::c_int;

#[cfg(target_os = "macos")]
use crate::state::{Level, BOOTSTRAP};

/// Store `e` in the calling thread's errno.
///
/// On macOS the libSystem errno slot may not exist while the state is
/// `Early`; the write is skipped there (the caller still sees `-1`).
#[inline]
pub unsafe fn set_errno(e: c_int) {
    #[cfg(target_os = "macos")]
    {
        if BOOTSTRAP.load() == Level::Early {
            return;
        }
        *libc::__error() = e;
    }
    #[cfg(target_os = "linux")]
    {
        *libc::__errno_location() = e;
    }
}

#[inline]
pub unsafe fn get_errno() -> c_int {
    #[cfg(target_os = "macos")]
    {
        if BOOTSTRAP.load() == Level::Early {
            return 0;
        }
        *libc::__error()
    }
    #[cfg(target_os = "linux")]
    {
        *libc::__errno_location()
    }
}

#[no_mangle]
pub unsafe extern "C" fn vgate_set_errno(e: c_int) {
    set_errno(e)
}

#[no_mangle]
pub unsafe extern "C" fn vgate_get_errno() -> c_int {
    get_errno()
}

// Linux only: macOS leaves errno alone while `Early`, which depends on
// whether the test binary ran the load-time hooks.
#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        unsafe {
            vgate_set_errno(libc::EXDEV);
            assert_eq!(vgate_get_errno(), libc::EXDEV);
            assert_eq!(std::io::Error::last_os_error().raw_os_error(), Some(libc::EXDEV));
        }
    }

    #[test]
    fn test_errno_is_per_thread() {
        unsafe { set_errno(libc::EPERM) };
        let other = std::thread::spawn(|| unsafe {
            set_errno(libc::EACCES);
            get_errno()
        })
        .join()
        .unwrap();
        assert_eq!(other, libc::EACCES);
        assert_eq!(unsafe { get_errno() }, libc::EPERM);
    }
}
