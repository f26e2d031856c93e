//! Interposition: making the loader send libc calls to the dispatcher.
//!
//! - macOS: a `__DATA,__interpose` table of (replacement, original) records
//!   that dyld applies to every image. Variadic functions go through the C
//!   boundary in `src/c/variadic_boundary.c`.
//! - Linux: the replacement is exported under the libc name and wins by
//!   preload order (`LD_PRELOAD`). SysV x86_64 and AArch64 Linux pass
//!   variadic arguments in the same registers as fixed ones, so `open`,
//!   `openat` and `fcntl` are declared with their full fixed signature.
//!
//! Safety: All extern "C" functions here are dangerous FFI and must be used correctly.

use libc::{c_char, c_int, c_void, mode_t, size_t, ssize_t, stat as libc_stat};

use crate::dispatch::DISPATCH;

// =============================================================================
// macOS dyld __interpose table
// =============================================================================

#[cfg(target_os = "macos")]
#[repr(C)]
pub struct Interpose {
    pub new_func: *const (),
    pub old_func: *const (),
}

#[cfg(target_os = "macos")]
unsafe impl Sync for Interpose {}

#[cfg(target_os = "macos")]
extern "C" {
    fn vgate_open_boundary(path: *const c_char, flags: c_int, ...) -> c_int;
    fn vgate_openat_boundary(dirfd: c_int, path: *const c_char, flags: c_int, ...) -> c_int;
    fn vgate_fcntl_boundary(fd: c_int, cmd: c_int, ...) -> c_int;
}

#[cfg(target_os = "macos")]
extern "C" {
    #[link_name = "open"]
    fn real_open(path: *const c_char, flags: c_int, ...) -> c_int;
    #[link_name = "openat"]
    fn real_openat(dirfd: c_int, path: *const c_char, flags: c_int, ...) -> c_int;
    #[link_name = "creat"]
    fn real_creat(path: *const c_char, mode: mode_t) -> c_int;
    #[cfg_attr(target_arch = "x86_64", link_name = "stat$INODE64")]
    #[cfg_attr(not(target_arch = "x86_64"), link_name = "stat")]
    fn real_stat(path: *const c_char, buf: *mut libc_stat) -> c_int;
    #[cfg_attr(target_arch = "x86_64", link_name = "lstat$INODE64")]
    #[cfg_attr(not(target_arch = "x86_64"), link_name = "lstat")]
    fn real_lstat(path: *const c_char, buf: *mut libc_stat) -> c_int;
    #[cfg_attr(target_arch = "x86_64", link_name = "fstat$INODE64")]
    #[cfg_attr(not(target_arch = "x86_64"), link_name = "fstat")]
    fn real_fstat(fd: c_int, buf: *mut libc_stat) -> c_int;
    #[cfg_attr(target_arch = "x86_64", link_name = "fstatat$INODE64")]
    #[cfg_attr(not(target_arch = "x86_64"), link_name = "fstatat")]
    fn real_fstatat(dirfd: c_int, path: *const c_char, buf: *mut libc_stat, flags: c_int) -> c_int;
    #[link_name = "access"]
    fn real_access(path: *const c_char, mode: c_int) -> c_int;
    #[link_name = "faccessat"]
    fn real_faccessat(dirfd: c_int, path: *const c_char, mode: c_int, flags: c_int) -> c_int;
    #[link_name = "readlink"]
    fn real_readlink(path: *const c_char, buf: *mut c_char, bufsiz: size_t) -> ssize_t;
    #[link_name = "readlinkat"]
    fn real_readlinkat(
        dirfd: c_int,
        path: *const c_char,
        buf: *mut c_char,
        bufsiz: size_t,
    ) -> ssize_t;
    #[link_name = "rename"]
    fn real_rename(old: *const c_char, new: *const c_char) -> c_int;
    #[link_name = "renameat"]
    fn real_renameat(olddirfd: c_int, old: *const c_char, newdirfd: c_int, new: *const c_char) -> c_int;
    #[link_name = "fcntl"]
    fn real_fcntl(fd: c_int, cmd: c_int, ...) -> c_int;
    #[link_name = "getxattr"]
    fn real_getxattr(
        path: *const c_char,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> ssize_t;
    #[link_name = "fgetxattr"]
    fn real_fgetxattr(
        fd: c_int,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> ssize_t;
    #[link_name = "setxattr"]
    fn real_setxattr(
        path: *const c_char,
        name: *const c_char,
        value: *const c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> c_int;
    #[link_name = "listxattr"]
    fn real_listxattr(path: *const c_char, list: *mut c_char, size: size_t, options: c_int) -> ssize_t;
    #[link_name = "removexattr"]
    fn real_removexattr(path: *const c_char, name: *const c_char, options: c_int) -> c_int;
}

#[cfg(target_os = "macos")]
mod entry {
    use super::*;

    pub unsafe extern "C" fn creat(path: *const c_char, mode: mode_t) -> c_int {
        DISPATCH.creat(path, mode)
    }
    pub unsafe extern "C" fn stat(path: *const c_char, buf: *mut libc_stat) -> c_int {
        DISPATCH.stat(path, buf)
    }
    pub unsafe extern "C" fn lstat(path: *const c_char, buf: *mut libc_stat) -> c_int {
        DISPATCH.lstat(path, buf)
    }
    pub unsafe extern "C" fn fstat(fd: c_int, buf: *mut libc_stat) -> c_int {
        DISPATCH.fstat(fd, buf)
    }
    pub unsafe extern "C" fn fstatat(
        dirfd: c_int,
        path: *const c_char,
        buf: *mut libc_stat,
        flags: c_int,
    ) -> c_int {
        DISPATCH.fstatat(dirfd, path, buf, flags)
    }
    pub unsafe extern "C" fn access(path: *const c_char, mode: c_int) -> c_int {
        DISPATCH.access(path, mode)
    }
    pub unsafe extern "C" fn faccessat(
        dirfd: c_int,
        path: *const c_char,
        mode: c_int,
        flags: c_int,
    ) -> c_int {
        DISPATCH.faccessat(dirfd, path, mode, flags)
    }
    pub unsafe extern "C" fn readlink(path: *const c_char, buf: *mut c_char, bufsiz: size_t) -> ssize_t {
        DISPATCH.readlink(path, buf, bufsiz)
    }
    pub unsafe extern "C" fn readlinkat(
        dirfd: c_int,
        path: *const c_char,
        buf: *mut c_char,
        bufsiz: size_t,
    ) -> ssize_t {
        DISPATCH.readlinkat(dirfd, path, buf, bufsiz)
    }
    pub unsafe extern "C" fn rename(old: *const c_char, new: *const c_char) -> c_int {
        DISPATCH.rename(old, new)
    }
    pub unsafe extern "C" fn renameat(
        olddirfd: c_int,
        old: *const c_char,
        newdirfd: c_int,
        new: *const c_char,
    ) -> c_int {
        DISPATCH.renameat(olddirfd, old, newdirfd, new)
    }
    pub unsafe extern "C" fn getxattr(
        path: *const c_char,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> ssize_t {
        DISPATCH.getxattr(path, name, value, size, position, options)
    }
    pub unsafe extern "C" fn fgetxattr(
        fd: c_int,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> ssize_t {
        DISPATCH.fgetxattr(fd, name, value, size, position, options)
    }
    pub unsafe extern "C" fn setxattr(
        path: *const c_char,
        name: *const c_char,
        value: *const c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> c_int {
        DISPATCH.setxattr(path, name, value, size, position, options)
    }
    pub unsafe extern "C" fn listxattr(
        path: *const c_char,
        list: *mut c_char,
        size: size_t,
        options: c_int,
    ) -> ssize_t {
        DISPATCH.listxattr(path, list, size, options)
    }
    pub unsafe extern "C" fn removexattr(path: *const c_char, name: *const c_char, options: c_int) -> c_int {
        DISPATCH.removexattr(path, name, options)
    }
}

/// One `__interpose` record per intercepted function.
#[cfg(target_os = "macos")]
macro_rules! interpose {
    ($($record:ident: $new:expr => $old:expr;)*) => {
        $(
            #[link_section = "__DATA,__interpose"]
            #[used]
            pub static $record: Interpose = Interpose {
                new_func: $new as *const (),
                old_func: $old as *const (),
            };
        )*
    };
}

#[cfg(target_os = "macos")]
interpose! {
    IT_OPEN: vgate_open_boundary => real_open;
    IT_OPENAT: vgate_openat_boundary => real_openat;
    IT_CREAT: entry::creat => real_creat;
    IT_STAT: entry::stat => real_stat;
    IT_LSTAT: entry::lstat => real_lstat;
    IT_FSTAT: entry::fstat => real_fstat;
    IT_FSTATAT: entry::fstatat => real_fstatat;
    IT_ACCESS: entry::access => real_access;
    IT_FACCESSAT: entry::faccessat => real_faccessat;
    IT_READLINK: entry::readlink => real_readlink;
    IT_READLINKAT: entry::readlinkat => real_readlinkat;
    IT_RENAME: entry::rename => real_rename;
    IT_RENAMEAT: entry::renameat => real_renameat;
    IT_FCNTL: vgate_fcntl_boundary => real_fcntl;
    IT_GETXATTR: entry::getxattr => real_getxattr;
    IT_FGETXATTR: entry::fgetxattr => real_fgetxattr;
    IT_SETXATTR: entry::setxattr => real_setxattr;
    IT_LISTXATTR: entry::listxattr => real_listxattr;
    IT_REMOVEXATTR: entry::removexattr => real_removexattr;
}

// =============================================================================
// Linux LD_PRELOAD Symbol Exports
// =============================================================================
// On 64-bit Linux `struct stat` and `struct stat64` share a layout, so the
// *64 aliases and the glibc __*xstat* compatibility names (which carry a
// leading version argument) land on the same dispatcher entries.

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    DISPATCH.open(path, flags, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    DISPATCH.open(path, flags, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn openat(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    DISPATCH.openat(dirfd, path, flags, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn openat64(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    DISPATCH.openat(dirfd, path, flags, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn creat(path: *const c_char, mode: mode_t) -> c_int {
    DISPATCH.creat(path, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn creat64(path: *const c_char, mode: mode_t) -> c_int {
    DISPATCH.creat(path, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn stat(path: *const c_char, buf: *mut libc_stat) -> c_int {
    DISPATCH.stat(path, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn stat64(path: *const c_char, buf: *mut libc_stat) -> c_int {
    DISPATCH.stat(path, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __xstat(_ver: c_int, path: *const c_char, buf: *mut libc_stat) -> c_int {
    DISPATCH.stat(path, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __xstat64(_ver: c_int, path: *const c_char, buf: *mut libc_stat) -> c_int {
    DISPATCH.stat(path, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn lstat(path: *const c_char, buf: *mut libc_stat) -> c_int {
    DISPATCH.lstat(path, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn lstat64(path: *const c_char, buf: *mut libc_stat) -> c_int {
    DISPATCH.lstat(path, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __lxstat(_ver: c_int, path: *const c_char, buf: *mut libc_stat) -> c_int {
    DISPATCH.lstat(path, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __lxstat64(_ver: c_int, path: *const c_char, buf: *mut libc_stat) -> c_int {
    DISPATCH.lstat(path, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn fstat(fd: c_int, buf: *mut libc_stat) -> c_int {
    DISPATCH.fstat(fd, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn fstat64(fd: c_int, buf: *mut libc_stat) -> c_int {
    DISPATCH.fstat(fd, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __fxstat(_ver: c_int, fd: c_int, buf: *mut libc_stat) -> c_int {
    DISPATCH.fstat(fd, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __fxstat64(_ver: c_int, fd: c_int, buf: *mut libc_stat) -> c_int {
    DISPATCH.fstat(fd, buf)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn fstatat(
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc_stat,
    flags: c_int,
) -> c_int {
    DISPATCH.fstatat(dirfd, path, buf, flags)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn fstatat64(
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc_stat,
    flags: c_int,
) -> c_int {
    DISPATCH.fstatat(dirfd, path, buf, flags)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __fxstatat(
    _ver: c_int,
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc_stat,
    flags: c_int,
) -> c_int {
    DISPATCH.fstatat(dirfd, path, buf, flags)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __fxstatat64(
    _ver: c_int,
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc_stat,
    flags: c_int,
) -> c_int {
    DISPATCH.fstatat(dirfd, path, buf, flags)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn access(path: *const c_char, mode: c_int) -> c_int {
    DISPATCH.access(path, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn faccessat(
    dirfd: c_int,
    path: *const c_char,
    mode: c_int,
    flags: c_int,
) -> c_int {
    DISPATCH.faccessat(dirfd, path, mode, flags)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn readlink(path: *const c_char, buf: *mut c_char, bufsiz: size_t) -> ssize_t {
    DISPATCH.readlink(path, buf, bufsiz)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn readlinkat(
    dirfd: c_int,
    path: *const c_char,
    buf: *mut c_char,
    bufsiz: size_t,
) -> ssize_t {
    DISPATCH.readlinkat(dirfd, path, buf, bufsiz)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn rename(old: *const c_char, new: *const c_char) -> c_int {
    DISPATCH.rename(old, new)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn renameat(
    olddirfd: c_int,
    old: *const c_char,
    newdirfd: c_int,
    new: *const c_char,
) -> c_int {
    DISPATCH.renameat(olddirfd, old, newdirfd, new)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn fcntl(fd: c_int, cmd: c_int, arg: libc::intptr_t) -> c_int {
    DISPATCH.fcntl(fd, cmd, arg)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn fcntl64(fd: c_int, cmd: c_int, arg: libc::intptr_t) -> c_int {
    DISPATCH.fcntl(fd, cmd, arg)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn getxattr(
    path: *const c_char,
    name: *const c_char,
    value: *mut c_void,
    size: size_t,
) -> ssize_t {
    DISPATCH.getxattr(path, name, value, size)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn lgetxattr(
    path: *const c_char,
    name: *const c_char,
    value: *mut c_void,
    size: size_t,
) -> ssize_t {
    DISPATCH.lgetxattr(path, name, value, size)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn fgetxattr(
    fd: c_int,
    name: *const c_char,
    value: *mut c_void,
    size: size_t,
) -> ssize_t {
    DISPATCH.fgetxattr(fd, name, value, size)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn setxattr(
    path: *const c_char,
    name: *const c_char,
    value: *const c_void,
    size: size_t,
    flags: c_int,
) -> c_int {
    DISPATCH.setxattr(path, name, value, size, flags)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn lsetxattr(
    path: *const c_char,
    name: *const c_char,
    value: *const c_void,
    size: size_t,
    flags: c_int,
) -> c_int {
    DISPATCH.lsetxattr(path, name, value, size, flags)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn listxattr(path: *const c_char, list: *mut c_char, size: size_t) -> ssize_t {
    DISPATCH.listxattr(path, list, size)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn llistxattr(path: *const c_char, list: *mut c_char, size: size_t) -> ssize_t {
    DISPATCH.llistxattr(path, list, size)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn removexattr(path: *const c_char, name: *const c_char) -> c_int {
    DISPATCH.removexattr(path, name)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn lremovexattr(path: *const c_char, name: *const c_char) -> c_int {
    DISPATCH.lremovexattr(path, name)
}
