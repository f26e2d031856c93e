//! Typed filesystem calls straight to the kernel.
//!
//! Each wrapper lowers its arguments through the descriptor table and turns
//! the outcome into the C contract (`-1` + errno, or the value). These are the
//! pre-`READY` path of every dispatcher entry and the bodies of the
//! pass-through resolver table.

use libc::{c_char, c_int, c_void, intptr_t, mode_t, size_t, ssize_t, stat as libc_stat};

use super::raw::{self, int_word};
use crate::descriptor as d;

pub unsafe fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    raw::call(&d::OPEN, &[path as usize, int_word(flags), mode as usize]).into_c_int()
}

pub unsafe fn openat(dirfd: c_int, path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    raw::call(
        &d::OPENAT,
        &[int_word(dirfd), path as usize, int_word(flags), mode as usize],
    )
    .into_c_int()
}

pub unsafe fn creat(path: *const c_char, mode: mode_t) -> c_int {
    raw::call(&d::CREAT, &[path as usize, mode as usize]).into_c_int()
}

pub unsafe fn stat(path: *const c_char, buf: *mut libc_stat) -> c_int {
    raw::call(&d::STAT, &[path as usize, buf as usize]).into_c_int()
}

pub unsafe fn lstat(path: *const c_char, buf: *mut libc_stat) -> c_int {
    raw::call(&d::LSTAT, &[path as usize, buf as usize]).into_c_int()
}

pub unsafe fn fstat(fd: c_int, buf: *mut libc_stat) -> c_int {
    raw::call(&d::FSTAT, &[int_word(fd), buf as usize]).into_c_int()
}

pub unsafe fn fstatat(dirfd: c_int, path: *const c_char, buf: *mut libc_stat, flags: c_int) -> c_int {
    raw::call(
        &d::FSTATAT,
        &[int_word(dirfd), path as usize, buf as usize, int_word(flags)],
    )
    .into_c_int()
}

pub unsafe fn access(path: *const c_char, mode: c_int) -> c_int {
    raw::call(&d::ACCESS, &[path as usize, int_word(mode)]).into_c_int()
}

pub unsafe fn faccessat(dirfd: c_int, path: *const c_char, mode: c_int, flags: c_int) -> c_int {
    #[cfg(target_os = "linux")]
    {
        let plain = [int_word(dirfd), path as usize, int_word(mode)];
        if flags == 0 {
            return raw::call(&d::FACCESSAT, &plain).into_c_int();
        }
        let out = raw::call(
            &d::FACCESSAT2,
            &[int_word(dirfd), path as usize, int_word(mode), int_word(flags)],
        );
        // Kernels before 5.8 lack faccessat2
        if out.errno == libc::ENOSYS && eaccess_is_plain(flags, ids_match()) {
            return raw::call(&d::FACCESSAT, &plain).into_c_int();
        }
        out.into_c_int()
    }
    #[cfg(target_os = "macos")]
    {
        raw::call(
            &d::FACCESSAT,
            &[int_word(dirfd), path as usize, int_word(mode), int_word(flags)],
        )
        .into_c_int()
    }
}

/// `AT_EACCESS` alone checks the same ids as no flags at all when the real
/// and effective ids agree.
#[cfg(target_os = "linux")]
pub(crate) const fn eaccess_is_plain(flags: c_int, ids_match: bool) -> bool {
    flags == libc::AT_EACCESS && ids_match
}

#[cfg(target_os = "linux")]
fn ids_match() -> bool {
    unsafe { libc::getuid() == libc::geteuid() && libc::getgid() == libc::getegid() }
}

pub unsafe fn readlink(path: *const c_char, buf: *mut c_char, bufsiz: size_t) -> ssize_t {
    raw::call(&d::READLINK, &[path as usize, buf as usize, bufsiz]).into_ssize()
}

pub unsafe fn readlinkat(
    dirfd: c_int,
    path: *const c_char,
    buf: *mut c_char,
    bufsiz: size_t,
) -> ssize_t {
    raw::call(
        &d::READLINKAT,
        &[int_word(dirfd), path as usize, buf as usize, bufsiz],
    )
    .into_ssize()
}

pub unsafe fn rename(old: *const c_char, new: *const c_char) -> c_int {
    raw::call(&d::RENAME, &[old as usize, new as usize]).into_c_int()
}

pub unsafe fn renameat(
    olddirfd: c_int,
    old: *const c_char,
    newdirfd: c_int,
    new: *const c_char,
) -> c_int {
    raw::call(
        &d::RENAMEAT,
        &[int_word(olddirfd), old as usize, int_word(newdirfd), new as usize],
    )
    .into_c_int()
}

/// `arg` must already be narrowed for `cmd` (see `FcntlArg::deliver`).
pub unsafe fn fcntl(fd: c_int, cmd: c_int, arg: intptr_t) -> c_int {
    #[cfg(target_os = "linux")]
    if cmd == libc::F_GETOWN {
        return getown(fd);
    }
    raw::call(&d::FCNTL, &[int_word(fd), int_word(cmd), arg as usize]).into_c_int()
}

#[cfg(target_os = "linux")]
const F_GETOWN_EX: c_int = 16;
#[cfg(target_os = "linux")]
const F_OWNER_PGRP: c_int = 2;

/// `struct f_owner_ex`.
#[cfg(target_os = "linux")]
#[repr(C)]
struct OwnerEx {
    kind: c_int,
    pid: libc::pid_t,
}

/// `F_GETOWN` answers a process group owner with `-pgid`, which the raw
/// return convention reads as an errno for groups up to 4095. `F_GETOWN_EX`
/// reports the owner through memory instead.
#[cfg(target_os = "linux")]
unsafe fn getown(fd: c_int) -> c_int {
    let mut owner = OwnerEx { kind: 0, pid: 0 };
    let out = raw::call(
        &d::FCNTL,
        &[int_word(fd), int_word(F_GETOWN_EX), &mut owner as *mut OwnerEx as usize],
    );
    if out.errno == libc::EINVAL {
        return raw::call(&d::FCNTL, &[int_word(fd), int_word(libc::F_GETOWN), 0]).into_c_int();
    }
    if out.is_err() {
        return out.into_c_int();
    }
    owner_value(owner.kind, owner.pid)
}

#[cfg(target_os = "linux")]
const fn owner_value(kind: c_int, pid: libc::pid_t) -> c_int {
    if kind == F_OWNER_PGRP {
        -pid
    } else {
        pid
    }
}

pub unsafe fn write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
    raw::call(&d::WRITE, &[int_word(fd), buf as usize, count]).into_ssize()
}

pub unsafe fn close(fd: c_int) -> c_int {
    raw::call(&d::CLOSE, &[int_word(fd)]).into_c_int()
}

// =============================================================================
// Extended attributes
// =============================================================================

#[cfg(target_os = "linux")]
pub unsafe fn getxattr(
    path: *const c_char,
    name: *const c_char,
    value: *mut c_void,
    size: size_t,
) -> ssize_t {
    raw::call(&d::GETXATTR, &[path as usize, name as usize, value as usize, size]).into_ssize()
}

#[cfg(target_os = "linux")]
pub unsafe fn lgetxattr(
    path: *const c_char,
    name: *const c_char,
    value: *mut c_void,
    size: size_t,
) -> ssize_t {
    raw::call(&d::LGETXATTR, &[path as usize, name as usize, value as usize, size]).into_ssize()
}

#[cfg(target_os = "linux")]
pub unsafe fn fgetxattr(
    fd: c_int,
    name: *const c_char,
    value: *mut c_void,
    size: size_t,
) -> ssize_t {
    raw::call(&d::FGETXATTR, &[int_word(fd), name as usize, value as usize, size]).into_ssize()
}

#[cfg(target_os = "linux")]
pub unsafe fn setxattr(
    path: *const c_char,
    name: *const c_char,
    value: *const c_void,
    size: size_t,
    flags: c_int,
) -> c_int {
    raw::call(
        &d::SETXATTR,
        &[path as usize, name as usize, value as usize, size, int_word(flags)],
    )
    .into_c_int()
}

#[cfg(target_os = "linux")]
pub unsafe fn lsetxattr(
    path: *const c_char,
    name: *const c_char,
    value: *const c_void,
    size: size_t,
    flags: c_int,
) -> c_int {
    raw::call(
        &d::LSETXATTR,
        &[path as usize, name as usize, value as usize, size, int_word(flags)],
    )
    .into_c_int()
}

#[cfg(target_os = "linux")]
pub unsafe fn listxattr(path: *const c_char, list: *mut c_char, size: size_t) -> ssize_t {
    raw::call(&d::LISTXATTR, &[path as usize, list as usize, size]).into_ssize()
}

#[cfg(target_os = "linux")]
pub unsafe fn llistxattr(path: *const c_char, list: *mut c_char, size: size_t) -> ssize_t {
    raw::call(&d::LLISTXATTR, &[path as usize, list as usize, size]).into_ssize()
}

#[cfg(target_os = "linux")]
pub unsafe fn removexattr(path: *const c_char, name: *const c_char) -> c_int {
    raw::call(&d::REMOVEXATTR, &[path as usize, name as usize]).into_c_int()
}

#[cfg(target_os = "linux")]
pub unsafe fn lremovexattr(path: *const c_char, name: *const c_char) -> c_int {
    raw::call(&d::LREMOVEXATTR, &[path as usize, name as usize]).into_c_int()
}

#[cfg(target_os = "macos")]
pub unsafe fn getxattr(
    path: *const c_char,
    name: *const c_char,
    value: *mut c_void,
    size: size_t,
    position: u32,
    options: c_int,
) -> ssize_t {
    raw::call(
        &d::GETXATTR,
        &[
            path as usize,
            name as usize,
            value as usize,
            size,
            position as usize,
            int_word(options),
        ],
    )
    .into_ssize()
}

#[cfg(target_os = "macos")]
pub unsafe fn fgetxattr(
    fd: c_int,
    name: *const c_char,
    value: *mut c_void,
    size: size_t,
    position: u32,
    options: c_int,
) -> ssize_t {
    raw::call(
        &d::FGETXATTR,
        &[
            int_word(fd),
            name as usize,
            value as usize,
            size,
            position as usize,
            int_word(options),
        ],
    )
    .into_ssize()
}

#[cfg(target_os = "macos")]
pub unsafe fn setxattr(
    path: *const c_char,
    name: *const c_char,
    value: *const c_void,
    size: size_t,
    position: u32,
    options: c_int,
) -> c_int {
    raw::call(
        &d::SETXATTR,
        &[
            path as usize,
            name as usize,
            value as usize,
            size,
            position as usize,
            int_word(options),
        ],
    )
    .into_c_int()
}

#[cfg(target_os = "macos")]
pub unsafe fn listxattr(
    path: *const c_char,
    list: *mut c_char,
    size: size_t,
    options: c_int,
) -> ssize_t {
    raw::call(
        &d::LISTXATTR,
        &[path as usize, list as usize, size, int_word(options)],
    )
    .into_ssize()
}

#[cfg(target_os = "macos")]
pub unsafe fn removexattr(path: *const c_char, name: *const c_char, options: c_int) -> c_int {
    raw::call(&d::REMOVEXATTR, &[path as usize, name as usize, int_word(options)]).into_c_int()
}
