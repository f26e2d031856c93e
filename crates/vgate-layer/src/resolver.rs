//! Resolver slot: where the external path resolver registers its entry points.
//!
//! A resolver is a [`ResolverTable`] of C-ABI functions, one per intercepted
//! call, each taking the fixed (already extracted) argument list and honoring
//! the `-1` + errno contract. Entries it does not care about keep the
//! pass-through implementation:
//!
//! ```ignore
//! static MY_TABLE: ResolverTable = ResolverTable {
//!     stat: my_stat,
//!     ..ResolverTable::PASSTHROUGH
//! };
//! vgate_layer::resolver::install_resolver(&MY_TABLE);
//! ```
//!
//! The table is consulted only once the bootstrap state is `Ready`.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use libc::{c_char, c_int, c_void, intptr_t, mode_t, size_t, ssize_t, stat as libc_stat};

use crate::syscalls::fs;

pub type OpenFn = unsafe extern "C" fn(*const c_char, c_int, mode_t) -> c_int;
pub type OpenatFn = unsafe extern "C" fn(c_int, *const c_char, c_int, mode_t) -> c_int;
pub type CreatFn = unsafe extern "C" fn(*const c_char, mode_t) -> c_int;
pub type StatFn = unsafe extern "C" fn(*const c_char, *mut libc_stat) -> c_int;
pub type FstatFn = unsafe extern "C" fn(c_int, *mut libc_stat) -> c_int;
pub type FstatatFn = unsafe extern "C" fn(c_int, *const c_char, *mut libc_stat, c_int) -> c_int;
pub type AccessFn = unsafe extern "C" fn(*const c_char, c_int) -> c_int;
pub type FaccessatFn = unsafe extern "C" fn(c_int, *const c_char, c_int, c_int) -> c_int;
pub type ReadlinkFn = unsafe extern "C" fn(*const c_char, *mut c_char, size_t) -> ssize_t;
pub type ReadlinkatFn =
    unsafe extern "C" fn(c_int, *const c_char, *mut c_char, size_t) -> ssize_t;
pub type RenameFn = unsafe extern "C" fn(*const c_char, *const c_char) -> c_int;
pub type RenameatFn = unsafe extern "C" fn(c_int, *const c_char, c_int, *const c_char) -> c_int;
/// The third argument is already narrowed for the command.
pub type FcntlFn = unsafe extern "C" fn(c_int, c_int, intptr_t) -> c_int;

#[cfg(target_os = "linux")]
pub type GetxattrFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *mut c_void, size_t) -> ssize_t;
#[cfg(target_os = "linux")]
pub type FgetxattrFn = unsafe extern "C" fn(c_int, *const c_char, *mut c_void, size_t) -> ssize_t;
#[cfg(target_os = "linux")]
pub type SetxattrFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const c_void, size_t, c_int) -> c_int;
#[cfg(target_os = "linux")]
pub type ListxattrFn = unsafe extern "C" fn(*const c_char, *mut c_char, size_t) -> ssize_t;
#[cfg(target_os = "linux")]
pub type RemovexattrFn = unsafe extern "C" fn(*const c_char, *const c_char) -> c_int;

#[cfg(target_os = "macos")]
pub type GetxattrFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *mut c_void, size_t, u32, c_int) -> ssize_t;
#[cfg(target_os = "macos")]
pub type FgetxattrFn =
    unsafe extern "C" fn(c_int, *const c_char, *mut c_void, size_t, u32, c_int) -> ssize_t;
#[cfg(target_os = "macos")]
pub type SetxattrFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const c_void, size_t, u32, c_int) -> c_int;
#[cfg(target_os = "macos")]
pub type ListxattrFn = unsafe extern "C" fn(*const c_char, *mut c_char, size_t, c_int) -> ssize_t;
#[cfg(target_os = "macos")]
pub type RemovexattrFn = unsafe extern "C" fn(*const c_char, *const c_char, c_int) -> c_int;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ResolverTable {
    pub open: OpenFn,
    pub openat: OpenatFn,
    pub creat: CreatFn,
    pub stat: StatFn,
    pub lstat: StatFn,
    pub fstat: FstatFn,
    pub fstatat: FstatatFn,
    pub access: AccessFn,
    pub faccessat: FaccessatFn,
    pub readlink: ReadlinkFn,
    pub readlinkat: ReadlinkatFn,
    pub rename: RenameFn,
    pub renameat: RenameatFn,
    pub fcntl: FcntlFn,
    pub getxattr: GetxattrFn,
    pub fgetxattr: FgetxattrFn,
    pub setxattr: SetxattrFn,
    pub listxattr: ListxattrFn,
    pub removexattr: RemovexattrFn,
    #[cfg(target_os = "linux")]
    pub lgetxattr: GetxattrFn,
    #[cfg(target_os = "linux")]
    pub lsetxattr: SetxattrFn,
    #[cfg(target_os = "linux")]
    pub llistxattr: ListxattrFn,
    #[cfg(target_os = "linux")]
    pub lremovexattr: RemovexattrFn,
}

// =============================================================================
// Pass-through table
// =============================================================================

mod passthrough {
    use super::*;

    pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
        fs::open(path, flags, mode)
    }
    pub unsafe extern "C" fn openat(
        dirfd: c_int,
        path: *const c_char,
        flags: c_int,
        mode: mode_t,
    ) -> c_int {
        fs::openat(dirfd, path, flags, mode)
    }
    pub unsafe extern "C" fn creat(path: *const c_char, mode: mode_t) -> c_int {
        fs::creat(path, mode)
    }
    pub unsafe extern "C" fn stat(path: *const c_char, buf: *mut libc_stat) -> c_int {
        fs::stat(path, buf)
    }
    pub unsafe extern "C" fn lstat(path: *const c_char, buf: *mut libc_stat) -> c_int {
        fs::lstat(path, buf)
    }
    pub unsafe extern "C" fn fstat(fd: c_int, buf: *mut libc_stat) -> c_int {
        fs::fstat(fd, buf)
    }
    pub unsafe extern "C" fn fstatat(
        dirfd: c_int,
        path: *const c_char,
        buf: *mut libc_stat,
        flags: c_int,
    ) -> c_int {
        fs::fstatat(dirfd, path, buf, flags)
    }
    pub unsafe extern "C" fn access(path: *const c_char, mode: c_int) -> c_int {
        fs::access(path, mode)
    }
    pub unsafe extern "C" fn faccessat(
        dirfd: c_int,
        path: *const c_char,
        mode: c_int,
        flags: c_int,
    ) -> c_int {
        fs::faccessat(dirfd, path, mode, flags)
    }
    pub unsafe extern "C" fn readlink(
        path: *const c_char,
        buf: *mut c_char,
        bufsiz: size_t,
    ) -> ssize_t {
        fs::readlink(path, buf, bufsiz)
    }
    pub unsafe extern "C" fn readlinkat(
        dirfd: c_int,
        path: *const c_char,
        buf: *mut c_char,
        bufsiz: size_t,
    ) -> ssize_t {
        fs::readlinkat(dirfd, path, buf, bufsiz)
    }
    pub unsafe extern "C" fn rename(old: *const c_char, new: *const c_char) -> c_int {
        fs::rename(old, new)
    }
    pub unsafe extern "C" fn renameat(
        olddirfd: c_int,
        old: *const c_char,
        newdirfd: c_int,
        new: *const c_char,
    ) -> c_int {
        fs::renameat(olddirfd, old, newdirfd, new)
    }
    pub unsafe extern "C" fn fcntl(fd: c_int, cmd: c_int, arg: intptr_t) -> c_int {
        fs::fcntl(fd, cmd, arg)
    }

    #[cfg(target_os = "linux")]
    pub unsafe extern "C" fn getxattr(
        path: *const c_char,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
    ) -> ssize_t {
        fs::getxattr(path, name, value, size)
    }
    #[cfg(target_os = "linux")]
    pub unsafe extern "C" fn lgetxattr(
        path: *const c_char,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
    ) -> ssize_t {
        fs::lgetxattr(path, name, value, size)
    }
    #[cfg(target_os = "linux")]
    pub unsafe extern "C" fn fgetxattr(
        fd: c_int,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
    ) -> ssize_t {
        fs::fgetxattr(fd, name, value, size)
    }
    #[cfg(target_os = "linux")]
    pub unsafe extern "C" fn setxattr(
        path: *const c_char,
        name: *const c_char,
        value: *const c_void,
        size: size_t,
        flags: c_int,
    ) -> c_int {
        fs::setxattr(path, name, value, size, flags)
    }
    #[cfg(target_os = "linux")]
    pub unsafe extern "C" fn lsetxattr(
        path: *const c_char,
        name: *const c_char,
        value: *const c_void,
        size: size_t,
        flags: c_int,
    ) -> c_int {
        fs::lsetxattr(path, name, value, size, flags)
    }
    #[cfg(target_os = "linux")]
    pub unsafe extern "C" fn listxattr(
        path: *const c_char,
        list: *mut c_char,
        size: size_t,
    ) -> ssize_t {
        fs::listxattr(path, list, size)
    }
    #[cfg(target_os = "linux")]
    pub unsafe extern "C" fn llistxattr(
        path: *const c_char,
        list: *mut c_char,
        size: size_t,
    ) -> ssize_t {
        fs::llistxattr(path, list, size)
    }
    #[cfg(target_os = "linux")]
    pub unsafe extern "C" fn removexattr(path: *const c_char, name: *const c_char) -> c_int {
        fs::removexattr(path, name)
    }
    #[cfg(target_os = "linux")]
    pub unsafe extern "C" fn lremovexattr(path: *const c_char, name: *const c_char) -> c_int {
        fs::lremovexattr(path, name)
    }

    #[cfg(target_os = "macos")]
    pub unsafe extern "C" fn getxattr(
        path: *const c_char,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> ssize_t {
        fs::getxattr(path, name, value, size, position, options)
    }
    #[cfg(target_os = "macos")]
    pub unsafe extern "C" fn fgetxattr(
        fd: c_int,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> ssize_t {
        fs::fgetxattr(fd, name, value, size, position, options)
    }
    #[cfg(target_os = "macos")]
    pub unsafe extern "C" fn setxattr(
        path: *const c_char,
        name: *const c_char,
        value: *const c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> c_int {
        fs::setxattr(path, name, value, size, position, options)
    }
    #[cfg(target_os = "macos")]
    pub unsafe extern "C" fn listxattr(
        path: *const c_char,
        list: *mut c_char,
        size: size_t,
        options: c_int,
    ) -> ssize_t {
        fs::listxattr(path, list, size, options)
    }
    #[cfg(target_os = "macos")]
    pub unsafe extern "C" fn removexattr(
        path: *const c_char,
        name: *const c_char,
        options: c_int,
    ) -> c_int {
        fs::removexattr(path, name, options)
    }
}

impl ResolverTable {
    /// Every entry forwards to the kernel.
    pub const PASSTHROUGH: ResolverTable = ResolverTable {
        open: passthrough::open,
        openat: passthrough::openat,
        creat: passthrough::creat,
        stat: passthrough::stat,
        lstat: passthrough::lstat,
        fstat: passthrough::fstat,
        fstatat: passthrough::fstatat,
        access: passthrough::access,
        faccessat: passthrough::faccessat,
        readlink: passthrough::readlink,
        readlinkat: passthrough::readlinkat,
        rename: passthrough::rename,
        renameat: passthrough::renameat,
        fcntl: passthrough::fcntl,
        getxattr: passthrough::getxattr,
        fgetxattr: passthrough::fgetxattr,
        setxattr: passthrough::setxattr,
        listxattr: passthrough::listxattr,
        removexattr: passthrough::removexattr,
        #[cfg(target_os = "linux")]
        lgetxattr: passthrough::lgetxattr,
        #[cfg(target_os = "linux")]
        lsetxattr: passthrough::lsetxattr,
        #[cfg(target_os = "linux")]
        llistxattr: passthrough::llistxattr,
        #[cfg(target_os = "linux")]
        lremovexattr: passthrough::lremovexattr,
    };
}

static PASSTHROUGH_TABLE: ResolverTable = ResolverTable::PASSTHROUGH;

// =============================================================================
// Slot
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    /// Nothing registered; the built-in table is used.
    Passthrough,
    /// A resolver is registered and in use.
    Custom,
    /// Pass-through forced by configuration, registration ignored.
    ForcedPassthrough,
}

impl ResolverKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResolverKind::Passthrough => "passthrough",
            ResolverKind::Custom => "custom",
            ResolverKind::ForcedPassthrough => "forced_passthrough",
        }
    }
}

pub struct ResolverSlot {
    table: AtomicPtr<ResolverTable>,
    forced_passthrough: AtomicBool,
}

impl Default for ResolverSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverSlot {
    pub const fn new() -> Self {
        Self {
            table: AtomicPtr::new(ptr::null_mut()),
            forced_passthrough: AtomicBool::new(false),
        }
    }

    /// Publish `table`; later calls replace earlier ones.
    pub fn install(&self, table: &'static ResolverTable) {
        self.table
            .store(table as *const ResolverTable as *mut ResolverTable, Ordering::Release);
    }

    pub fn set_forced_passthrough(&self, on: bool) {
        self.forced_passthrough.store(on, Ordering::Release);
    }

    /// The table calls should go to right now.
    #[inline]
    pub fn active(&self) -> &'static ResolverTable {
        if self.forced_passthrough.load(Ordering::Acquire) {
            return &PASSTHROUGH_TABLE;
        }
        let p = self.table.load(Ordering::Acquire);
        if p.is_null() {
            &PASSTHROUGH_TABLE
        } else {
            // Only ever stored from a &'static in `install`
            unsafe { &*p }
        }
    }

    pub fn kind(&self) -> ResolverKind {
        if self.forced_passthrough.load(Ordering::Acquire) {
            ResolverKind::ForcedPassthrough
        } else if self.table.load(Ordering::Acquire).is_null() {
            ResolverKind::Passthrough
        } else {
            ResolverKind::Custom
        }
    }
}

/// The process-wide slot used by the exported entry points.
pub static RESOLVER: ResolverSlot = ResolverSlot::new();

pub fn install_resolver(table: &'static ResolverTable) {
    RESOLVER.install(table);
    vgate_info!("resolver installed");
}

/// C registration. `table` must stay valid for the rest of the process.
/// Returns 0, or -1 with `EINVAL` for a null table.
#[no_mangle]
pub unsafe extern "C" fn vgate_install_resolver(table: *const ResolverTable) -> c_int {
    if table.is_null() {
        crate::errno::set_errno(libc::EINVAL);
        return -1;
    }
    install_resolver(&*table);
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn deny_access(_: *const c_char, _: c_int) -> c_int {
        crate::errno::set_errno(libc::EACCES);
        -1
    }

    static DENY_TABLE: ResolverTable = ResolverTable {
        access: deny_access,
        ..ResolverTable::PASSTHROUGH
    };

    #[test]
    fn test_empty_slot_hands_out_passthrough() {
        let slot = ResolverSlot::new();
        assert_eq!(slot.kind(), ResolverKind::Passthrough);
        assert!(ptr::eq(slot.active(), &PASSTHROUGH_TABLE));
    }

    #[test]
    fn test_installed_table_is_used() {
        let slot = ResolverSlot::new();
        slot.install(&DENY_TABLE);
        assert_eq!(slot.kind(), ResolverKind::Custom);
        assert!(ptr::eq(slot.active(), &DENY_TABLE));
        let ret = unsafe { (slot.active().access)(c"/".as_ptr(), libc::F_OK) };
        assert_eq!(ret, -1);
    }

    #[test]
    fn test_forced_passthrough_overrides_registration() {
        let slot = ResolverSlot::new();
        slot.install(&DENY_TABLE);
        slot.set_forced_passthrough(true);
        assert_eq!(slot.kind(), ResolverKind::ForcedPassthrough);
        let ret = unsafe { (slot.active().access)(c"/".as_ptr(), libc::F_OK) };
        assert_eq!(ret, 0);

        slot.set_forced_passthrough(false);
        assert!(ptr::eq(slot.active(), &DENY_TABLE));
    }

    #[test]
    fn test_c_registration_rejects_null() {
        let ret = unsafe { vgate_install_resolver(ptr::null()) };
        assert_eq!(ret, -1);
        #[cfg(target_os = "linux")]
        assert_eq!(unsafe { crate::errno::get_errno() }, libc::EINVAL);
    }
}
