//! Shim dispatcher: one method per intercepted function.
//!
//! Every method receives the fixed argument list (variadic tails are already
//! read by the exported symbol or the C boundary), applies the descriptor's
//! extraction rule, reads the bootstrap level once and then either traps
//! directly (below `Ready`) or calls the active resolver entry (at `Ready`).
//! Resolver results are returned unchanged.
//!
//! A thread already inside a resolver entry is routed to the kernel, so a
//! resolver may use libc file calls freely.

use libc::{c_char, c_int, c_void, intptr_t, mode_t, size_t, ssize_t, stat as libc_stat};

use crate::descriptor;
use crate::resolver::{ResolverSlot, RESOLVER};
use crate::state::guard::ResolverGuard;
use crate::state::{BootstrapCell, Level, BOOTSTRAP};
use crate::syscalls::fs;

pub struct Dispatcher<'a> {
    state: &'a BootstrapCell,
    resolver: &'a ResolverSlot,
}

/// Dispatcher over the process-wide state and resolver slot.
pub static DISPATCH: Dispatcher<'static> = Dispatcher::new(&BOOTSTRAP, &RESOLVER);

/// Route to the resolver at `Ready`, otherwise to the direct kernel call.
macro_rules! route {
    ($self:ident, $entry:ident ( $($arg:expr),* ), $raw:expr) => {{
        crate::profile_count!($entry);
        if $self.state.load() == Level::Ready {
            match ResolverGuard::enter() {
                Some(_guard) => {
                    crate::profile_count!(resolved);
                    ($self.resolver.active().$entry)($($arg),*)
                }
                None => {
                    crate::profile_count!(nested);
                    $raw
                }
            }
        } else {
            crate::profile_count!(direct);
            $raw
        }
    }};
}

impl<'a> Dispatcher<'a> {
    pub const fn new(state: &'a BootstrapCell, resolver: &'a ResolverSlot) -> Self {
        Self { state, resolver }
    }

    pub fn level(&self) -> Level {
        self.state.load()
    }

    pub unsafe fn open(&self, path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
        let mode = descriptor::OPEN.variadic.deliver(flags, mode as usize) as mode_t;
        vgate_trace!("open flags={:#o} mode={:#o}", flags, mode);
        route!(self, open(path, flags, mode), fs::open(path, flags, mode))
    }

    pub unsafe fn openat(
        &self,
        dirfd: c_int,
        path: *const c_char,
        flags: c_int,
        mode: mode_t,
    ) -> c_int {
        let mode = descriptor::OPENAT.variadic.deliver(flags, mode as usize) as mode_t;
        vgate_trace!("openat dirfd={} flags={:#o} mode={:#o}", dirfd, flags, mode);
        route!(
            self,
            openat(dirfd, path, flags, mode),
            fs::openat(dirfd, path, flags, mode)
        )
    }

    pub unsafe fn creat(&self, path: *const c_char, mode: mode_t) -> c_int {
        route!(self, creat(path, mode), fs::creat(path, mode))
    }

    pub unsafe fn stat(&self, path: *const c_char, buf: *mut libc_stat) -> c_int {
        route!(self, stat(path, buf), fs::stat(path, buf))
    }

    pub unsafe fn lstat(&self, path: *const c_char, buf: *mut libc_stat) -> c_int {
        route!(self, lstat(path, buf), fs::lstat(path, buf))
    }

    pub unsafe fn fstat(&self, fd: c_int, buf: *mut libc_stat) -> c_int {
        route!(self, fstat(fd, buf), fs::fstat(fd, buf))
    }

    pub unsafe fn fstatat(
        &self,
        dirfd: c_int,
        path: *const c_char,
        buf: *mut libc_stat,
        flags: c_int,
    ) -> c_int {
        route!(
            self,
            fstatat(dirfd, path, buf, flags),
            fs::fstatat(dirfd, path, buf, flags)
        )
    }

    pub unsafe fn access(&self, path: *const c_char, mode: c_int) -> c_int {
        route!(self, access(path, mode), fs::access(path, mode))
    }

    pub unsafe fn faccessat(
        &self,
        dirfd: c_int,
        path: *const c_char,
        mode: c_int,
        flags: c_int,
    ) -> c_int {
        route!(
            self,
            faccessat(dirfd, path, mode, flags),
            fs::faccessat(dirfd, path, mode, flags)
        )
    }

    pub unsafe fn readlink(&self, path: *const c_char, buf: *mut c_char, bufsiz: size_t) -> ssize_t {
        route!(
            self,
            readlink(path, buf, bufsiz),
            fs::readlink(path, buf, bufsiz)
        )
    }

    pub unsafe fn readlinkat(
        &self,
        dirfd: c_int,
        path: *const c_char,
        buf: *mut c_char,
        bufsiz: size_t,
    ) -> ssize_t {
        route!(
            self,
            readlinkat(dirfd, path, buf, bufsiz),
            fs::readlinkat(dirfd, path, buf, bufsiz)
        )
    }

    pub unsafe fn rename(&self, old: *const c_char, new: *const c_char) -> c_int {
        route!(self, rename(old, new), fs::rename(old, new))
    }

    pub unsafe fn renameat(
        &self,
        olddirfd: c_int,
        old: *const c_char,
        newdirfd: c_int,
        new: *const c_char,
    ) -> c_int {
        route!(
            self,
            renameat(olddirfd, old, newdirfd, new),
            fs::renameat(olddirfd, old, newdirfd, new)
        )
    }

    /// `arg` is the raw word the caller left in the third slot.
    pub unsafe fn fcntl(&self, fd: c_int, cmd: c_int, arg: intptr_t) -> c_int {
        let arg = descriptor::FCNTL.variadic.deliver(cmd, arg as usize) as intptr_t;
        route!(self, fcntl(fd, cmd, arg), fs::fcntl(fd, cmd, arg))
    }

    #[cfg(target_os = "linux")]
    pub unsafe fn getxattr(
        &self,
        path: *const c_char,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
    ) -> ssize_t {
        route!(
            self,
            getxattr(path, name, value, size),
            fs::getxattr(path, name, value, size)
        )
    }

    #[cfg(target_os = "linux")]
    pub unsafe fn lgetxattr(
        &self,
        path: *const c_char,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
    ) -> ssize_t {
        route!(
            self,
            lgetxattr(path, name, value, size),
            fs::lgetxattr(path, name, value, size)
        )
    }

    #[cfg(target_os = "linux")]
    pub unsafe fn fgetxattr(
        &self,
        fd: c_int,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
    ) -> ssize_t {
        route!(
            self,
            fgetxattr(fd, name, value, size),
            fs::fgetxattr(fd, name, value, size)
        )
    }

    #[cfg(target_os = "linux")]
    pub unsafe fn setxattr(
        &self,
        path: *const c_char,
        name: *const c_char,
        value: *const c_void,
        size: size_t,
        flags: c_int,
    ) -> c_int {
        route!(
            self,
            setxattr(path, name, value, size, flags),
            fs::setxattr(path, name, value, size, flags)
        )
    }

    #[cfg(target_os = "linux")]
    pub unsafe fn lsetxattr(
        &self,
        path: *const c_char,
        name: *const c_char,
        value: *const c_void,
        size: size_t,
        flags: c_int,
    ) -> c_int {
        route!(
            self,
            lsetxattr(path, name, value, size, flags),
            fs::lsetxattr(path, name, value, size, flags)
        )
    }

    #[cfg(target_os = "linux")]
    pub unsafe fn listxattr(&self, path: *const c_char, list: *mut c_char, size: size_t) -> ssize_t {
        route!(
            self,
            listxattr(path, list, size),
            fs::listxattr(path, list, size)
        )
    }

    #[cfg(target_os = "linux")]
    pub unsafe fn llistxattr(&self, path: *const c_char, list: *mut c_char, size: size_t) -> ssize_t {
        route!(
            self,
            llistxattr(path, list, size),
            fs::llistxattr(path, list, size)
        )
    }

    #[cfg(target_os = "linux")]
    pub unsafe fn removexattr(&self, path: *const c_char, name: *const c_char) -> c_int {
        route!(self, removexattr(path, name), fs::removexattr(path, name))
    }

    #[cfg(target_os = "linux")]
    pub unsafe fn lremovexattr(&self, path: *const c_char, name: *const c_char) -> c_int {
        route!(self, lremovexattr(path, name), fs::lremovexattr(path, name))
    }

    #[cfg(target_os = "macos")]
    pub unsafe fn getxattr(
        &self,
        path: *const c_char,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> ssize_t {
        route!(
            self,
            getxattr(path, name, value, size, position, options),
            fs::getxattr(path, name, value, size, position, options)
        )
    }

    #[cfg(target_os = "macos")]
    pub unsafe fn fgetxattr(
        &self,
        fd: c_int,
        name: *const c_char,
        value: *mut c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> ssize_t {
        route!(
            self,
            fgetxattr(fd, name, value, size, position, options),
            fs::fgetxattr(fd, name, value, size, position, options)
        )
    }

    #[cfg(target_os = "macos")]
    pub unsafe fn setxattr(
        &self,
        path: *const c_char,
        name: *const c_char,
        value: *const c_void,
        size: size_t,
        position: u32,
        options: c_int,
    ) -> c_int {
        route!(
            self,
            setxattr(path, name, value, size, position, options),
            fs::setxattr(path, name, value, size, position, options)
        )
    }

    #[cfg(target_os = "macos")]
    pub unsafe fn listxattr(
        &self,
        path: *const c_char,
        list: *mut c_char,
        size: size_t,
        options: c_int,
    ) -> ssize_t {
        route!(
            self,
            listxattr(path, list, size, options),
            fs::listxattr(path, list, size, options)
        )
    }

    #[cfg(target_os = "macos")]
    pub unsafe fn removexattr(&self, path: *const c_char, name: *const c_char, options: c_int) -> c_int {
        route!(
            self,
            removexattr(path, name, options),
            fs::removexattr(path, name, options)
        )
    }
}

// Fixed-argument targets of the macOS variadic boundary; exported on every
// target so other front ends can use them too.

#[no_mangle]
pub unsafe extern "C" fn vgate_dispatch_open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    DISPATCH.open(path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn vgate_dispatch_openat(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    DISPATCH.openat(dirfd, path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn vgate_dispatch_fcntl(fd: c_int, cmd: c_int, arg: intptr_t) -> c_int {
    DISPATCH.fcntl(fd, cmd, arg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverTable;
    use std::sync::atomic::{AtomicU32, Ordering};

    static SEEN_MODE: AtomicU32 = AtomicU32::new(u32::MAX);
    static SEEN_FCNTL_ARG: std::sync::atomic::AtomicIsize =
        std::sync::atomic::AtomicIsize::new(-7);

    unsafe extern "C" fn record_open(_: *const c_char, _: c_int, mode: mode_t) -> c_int {
        SEEN_MODE.store(mode as u32, Ordering::SeqCst);
        42
    }

    unsafe extern "C" fn record_fcntl(_: c_int, _: c_int, arg: intptr_t) -> c_int {
        SEEN_FCNTL_ARG.store(arg, Ordering::SeqCst);
        0
    }

    static RECORDING: ResolverTable = ResolverTable {
        open: record_open,
        fcntl: record_fcntl,
        ..ResolverTable::PASSTHROUGH
    };

    fn ready_dispatcher() -> (&'static BootstrapCell, &'static ResolverSlot) {
        let state: &'static BootstrapCell = Box::leak(Box::new(BootstrapCell::new()));
        let slot: &'static ResolverSlot = Box::leak(Box::new(ResolverSlot::new()));
        state.advance_to(Level::Ready);
        slot.install(&RECORDING);
        (state, slot)
    }

    #[test]
    fn test_resolver_sees_extracted_mode() {
        let (state, slot) = ready_dispatcher();
        let d = Dispatcher::new(state, slot);
        let path = c"/nonexistent/vgate";

        let ret = unsafe { d.open(path.as_ptr(), libc::O_RDONLY, 0o7777) };
        assert_eq!(ret, 42);
        assert_eq!(SEEN_MODE.load(Ordering::SeqCst), 0);

        let ret = unsafe { d.open(path.as_ptr(), libc::O_CREAT | libc::O_WRONLY, 0o640) };
        assert_eq!(ret, 42);
        assert_eq!(SEEN_MODE.load(Ordering::SeqCst), 0o640);
    }

    #[test]
    fn test_resolver_sees_narrowed_fcntl_word() {
        let (state, slot) = ready_dispatcher();
        let d = Dispatcher::new(state, slot);
        let garbage = 0x5a5a_0000_0000_0003u64 as intptr_t;

        unsafe { d.fcntl(0, libc::F_GETFD, garbage) };
        assert_eq!(SEEN_FCNTL_ARG.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_below_ready_never_reaches_resolver() {
        let state = BootstrapCell::new();
        let slot = ResolverSlot::new();
        slot.install(&RECORDING);
        let d = Dispatcher::new(&state, &slot);

        for level in [Level::Early, Level::RuntimeSafe] {
            state.advance_to(level);
            assert_eq!(d.level(), level);
            // The kernel answers: no such file, not the resolver's 42
            let ret = unsafe { d.open(c"/nonexistent/vgate".as_ptr(), libc::O_RDONLY, 0) };
            assert_eq!(ret, -1);
        }
    }

    // Resolver code calling back into the same dispatcher, as a libc call made
    // from inside a resolver would.
    static REENTRANT_STATE: BootstrapCell = BootstrapCell::new();
    static REENTRANT_SLOT: ResolverSlot = ResolverSlot::new();
    static REENTRANT: Dispatcher<'static> = Dispatcher::new(&REENTRANT_STATE, &REENTRANT_SLOT);
    static RESOLVER_ENTRIES: AtomicU32 = AtomicU32::new(0);

    unsafe extern "C" fn reentrant_stat(path: *const c_char, buf: *mut libc_stat) -> c_int {
        if RESOLVER_ENTRIES.fetch_add(1, Ordering::SeqCst) > 8 {
            // Unbounded recursion; fail instead of overflowing the stack
            return -1;
        }
        REENTRANT.stat(path, buf)
    }

    static REENTRANT_TABLE: ResolverTable = ResolverTable {
        stat: reentrant_stat,
        ..ResolverTable::PASSTHROUGH
    };

    #[test]
    fn test_nested_call_from_resolver_reaches_the_kernel() {
        REENTRANT_STATE.advance_to(Level::Ready);
        REENTRANT_SLOT.install(&REENTRANT_TABLE);

        let mut st: libc_stat = unsafe { std::mem::zeroed() };
        let ret = unsafe { REENTRANT.stat(c"/".as_ptr(), &mut st) };
        assert_eq!(ret, 0);
        assert_eq!(RESOLVER_ENTRIES.load(Ordering::SeqCst), 1);
        assert_eq!(st.st_mode & libc::S_IFMT, libc::S_IFDIR);

        // The guard is released on return
        let ret = unsafe { REENTRANT.stat(c"/".as_ptr(), &mut st) };
        assert_eq!(ret, 0);
        assert_eq!(RESOLVER_ENTRIES.load(Ordering::SeqCst), 2);
        assert!(!ResolverGuard::is_active());
    }
}
