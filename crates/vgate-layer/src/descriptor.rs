//! Static descriptions of every intercepted entry point.
//!
//! A [`SyscallDescriptor`] ties a libc function to the kernel call that
//! implements it on the current target, plus the rule for reading its
//! variadic tail. Targets that lack a dedicated syscall (e.g. `open` on
//! linux/aarch64, `creat` on macOS) reach the kernel through a directory
//! relative or flag-carrying variant; [`Shape`] records how the caller's
//! argument words are rearranged for that.

use libc::{c_int, mode_t};

/// Most argument words any kernel call here takes.
pub const MAX_ARGS: usize = 6;

/// `AT_FDCWD` as a sign-extended argument word.
pub const AT_FDCWD_WORD: usize = libc::AT_FDCWD as isize as usize;

/// How caller arguments map onto the kernel call of the current target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Arguments passed verbatim.
    Direct(usize),
    /// `AT_FDCWD` prepended.
    AtCwd(usize),
    /// `AT_FDCWD` prepended, a constant flag word appended.
    AtCwdFlags(usize, usize),
    /// A constant flag word inserted after the path (`creat` as `open`).
    OpenFlags(usize, usize),
    /// `AT_FDCWD` prepended and a flag word inserted after the path
    /// (`creat` as `openat`).
    AtCwdOpenFlags(usize, usize),
    /// `AT_FDCWD` placed before each of the two paths (`rename` as `renameat`).
    AtCwdPair(usize),
}

impl Shape {
    pub const fn number(self) -> usize {
        match self {
            Shape::Direct(nr)
            | Shape::AtCwd(nr)
            | Shape::AtCwdFlags(nr, _)
            | Shape::OpenFlags(nr, _)
            | Shape::AtCwdOpenFlags(nr, _)
            | Shape::AtCwdPair(nr) => nr,
        }
    }

    /// Rearrange `args` for the kernel. Words past [`MAX_ARGS`] are dropped;
    /// unused slots are zero.
    pub fn lower(self, args: &[usize]) -> (usize, [usize; MAX_ARGS]) {
        let mut out = ArgWords::new();
        match self {
            Shape::Direct(_) => out.extend(args),
            Shape::AtCwd(_) => {
                out.push(AT_FDCWD_WORD);
                out.extend(args);
            }
            Shape::AtCwdFlags(_, flags) => {
                out.push(AT_FDCWD_WORD);
                out.extend(args);
                out.push(flags);
            }
            Shape::OpenFlags(_, flags) => {
                let (path, rest) = split_first(args);
                out.push(path);
                out.push(flags);
                out.extend(rest);
            }
            Shape::AtCwdOpenFlags(_, flags) => {
                let (path, rest) = split_first(args);
                out.push(AT_FDCWD_WORD);
                out.push(path);
                out.push(flags);
                out.extend(rest);
            }
            Shape::AtCwdPair(_) => {
                let (first, rest) = split_first(args);
                let (second, rest) = split_first(rest);
                out.push(AT_FDCWD_WORD);
                out.push(first);
                out.push(AT_FDCWD_WORD);
                out.push(second);
                out.extend(rest);
            }
        }
        (self.number(), out.words)
    }
}

fn split_first(args: &[usize]) -> (usize, &[usize]) {
    match args.split_first() {
        Some((first, rest)) => (*first, rest),
        None => (0, &[]),
    }
}

struct ArgWords {
    words: [usize; MAX_ARGS],
    len: usize,
}

impl ArgWords {
    const fn new() -> Self {
        Self {
            words: [0; MAX_ARGS],
            len: 0,
        }
    }

    fn push(&mut self, word: usize) {
        if self.len < MAX_ARGS {
            self.words[self.len] = word;
            self.len += 1;
        }
    }

    fn extend(&mut self, words: &[usize]) {
        for &w in words {
            self.push(w);
        }
    }
}

/// How the trailing variadic argument of an entry point is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariadicRule {
    /// Not variadic.
    None,
    /// `mode_t`, meaningful only when the flags request creation.
    ModeIfCreate,
    /// One word whose meaning depends on the command (`fcntl`).
    Fixed,
}

impl VariadicRule {
    /// The tail word actually passed on, given the governing fixed argument
    /// (open flags or the fcntl command) and the word the caller left in the
    /// variadic slot.
    pub const fn deliver(self, governing: c_int, word: usize) -> usize {
        match self {
            VariadicRule::None => 0,
            VariadicRule::ModeIfCreate => creation_mode(governing, word as mode_t) as usize,
            VariadicRule::Fixed => {
                FcntlArg::classify(governing).deliver(word as libc::intptr_t) as usize
            }
        }
    }
}

/// Whether `flags` asks the kernel to create a file, i.e. whether the mode
/// argument exists at all.
#[inline]
pub const fn creates_file(flags: c_int) -> bool {
    if flags & libc::O_CREAT != 0 {
        return true;
    }
    #[cfg(target_os = "linux")]
    if flags & libc::O_TMPFILE == libc::O_TMPFILE {
        return true;
    }
    false
}

/// The mode actually delivered: the caller's value for creating opens, zero
/// otherwise, whatever happened to sit in the argument slot.
#[inline]
pub const fn creation_mode(flags: c_int, raw: mode_t) -> mode_t {
    if creates_file(flags) {
        raw
    } else {
        0
    }
}

/// What the third `fcntl` argument is for a given command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcntlArg {
    None,
    Int,
    Pointer,
}

impl FcntlArg {
    pub const fn classify(cmd: c_int) -> Self {
        match cmd {
            libc::F_GETFD | libc::F_GETFL | libc::F_GETOWN => FcntlArg::None,
            libc::F_DUPFD | libc::F_DUPFD_CLOEXEC | libc::F_SETFD | libc::F_SETFL
            | libc::F_SETOWN => FcntlArg::Int,
            _ => Self::classify_platform(cmd),
        }
    }

    #[cfg(target_os = "linux")]
    const fn classify_platform(cmd: c_int) -> Self {
        match cmd {
            libc::F_GETLEASE | libc::F_GETPIPE_SZ | libc::F_GET_SEALS => FcntlArg::None,
            libc::F_SETLEASE | libc::F_NOTIFY | libc::F_SETPIPE_SZ | libc::F_ADD_SEALS => {
                FcntlArg::Int
            }
            _ => FcntlArg::Pointer,
        }
    }

    #[cfg(target_os = "macos")]
    const fn classify_platform(cmd: c_int) -> Self {
        match cmd {
            libc::F_FULLFSYNC => FcntlArg::None,
            libc::F_NOCACHE => FcntlArg::Int,
            _ => FcntlArg::Pointer,
        }
    }

    /// Narrow the raw word the caller passed. Unknown commands keep the
    /// whole word; the kernel truncates integer arguments itself.
    pub const fn deliver(self, word: libc::intptr_t) -> libc::intptr_t {
        match self {
            FcntlArg::None => 0,
            FcntlArg::Int => word as c_int as libc::intptr_t,
            FcntlArg::Pointer => word,
        }
    }
}

/// One intercepted (or internally used) function.
#[derive(Debug, Clone, Copy)]
pub struct SyscallDescriptor {
    pub name: &'static str,
    pub variadic: VariadicRule,
    /// Kernel call on the current target.
    pub shape: Shape,
}

impl SyscallDescriptor {
    const fn new(name: &'static str, variadic: VariadicRule, shape: Shape) -> Self {
        Self {
            name,
            variadic,
            shape,
        }
    }
}

// =============================================================================
// Per-target syscall tables
// =============================================================================

#[cfg(not(any(
    all(target_os = "linux", target_arch = "x86_64"),
    all(target_os = "linux", target_arch = "aarch64"),
    all(target_os = "macos", target_arch = "aarch64"),
    all(target_os = "macos", target_arch = "x86_64"),
)))]
compile_error!("vgate-layer supports linux/x86_64, linux/aarch64, macos/aarch64 and macos/x86_64 only");

const CREAT_FLAGS: usize = (libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC) as usize;

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod table {
    use super::Shape::{self, *};

    pub const OPEN: Shape = Direct(2);
    pub const OPENAT: Shape = Direct(257);
    pub const CREAT: Shape = Direct(85);
    pub const STAT: Shape = Direct(4);
    pub const LSTAT: Shape = Direct(6);
    pub const FSTAT: Shape = Direct(5);
    pub const FSTATAT: Shape = Direct(262); // newfstatat
    pub const ACCESS: Shape = Direct(21);
    pub const FACCESSAT: Shape = Direct(269);
    pub const FACCESSAT2: Shape = Direct(439);
    pub const READLINK: Shape = Direct(89);
    pub const READLINKAT: Shape = Direct(267);
    pub const RENAME: Shape = Direct(82);
    pub const RENAMEAT: Shape = Direct(264);
    pub const FCNTL: Shape = Direct(72);
    pub const SETXATTR: Shape = Direct(188);
    pub const LSETXATTR: Shape = Direct(189);
    pub const GETXATTR: Shape = Direct(191);
    pub const LGETXATTR: Shape = Direct(192);
    pub const FGETXATTR: Shape = Direct(193);
    pub const LISTXATTR: Shape = Direct(194);
    pub const LLISTXATTR: Shape = Direct(195);
    pub const REMOVEXATTR: Shape = Direct(197);
    pub const LREMOVEXATTR: Shape = Direct(198);
    pub const WRITE: Shape = Direct(1);
    pub const CLOSE: Shape = Direct(3);
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
mod table {
    use super::Shape::{self, *};
    use super::CREAT_FLAGS;

    const SYMLINK_NOFOLLOW: usize = libc::AT_SYMLINK_NOFOLLOW as usize;

    // The generic syscall table has no path-only variants.
    pub const OPEN: Shape = AtCwd(56);
    pub const OPENAT: Shape = Direct(56);
    pub const CREAT: Shape = AtCwdOpenFlags(56, CREAT_FLAGS);
    pub const STAT: Shape = AtCwdFlags(79, 0);
    pub const LSTAT: Shape = AtCwdFlags(79, SYMLINK_NOFOLLOW);
    pub const FSTAT: Shape = Direct(80);
    pub const FSTATAT: Shape = Direct(79);
    pub const ACCESS: Shape = AtCwd(48);
    pub const FACCESSAT: Shape = Direct(48);
    pub const FACCESSAT2: Shape = Direct(439);
    pub const READLINK: Shape = AtCwd(78);
    pub const READLINKAT: Shape = Direct(78);
    pub const RENAME: Shape = AtCwdPair(38);
    pub const RENAMEAT: Shape = Direct(38);
    pub const FCNTL: Shape = Direct(25);
    pub const SETXATTR: Shape = Direct(5);
    pub const LSETXATTR: Shape = Direct(6);
    pub const GETXATTR: Shape = Direct(8);
    pub const LGETXATTR: Shape = Direct(9);
    pub const FGETXATTR: Shape = Direct(10);
    pub const LISTXATTR: Shape = Direct(11);
    pub const LLISTXATTR: Shape = Direct(12);
    pub const REMOVEXATTR: Shape = Direct(14);
    pub const LREMOVEXATTR: Shape = Direct(15);
    pub const WRITE: Shape = Direct(64);
    pub const CLOSE: Shape = Direct(57);
}

// Darwin numbers are shared by both architectures; x86_64 adds the
// 0x2000000 class prefix in the invoker.
#[cfg(target_os = "macos")]
mod table {
    use super::Shape::{self, *};
    use super::CREAT_FLAGS;

    pub const OPEN: Shape = Direct(5);
    pub const OPENAT: Shape = Direct(463);
    pub const CREAT: Shape = OpenFlags(5, CREAT_FLAGS);
    pub const STAT: Shape = Direct(338); // stat64
    pub const LSTAT: Shape = Direct(340); // lstat64
    pub const FSTAT: Shape = Direct(339); // fstat64
    pub const FSTATAT: Shape = Direct(470); // fstatat64
    pub const ACCESS: Shape = Direct(33);
    pub const FACCESSAT: Shape = Direct(466);
    pub const READLINK: Shape = Direct(58);
    pub const READLINKAT: Shape = Direct(473);
    pub const RENAME: Shape = Direct(128);
    pub const RENAMEAT: Shape = Direct(465);
    pub const FCNTL: Shape = Direct(92);
    pub const GETXATTR: Shape = Direct(234);
    pub const FGETXATTR: Shape = Direct(235);
    pub const SETXATTR: Shape = Direct(236);
    pub const REMOVEXATTR: Shape = Direct(238);
    pub const LISTXATTR: Shape = Direct(240);
    pub const WRITE: Shape = Direct(4);
    pub const CLOSE: Shape = Direct(6);
}

// =============================================================================
// Descriptors
// =============================================================================

use VariadicRule::{Fixed, ModeIfCreate, None as NotVariadic};

pub const OPEN: SyscallDescriptor = SyscallDescriptor::new("open", ModeIfCreate, table::OPEN);
pub const OPENAT: SyscallDescriptor = SyscallDescriptor::new("openat", ModeIfCreate, table::OPENAT);
pub const CREAT: SyscallDescriptor = SyscallDescriptor::new("creat", NotVariadic, table::CREAT);
pub const STAT: SyscallDescriptor = SyscallDescriptor::new("stat", NotVariadic, table::STAT);
pub const LSTAT: SyscallDescriptor = SyscallDescriptor::new("lstat", NotVariadic, table::LSTAT);
pub const FSTAT: SyscallDescriptor = SyscallDescriptor::new("fstat", NotVariadic, table::FSTAT);
pub const FSTATAT: SyscallDescriptor =
    SyscallDescriptor::new("fstatat", NotVariadic, table::FSTATAT);
pub const ACCESS: SyscallDescriptor = SyscallDescriptor::new("access", NotVariadic, table::ACCESS);
pub const FACCESSAT: SyscallDescriptor =
    SyscallDescriptor::new("faccessat", NotVariadic, table::FACCESSAT);
/// The legacy Linux `faccessat` syscall has no flags argument; non-zero flags
/// go through `faccessat2`.
#[cfg(target_os = "linux")]
pub const FACCESSAT2: SyscallDescriptor =
    SyscallDescriptor::new("faccessat2", NotVariadic, table::FACCESSAT2);
pub const READLINK: SyscallDescriptor =
    SyscallDescriptor::new("readlink", NotVariadic, table::READLINK);
pub const READLINKAT: SyscallDescriptor =
    SyscallDescriptor::new("readlinkat", NotVariadic, table::READLINKAT);
pub const RENAME: SyscallDescriptor = SyscallDescriptor::new("rename", NotVariadic, table::RENAME);
pub const RENAMEAT: SyscallDescriptor =
    SyscallDescriptor::new("renameat", NotVariadic, table::RENAMEAT);
pub const FCNTL: SyscallDescriptor = SyscallDescriptor::new("fcntl", Fixed, table::FCNTL);

// The Darwin xattr calls take extra `position`/`options` words; the Linux
// ones a `flags` word on set. Neither has a variadic tail.
pub const GETXATTR: SyscallDescriptor =
    SyscallDescriptor::new("getxattr", NotVariadic, table::GETXATTR);
pub const FGETXATTR: SyscallDescriptor =
    SyscallDescriptor::new("fgetxattr", NotVariadic, table::FGETXATTR);
pub const SETXATTR: SyscallDescriptor =
    SyscallDescriptor::new("setxattr", NotVariadic, table::SETXATTR);
pub const LISTXATTR: SyscallDescriptor =
    SyscallDescriptor::new("listxattr", NotVariadic, table::LISTXATTR);
pub const REMOVEXATTR: SyscallDescriptor =
    SyscallDescriptor::new("removexattr", NotVariadic, table::REMOVEXATTR);

#[cfg(target_os = "linux")]
pub const LGETXATTR: SyscallDescriptor =
    SyscallDescriptor::new("lgetxattr", NotVariadic, table::LGETXATTR);
#[cfg(target_os = "linux")]
pub const LSETXATTR: SyscallDescriptor =
    SyscallDescriptor::new("lsetxattr", NotVariadic, table::LSETXATTR);
#[cfg(target_os = "linux")]
pub const LLISTXATTR: SyscallDescriptor =
    SyscallDescriptor::new("llistxattr", NotVariadic, table::LLISTXATTR);
#[cfg(target_os = "linux")]
pub const LREMOVEXATTR: SyscallDescriptor =
    SyscallDescriptor::new("lremovexattr", NotVariadic, table::LREMOVEXATTR);

/// Used by the layer itself (flight log output, tests); never intercepted.
pub const WRITE: SyscallDescriptor = SyscallDescriptor::new("write", NotVariadic, table::WRITE);
pub const CLOSE: SyscallDescriptor = SyscallDescriptor::new("close", NotVariadic, table::CLOSE);

/// Every intercepted function on this target.
pub const ALL: &[SyscallDescriptor] = &[
    OPEN,
    OPENAT,
    CREAT,
    STAT,
    LSTAT,
    FSTAT,
    FSTATAT,
    ACCESS,
    FACCESSAT,
    READLINK,
    READLINKAT,
    RENAME,
    RENAMEAT,
    FCNTL,
    GETXATTR,
    FGETXATTR,
    SETXATTR,
    LISTXATTR,
    REMOVEXATTR,
    #[cfg(target_os = "linux")]
    LGETXATTR,
    #[cfg(target_os = "linux")]
    LSETXATTR,
    #[cfg(target_os = "linux")]
    LLISTXATTR,
    #[cfg(target_os = "linux")]
    LREMOVEXATTR,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        for (i, a) in ALL.iter().enumerate() {
            for b in &ALL[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn test_variadic_rules_of_the_table() {
        for d in ALL {
            let expected = match d.name {
                "open" | "openat" => VariadicRule::ModeIfCreate,
                "fcntl" => VariadicRule::Fixed,
                _ => VariadicRule::None,
            };
            assert_eq!(d.variadic, expected, "{}", d.name);
        }
    }

    #[test]
    fn test_lower_direct_is_verbatim() {
        let (nr, words) = Shape::Direct(7).lower(&[1, 2, 3]);
        assert_eq!(nr, 7);
        assert_eq!(words, [1, 2, 3, 0, 0, 0]);
    }

    #[test]
    fn test_lower_at_cwd_flags() {
        let (nr, words) = Shape::AtCwdFlags(79, 0x100).lower(&[0xaa, 0xbb]);
        assert_eq!(nr, 79);
        assert_eq!(words, [AT_FDCWD_WORD, 0xaa, 0xbb, 0x100, 0, 0]);
    }

    #[test]
    fn test_lower_creat_variants() {
        let (_, as_open) = Shape::OpenFlags(5, CREAT_FLAGS).lower(&[0xaa, 0o644]);
        assert_eq!(as_open, [0xaa, CREAT_FLAGS, 0o644, 0, 0, 0]);

        let (_, as_openat) = Shape::AtCwdOpenFlags(56, CREAT_FLAGS).lower(&[0xaa, 0o644]);
        assert_eq!(as_openat, [AT_FDCWD_WORD, 0xaa, CREAT_FLAGS, 0o644, 0, 0]);
    }

    #[test]
    fn test_lower_rename_pair() {
        let (nr, words) = Shape::AtCwdPair(38).lower(&[0x10, 0x20]);
        assert_eq!(nr, 38);
        assert_eq!(words, [AT_FDCWD_WORD, 0x10, AT_FDCWD_WORD, 0x20, 0, 0]);
    }

    #[test]
    fn test_lower_drops_words_past_the_limit() {
        let (_, words) = Shape::AtCwd(1).lower(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(words, [AT_FDCWD_WORD, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_at_fdcwd_word_is_sign_extended() {
        assert_eq!(AT_FDCWD_WORD as isize, libc::AT_FDCWD as isize);
        assert_eq!(AT_FDCWD_WORD as c_int, libc::AT_FDCWD);
    }

    #[test]
    fn test_creation_mode_ignores_garbage_without_create() {
        assert_eq!(creation_mode(libc::O_RDONLY, 0o7777), 0);
        assert_eq!(creation_mode(libc::O_WRONLY | libc::O_TRUNC, 0o644), 0);
        assert_eq!(creation_mode(libc::O_WRONLY | libc::O_CREAT, 0o644), 0o644);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_tmpfile_carries_a_mode() {
        assert_eq!(creation_mode(libc::O_TMPFILE | libc::O_RDWR, 0o600), 0o600);
        // O_DIRECTORY alone shares bits with O_TMPFILE but creates nothing
        assert_eq!(creation_mode(libc::O_DIRECTORY, 0o600), 0);
    }

    #[test]
    fn test_fcntl_classification() {
        assert_eq!(FcntlArg::classify(libc::F_GETFD), FcntlArg::None);
        assert_eq!(FcntlArg::classify(libc::F_DUPFD_CLOEXEC), FcntlArg::Int);
        assert_eq!(FcntlArg::classify(libc::F_SETLK), FcntlArg::Pointer);
    }

    #[test]
    fn test_fcntl_delivery() {
        let garbage: libc::intptr_t = 0x7fff_0000_0000_0064u64 as libc::intptr_t;
        assert_eq!(FcntlArg::None.deliver(garbage), 0);
        assert_eq!(FcntlArg::Int.deliver(garbage), 100);
        assert_eq!(FcntlArg::Int.deliver(-1), -1);
        assert_eq!(FcntlArg::Int.deliver(0xffff_ffff), -1);
        assert_eq!(FcntlArg::Pointer.deliver(garbage), garbage);
    }

    #[test]
    fn test_variadic_delivery_follows_the_governing_argument() {
        let garbage = 0x7fff_0000_0000_01a4u64 as usize;
        assert_eq!(OPEN.variadic.deliver(libc::O_RDONLY, garbage), 0);
        assert_eq!(
            OPENAT.variadic.deliver(libc::O_CREAT | libc::O_WRONLY, 0o644),
            0o644
        );
        assert_eq!(FCNTL.variadic.deliver(libc::F_GETFL, garbage), 0);
        assert_eq!(FCNTL.variadic.deliver(libc::F_DUPFD_CLOEXEC, garbage), 0x1a4);
        assert_eq!(FCNTL.variadic.deliver(libc::F_SETLK, garbage), garbage);
        assert_eq!(STAT.variadic.deliver(0, garbage), 0);
    }
}
