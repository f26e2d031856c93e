//! Opt-in call counters.
//!
//! Disabled unless `VGATE_PROFILE` is set when the runtime-safe hook runs.
//! When disabled, every counting site is one relaxed load and a branch. The
//! counters live in `.bss` and are reported through `vgate_get_telemetry`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Master switch checked by [`profile_count!`].
pub static PROFILE_ENABLED: AtomicBool = AtomicBool::new(false);

pub static PROFILE: Profile = Profile::new();

macro_rules! profile_counters {
    ($($(#[$attr:meta])* $name:ident,)*) => {
        /// Per-function call counts plus the routing outcome of each call.
        pub struct Profile {
            $($(#[$attr])* pub $name: AtomicU64,)*
            /// Calls answered by the kernel because the state was below `Ready`.
            pub direct: AtomicU64,
            /// Calls handed to the resolver table.
            pub resolved: AtomicU64,
            /// Calls made from inside a resolver entry and sent to the kernel.
            pub nested: AtomicU64,
        }

        impl Profile {
            pub const fn new() -> Self {
                Self {
                    $($(#[$attr])* $name: AtomicU64::new(0),)*
                    direct: AtomicU64::new(0),
                    resolved: AtomicU64::new(0),
                    nested: AtomicU64::new(0),
                }
            }

            /// Call count for an intercepted function, by its libc name.
            pub fn calls(&self, name: &str) -> Option<u64> {
                match name {
                    $($(#[$attr])* stringify!($name) => Some(self.$name.load(Ordering::Relaxed)),)*
                    _ => None,
                }
            }
        }
    };
}

profile_counters! {
    open,
    openat,
    creat,
    stat,
    lstat,
    fstat,
    fstatat,
    access,
    faccessat,
    readlink,
    readlinkat,
    rename,
    renameat,
    fcntl,
    getxattr,
    fgetxattr,
    setxattr,
    listxattr,
    removexattr,
    #[cfg(target_os = "linux")]
    lgetxattr,
    #[cfg(target_os = "linux")]
    lsetxattr,
    #[cfg(target_os = "linux")]
    llistxattr,
    #[cfg(target_os = "linux")]
    lremovexattr,
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}

pub fn enabled() -> bool {
    PROFILE_ENABLED.load(Ordering::Relaxed)
}

pub fn set_enabled(on: bool) {
    PROFILE_ENABLED.store(on, Ordering::Relaxed);
}

/// Bump a [`PROFILE`] counter if profiling is on.
#[macro_export]
macro_rules! profile_count {
    ($field:ident) => {
        if $crate::profile::PROFILE_ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            $crate::profile::PROFILE
                .$field
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor;

    #[test]
    fn test_every_intercepted_function_has_a_counter() {
        let profile = Profile::new();
        for d in descriptor::ALL {
            assert_eq!(profile.calls(d.name), Some(0), "{}", d.name);
        }
        assert_eq!(profile.calls("write"), None);
    }

    #[test]
    fn test_calls_reads_the_named_counter() {
        let profile = Profile::new();
        profile.stat.fetch_add(3, Ordering::Relaxed);
        assert_eq!(profile.calls("stat"), Some(3));
        assert_eq!(profile.calls("lstat"), Some(0));
    }
}
