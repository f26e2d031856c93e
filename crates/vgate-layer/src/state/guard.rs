//! Per-thread resolver re-entrancy guard.
//!
//! A resolver is ordinary code: it may open, stat or read files through libc,
//! and those calls land back in the dispatcher. While a thread is inside a
//! resolver entry, its nested intercepted calls bypass the resolver and go
//! straight to the kernel.
//!
//! Only taken at `Ready`, when the thread-local runtime is usable. The flag is
//! const-initialized and has no destructor, so touching it never allocates.

use std::cell::Cell;

thread_local! {
    static IN_RESOLVER: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running resolver code until dropped.
#[must_use]
pub struct ResolverGuard(());

impl ResolverGuard {
    /// `None` if this thread is already inside a resolver entry, or if its
    /// thread-local storage is being torn down.
    #[inline]
    pub fn enter() -> Option<Self> {
        match IN_RESOLVER.try_with(|flag| flag.replace(true)) {
            Ok(false) => Some(ResolverGuard(())),
            Ok(true) | Err(_) => None,
        }
    }

    pub fn is_active() -> bool {
        IN_RESOLVER.try_with(Cell::get).unwrap_or(true)
    }
}

impl Drop for ResolverGuard {
    fn drop(&mut self) {
        let _ = IN_RESOLVER.try_with(|flag| flag.set(false));
    }
}
