//! Critical-section-guarded interior mutability.
//!
//! [`CritCell<T>`] is the ownership root for shared framework state: a cell
//! whose contents are only reachable from inside the framework critical
//! section.  All producers (interrupt context, other active objects) and
//! the scheduler funnel through [`CritCell::with`], so a single mutable
//! borrow at a time is guaranteed by the masking discipline rather than by
//! a lock of its own.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::crit;

/// A cell protected by the framework critical section.
///
/// # Access discipline
///
/// The closure passed to [`with`](Self::with) runs with the critical
/// section held and receives the only live `&mut T`.  Re-entering `with`
/// on the *same* cell from inside the closure is a contract violation; the
/// framework never does it, and debug builds trip an internal flag if an
/// application hook tries.  Nesting across *different* cells is fine.
pub struct CritCell<T> {
    busy: AtomicBool,
    inner: UnsafeCell<T>,
}

// SAFETY: all access goes through `with`, which holds the critical section
// for the duration of the borrow.  The integration's enter/exit pair is
// what makes that exclusion real across contexts; the default environment
// is a single context, where exclusion is trivial.
unsafe impl<T: Send> Sync for CritCell<T> {}

impl<T> CritCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            busy: AtomicBool::new(false),
            inner: UnsafeCell::new(value),
        }
    }

    /// Run `f` on the protected value inside the critical section.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        struct BusyGuard<'a>(&'a AtomicBool);
        impl Drop for BusyGuard<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::Relaxed);
            }
        }

        let _guard = crit::enter();
        let was_busy = self.busy.swap(true, Ordering::Relaxed);
        debug_assert!(!was_busy, "CritCell re-entered");
        let _busy = BusyGuard(&self.busy);
        // SAFETY: the critical section excludes every other framework
        // context, and the `busy` flag catches same-context re-entry in
        // debug builds.
        f(unsafe { &mut *self.inner.get() })
    }
}
