//! The framework critical section.
//!
//! Every shared framework structure (event pools, ready set, queues, the
//! timer list) is mutated only while the critical section is held.  The
//! actual masking mechanism belongs to the target integration: on a bare
//! MCU it disables interrupts, on a host port it may take a process-wide
//! lock.  The framework only requires that the pair nests correctly.
//!
//! # Backend contract
//!
//! `enter` returns an opaque token (saved interrupt flags, a lock cookie,
//! whatever the integration needs); `exit` receives the token of the
//! matching `enter`.  Calls nest: `enter(); enter(); exit(); exit();` must
//! restore the pre-section state exactly.
//!
//! The default backend is a pure nesting counter.  That is correct for the
//! framework's default environment — one logical execution context, nothing
//! running on top of it — and for single-threaded host tests.  Integrations
//! that add interrupt-context producers register their own pair.
//!
//! # Registration
//!
//! ```ignore
//! fn mask_irqs() -> usize { /* save flags, cli */ }
//! fn unmask_irqs(saved: usize) { /* restore flags */ }
//!
//! reflex_lib::crit_register(mask_irqs, unmask_irqs);
//! ```

use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

/// Signature of the critical-section enter backend.
///
/// Returns an opaque token passed back to the matching [`CritExitFn`].
pub type CritEnterFn = fn() -> usize;

/// Signature of the critical-section exit backend.
pub type CritExitFn = fn(usize);

/// Stored as raw pointers; `null` selects the nesting-counter default.
static ENTER: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());
static EXIT: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

/// Current nesting depth.  Diagnostic only when a backend is registered.
static DEPTH: AtomicU32 = AtomicU32::new(0);

/// Register the integration's critical-section pair.
///
/// Typically called once, before the framework starts scheduling.  Both
/// functions must be safe to call from any context the integration allows
/// to post events or advance the tick.
pub fn crit_register(enter: CritEnterFn, exit: CritExitFn) {
    ENTER.store(enter as *mut (), Ordering::Release);
    EXIT.store(exit as *mut (), Ordering::Release);
}

/// Drop back to the nesting-counter default.
///
/// Used by framework re-initialization and test fixtures.  Must not be
/// called while any [`CritGuard`] is live.
pub fn crit_reset() {
    ENTER.store(ptr::null_mut(), Ordering::Release);
    EXIT.store(ptr::null_mut(), Ordering::Release);
    DEPTH.store(0, Ordering::Release);
}

/// RAII guard for one nesting level of the critical section.
///
/// `!Send`/`!Sync`: the token must be returned from the context that
/// produced it.
#[must_use = "dropping the guard immediately reopens the critical section"]
pub struct CritGuard {
    token: usize,
    _not_send: PhantomData<*mut ()>,
}

/// Enter the critical section.
///
/// The section is held until the returned guard drops.  Nesting is
/// permitted and cheap; the backend sees every level.
#[inline]
pub fn enter() -> CritGuard {
    let ptr = ENTER.load(Ordering::Acquire);
    let token = if ptr.is_null() {
        0
    } else {
        // SAFETY: `crit_register` only stores valid `CritEnterFn` pointers,
        // which have the same representation as `*mut ()` on supported
        // targets.
        let f: CritEnterFn = unsafe { core::mem::transmute(ptr) };
        f()
    };
    DEPTH.fetch_add(1, Ordering::Relaxed);
    CritGuard {
        token,
        _not_send: PhantomData,
    }
}

impl Drop for CritGuard {
    #[inline]
    fn drop(&mut self) {
        DEPTH.fetch_sub(1, Ordering::Relaxed);
        let ptr = EXIT.load(Ordering::Acquire);
        if !ptr.is_null() {
            // SAFETY: same representation argument as in `enter`.
            let f: CritExitFn = unsafe { core::mem::transmute(ptr) };
            f(self.token);
        }
    }
}

/// Current nesting depth of the critical section.
#[inline]
pub fn crit_depth() -> u32 {
    DEPTH.load(Ordering::Relaxed)
}

/// Whether any critical section is currently held.
#[inline]
pub fn crit_is_active() -> bool {
    crit_depth() > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_counts() {
        let _serial = crate::test_lock();
        crit_reset();
        assert!(!crit_is_active());
        let outer = enter();
        assert_eq!(crit_depth(), 1);
        {
            let _inner = enter();
            assert_eq!(crit_depth(), 2);
        }
        assert_eq!(crit_depth(), 1);
        drop(outer);
        assert!(!crit_is_active());
    }
}
