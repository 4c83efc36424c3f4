//! Shared fixture for tests that touch the global framework state
//! (pools, registry, ready set, timers, trace filters).
//!
//! Cargo runs tests concurrently; everything global serializes on one
//! lock and starts from a fresh `framework_init()`.

use spin::{Mutex, MutexGuard};

static FRAMEWORK_LOCK: Mutex<()> = Mutex::new(());

pub struct Fixture {
    _guard: MutexGuard<'static, ()>,
}

/// Take the framework lock and reset all global state.
pub fn fixture() -> Fixture {
    let guard = FRAMEWORK_LOCK.lock();
    crate::trace::trace_reset();
    crate::framework::hooks_reset();
    crate::framework::framework_init();
    Fixture { _guard: guard }
}
