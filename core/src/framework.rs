//! Framework lifecycle, integration hooks, and publish/subscribe.
//!
//! The framework owns no board, no transport and no sleep policy; the
//! integration supplies those through registered function pointers.  The
//! critical-section pair is registered through
//! [`reflex_lib::crit_register`]; everything else — start/idle/tick/exit
//! hooks and the assertion handler — lives here.
//!
//! Hooks must be registered before [`framework_run`] starts scheduling.
//! Every hook default is a no-op; the assertion default panics.
//!
//! [`framework_run`]: crate::sched::framework_run

use core::fmt;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use paste::paste;
use reflex_lib::CritCell;

use crate::active::Actor;
use crate::config::{MAX_PRIORITY, MAX_PUB_SIGNAL, Signal};
use crate::event::EventRef;
use crate::sched;
use crate::trace::{self, TraceRecord};
use crate::{pool, timer};

// ---------------------------------------------------------------------------
// Integration hooks
// ---------------------------------------------------------------------------

macro_rules! define_hooks {
    ($($hook:ident),* $(,)?) => {
        paste! {
            $(
                static [<HOOK_ $hook:upper>]: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

                #[doc = concat!("Register the `", stringify!($hook), "` integration hook.")]
                pub fn [<set_ $hook>](f: fn()) {
                    [<HOOK_ $hook:upper>].store(f as *mut (), Ordering::Release);
                }

                pub(crate) fn [<call_ $hook>]() {
                    let hook = [<HOOK_ $hook:upper>].load(Ordering::Acquire);
                    if !hook.is_null() {
                        // SAFETY: the setter only stores `fn()` pointers,
                        // which have the same representation as `*mut ()`
                        // on supported targets.
                        let f: fn() = unsafe { core::mem::transmute(hook) };
                        f();
                    }
                }
            )*

            /// Unregister every integration hook (back to no-ops).
            pub fn hooks_reset() {
                $( [<HOOK_ $hook:upper>].store(ptr::null_mut(), Ordering::Release); )*
                ASSERT.store(ptr::null_mut(), Ordering::Release);
            }
        }
    };
}

define_hooks!(on_start, on_idle, on_tick, on_exit);

/// Signature of the assertion handler: reports the failure location and
/// must not return.
pub type AssertFn = fn(&'static str, u32) -> !;

static ASSERT: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

/// Register the assertion handler invoked on framework contract
/// violations (queue overflow on an unconditional post, posting to an
/// unregistered object, reference-count over/underflow, …).
pub fn set_assert_handler(f: AssertFn) {
    ASSERT.store(f as *mut (), Ordering::Release);
}

/// Report a framework contract violation.  Diverges.
pub(crate) fn assert_failed(file: &'static str, line: u32) -> ! {
    let handler = ASSERT.load(Ordering::Acquire);
    if !handler.is_null() {
        // SAFETY: the setter only stores `AssertFn` pointers.
        let f: AssertFn = unsafe { core::mem::transmute(handler) };
        f(file, line);
    }
    panic!("framework assertion failed at {file}:{line}");
}

// ---------------------------------------------------------------------------
// Publish / subscribe
// ---------------------------------------------------------------------------

/// Subscription errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishError {
    /// Signal at or above [`MAX_PUB_SIGNAL`]; point-to-point only.
    SignalOutOfRange,
    /// The active object is not registered.
    NotRegistered,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::SignalOutOfRange => write!(f, "signal not publishable"),
            PublishError::NotRegistered => write!(f, "active object not registered"),
        }
    }
}

struct SubTable {
    /// Bit `p` of `masks[sig]` is set iff the object at priority `p`
    /// subscribed to `sig`.
    masks: [u64; MAX_PUB_SIGNAL],
}

static SUBS: CritCell<SubTable> = CritCell::new(SubTable {
    masks: [0; MAX_PUB_SIGNAL],
});

/// Subscribe a registered active object to a publishable signal.
pub fn subscribe(ao: &'static dyn Actor, signal: Signal) -> Result<(), PublishError> {
    let idx = signal as usize;
    if idx >= MAX_PUB_SIGNAL {
        return Err(PublishError::SignalOutOfRange);
    }
    let prio = ao.prio();
    if prio == 0 {
        return Err(PublishError::NotRegistered);
    }
    SUBS.with(|s| s.masks[idx] |= 1u64 << prio);
    Ok(())
}

/// Remove one subscription.  Unsubscribing twice is a no-op.
pub fn unsubscribe(ao: &'static dyn Actor, signal: Signal) -> Result<(), PublishError> {
    let idx = signal as usize;
    if idx >= MAX_PUB_SIGNAL {
        return Err(PublishError::SignalOutOfRange);
    }
    let prio = ao.prio();
    if prio == 0 {
        return Err(PublishError::NotRegistered);
    }
    SUBS.with(|s| s.masks[idx] &= !(1u64 << prio));
    Ok(())
}

/// Drop every subscription held by `prio` (used on termination).
pub(crate) fn drop_subscriber(prio: u8) {
    let bit = 1u64 << prio;
    SUBS.with(|s| {
        for mask in s.masks.iter_mut() {
            *mask &= !bit;
        }
    });
}

/// Post the event FIFO to every subscriber of its signal, highest
/// priority first.  Returns the number of deliveries.
///
/// The caller's reference is untouched: recycle it when done, exactly as
/// after a point-to-point post.
pub fn publish(evt: EventRef) -> usize {
    let signal = evt.signal();
    let idx = signal as usize;
    if idx >= MAX_PUB_SIGNAL {
        return 0;
    }
    let mask = SUBS.with(|s| s.masks[idx]);
    let mut delivered = 0;
    for prio in (1..=MAX_PRIORITY).rev() {
        if mask & (1u64 << prio) == 0 {
            continue;
        }
        if let Some(target) = sched::actor_at(prio) {
            target.post_fifo(evt);
            delivered += 1;
        }
    }
    delivered
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Reset all framework state: pools, registry, ready set, timers,
/// subscriptions.  Call once before registering pools and objects.
///
/// Registered hooks and trace/log backends survive — the integration
/// wires those once, possibly before init.
pub fn framework_init() {
    sched::reset();
    timer::reset();
    pool::reset();
    SUBS.with(|s| s.masks = [0; MAX_PUB_SIGNAL]);
    trace::emit(&TraceRecord::FwkInit);
}

/// Request the scheduler loop to unwind.  Safe from any context,
/// including action handlers and hooks.
pub fn framework_exit() {
    sched::request_stop();
}
