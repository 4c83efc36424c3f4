//! The cooperative active-object scheduler.
//!
//! Fixed-priority, non-preemptive: the loop picks the highest-priority
//! active object with pending work, dispatches exactly one event through
//! its state machine, recycles the event, and repeats.  A dispatch in
//! progress is never interrupted — producers (interrupt contexts, other
//! active objects' actions) only enqueue and mark the ready set.
//!
//! The registry is a fixed slot table indexed by priority; priorities of
//! registered objects form a set (one object per slot).

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use reflex_lib::CritCell;
use reflex_lib::rlog_warn;

use crate::active::Actor;
use crate::config::MAX_PRIORITY;
use crate::hsm::Dispatch;
use crate::pool;
use crate::ready::ReadySet;
use crate::trace::{self, TraceRecord};

/// Registration errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterError {
    /// Priority outside `1..=MAX_PRIORITY`.
    PrioOutOfRange,
    /// Another active object already holds this priority.
    PrioInUse,
    /// The object is already registered.
    AlreadyRegistered,
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::PrioOutOfRange => write!(f, "priority out of range"),
            RegisterError::PrioInUse => write!(f, "priority already in use"),
            RegisterError::AlreadyRegistered => write!(f, "active object already registered"),
        }
    }
}

const SLOTS: usize = MAX_PRIORITY as usize + 1;

struct Registry {
    slots: [Option<&'static dyn Actor>; SLOTS],
    count: usize,
}

static REGISTRY: CritCell<Registry> = CritCell::new(Registry {
    slots: [None; SLOTS],
    count: 0,
});

static READY: CritCell<ReadySet> = CritCell::new(ReadySet::new());

/// Set when `framework_exit` requests the run loop to unwind.
static STOP: AtomicBool = AtomicBool::new(false);

/// Register an active object at a priority.
///
/// Higher values are more urgent.  The object stays inert until
/// [`ao_activate`] runs its top-level initial transition.
pub fn ao_register(ao: &'static dyn Actor, prio: u8) -> Result<(), RegisterError> {
    if prio == 0 || prio > MAX_PRIORITY {
        return Err(RegisterError::PrioOutOfRange);
    }
    if ao.prio() != 0 {
        return Err(RegisterError::AlreadyRegistered);
    }
    REGISTRY.with(|reg| {
        if reg.slots[prio as usize].is_some() {
            return Err(RegisterError::PrioInUse);
        }
        reg.slots[prio as usize] = Some(ao);
        reg.count += 1;
        ao.bind_prio(prio);
        Ok(())
    })?;
    trace::emit(&TraceRecord::AoRegistered {
        prio,
        name: ao.name(),
    });
    Ok(())
}

/// Run the object's top-level initial transition.
///
/// Returns [`Dispatch::Initialized`] on success, [`Dispatch::UnknownState`]
/// for an unregistered or already-initialized object.
pub fn ao_activate(ao: &'static dyn Actor) -> Dispatch {
    if ao.prio() == 0 {
        return Dispatch::UnknownState;
    }
    ao.machine_init()
}

/// Remove an active object: clear its ready state, recycle everything
/// still queued, drop its subscriptions, release the priority slot.
pub fn ao_terminate(ao: &'static dyn Actor) {
    let prio = ao.prio();
    if prio == 0 {
        return;
    }
    REGISTRY.with(|reg| {
        if reg.slots[prio as usize].is_some() {
            reg.slots[prio as usize] = None;
            reg.count -= 1;
        }
    });
    ao.flush_queue();
    crate::framework::drop_subscriber(prio);
    ao.bind_prio(0);
    trace::emit(&TraceRecord::AoTerminated {
        prio,
        name: ao.name(),
    });
}

/// Number of registered active objects.
pub fn registered_count() -> usize {
    REGISTRY.with(|reg| reg.count)
}

/// The actor registered at `prio`, if any.
pub(crate) fn actor_at(prio: u8) -> Option<&'static dyn Actor> {
    if prio == 0 || prio > MAX_PRIORITY {
        return None;
    }
    REGISTRY.with(|reg| reg.slots[prio as usize])
}

pub(crate) fn mark_ready(prio: u8) {
    READY.with(|r| r.mark(prio));
}

pub(crate) fn clear_ready(prio: u8) {
    READY.with(|r| r.clear(prio));
}

/// Highest priority with pending work (diagnostic).
pub fn highest_ready() -> Option<u8> {
    READY.with(|r| r.highest())
}

pub(crate) fn request_stop() {
    STOP.store(true, Ordering::Release);
}

pub(crate) fn stop_requested() -> bool {
    STOP.load(Ordering::Acquire)
}

pub(crate) fn clear_stop() {
    STOP.store(false, Ordering::Release);
}

/// Execute at most one run-to-completion step.
///
/// Returns `true` if an event was dispatched, `false` if no active object
/// had pending work.
pub fn framework_step() -> bool {
    let Some(actor) = highest_ready().and_then(actor_at) else {
        return false;
    };
    let Some(evt) = actor.fetch_event() else {
        return false;
    };
    let signal = evt.signal();
    let outcome = actor.machine_dispatch(evt);
    pool::recycle(evt);
    if outcome.is_error() {
        rlog_warn!(
            "sched: dispatch error {:?} in '{}' (signal {})",
            outcome,
            actor.name(),
            signal
        );
    }
    if actor.is_completed() {
        ao_terminate(actor);
    }
    true
}

/// The scheduler loop.
///
/// Runs until every active object has terminated (or completed its
/// machine) or [`framework_exit`](crate::framework::framework_exit) is
/// requested.  When no work is pending the idle hook runs; the default
/// hook returns immediately, integration hooks may sleep or wait for
/// interrupt.
pub fn framework_run() {
    crate::framework::call_on_start();
    trace::emit(&TraceRecord::FwkRun);
    while !stop_requested() {
        if !framework_step() {
            if registered_count() == 0 {
                break;
            }
            crate::framework::call_on_idle();
        }
    }
    crate::framework::call_on_exit();
    trace::emit(&TraceRecord::FwkExit);
}

/// Forget all registrations and ready state.
pub(crate) fn reset() {
    REGISTRY.with(|reg| {
        for slot in reg.slots.iter_mut() {
            if let Some(ao) = slot.take() {
                ao.bind_prio(0);
            }
        }
        reg.count = 0;
    });
    READY.with(|r| r.reset());
    clear_stop();
}
