//! Active objects: a state machine bound to a priority and a private
//! event queue.
//!
//! [`ActiveObject`] is the application-facing type — generic over the
//! context the state machine's actions operate on and over the queue
//! capacity.  The scheduler sees every registered object through the
//! object-safe [`Actor`] erasure.
//!
//! The mutable halves have different sharing rules and live in different
//! cells: the queue is touched by arbitrary producer contexts and sits in
//! a [`CritCell`]; the state machine is touched only by the scheduler
//! context (one dispatch at a time, run-to-completion) and sits in a bare
//! `UnsafeCell` behind that discipline.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};

use reflex_lib::CritCell;

use crate::event::EventRef;
use crate::hsm::{Dispatch, State, StateMachine};
use crate::queue::{EventQueue, QueueFull};
use crate::sched;
use crate::trace::{self, TraceRecord};

/// A state machine instance with a priority and a bounded event queue.
pub struct ActiveObject<C: 'static, const N: usize> {
    name: &'static str,
    /// Registered priority; 0 while unregistered.
    prio: AtomicU8,
    queue: CritCell<EventQueue<N>>,
    machine: UnsafeCell<StateMachine<C>>,
}

// SAFETY: the queue is guarded by its CritCell; the machine is accessed
// mutably only from the single scheduler context (non-preemptive RTC
// steps never overlap) and read-only elsewhere for diagnostics.
unsafe impl<C: Send + 'static, const N: usize> Sync for ActiveObject<C, N> {}

impl<C: 'static, const N: usize> ActiveObject<C, N> {
    /// Build an inert active object over a topology root and its initial
    /// context.  Usable in `static` items.
    pub const fn new(name: &'static str, root: &'static State<C>, ctx: C) -> Self {
        Self {
            name,
            prio: AtomicU8::new(0),
            queue: CritCell::new(EventQueue::new()),
            machine: UnsafeCell::new(StateMachine::new(root, ctx)),
        }
    }

    /// Run `f` on the application context.
    ///
    /// Diagnostic surface for tests and shutdown reporting; not
    /// synchronized against a dispatch in progress.
    pub fn inspect_context<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        // SAFETY: shared read; callers use this outside dispatch.
        f(unsafe { &*self.machine.get() }.context())
    }

    /// Name of a machine history slot's stored state (diagnostic).
    pub fn history_slot(&self, slot: usize) -> Option<&'static str> {
        // SAFETY: shared read; callers use this outside dispatch.
        unsafe { &*self.machine.get() }.history_slot(slot)
    }

    fn post_inner(&self, evt: EventRef, lifo: bool) -> Result<(), QueueFull> {
        let prio = self.prio.load(Ordering::Acquire);
        if prio == 0 {
            crate::framework::assert_failed(file!(), line!());
        }
        let depth = self.queue.with(|q| {
            if q.is_full() {
                return Err(QueueFull);
            }
            if !evt.event().is_static() {
                evt.event().retain();
            }
            let posted = if lifo {
                q.post_lifo(evt)
            } else {
                q.post_fifo(evt)
            };
            debug_assert!(posted.is_ok());
            sched::mark_ready(prio);
            Ok(q.len())
        })?;
        trace::emit(&TraceRecord::Posted {
            prio,
            signal: evt.signal(),
            lifo,
            depth,
        });
        Ok(())
    }
}

/// The scheduler's view of an active object.
///
/// The `#[doc(hidden)]` methods are the scheduler-side surface: they must
/// only be called from the scheduling context (the run loop, activation,
/// termination).  Everything else is safe from any context.
pub trait Actor: Sync {
    fn name(&self) -> &'static str;

    /// Registered priority; 0 while unregistered.
    fn prio(&self) -> u8;

    /// Post behind pending work.  Queue overflow is fatal (framework
    /// assertion): the unconditional post must never drop events.
    fn post_fifo(&self, evt: EventRef);

    /// Post ahead of pending work (urgent delivery).  Overflow is fatal.
    fn post_lifo(&self, evt: EventRef);

    fn try_post_fifo(&self, evt: EventRef) -> Result<(), QueueFull>;
    fn try_post_lifo(&self, evt: EventRef) -> Result<(), QueueFull>;

    fn queue_len(&self) -> usize;
    fn queue_capacity(&self) -> usize;
    fn queue_high_water(&self) -> usize;

    /// Whether the machine reached a top-level final state.
    fn is_completed(&self) -> bool;

    /// Current state name (diagnostic).
    fn current_state_name(&self) -> Option<&'static str>;

    #[doc(hidden)]
    fn bind_prio(&self, prio: u8);

    #[doc(hidden)]
    fn machine_init(&self) -> Dispatch;

    #[doc(hidden)]
    fn machine_dispatch(&self, evt: EventRef) -> Dispatch;

    #[doc(hidden)]
    fn fetch_event(&self) -> Option<EventRef>;

    #[doc(hidden)]
    fn flush_queue(&self);
}

impl<C: Send + 'static, const N: usize> Actor for ActiveObject<C, N> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn prio(&self) -> u8 {
        self.prio.load(Ordering::Acquire)
    }

    fn post_fifo(&self, evt: EventRef) {
        if self.post_inner(evt, false).is_err() {
            crate::framework::assert_failed(file!(), line!());
        }
    }

    fn post_lifo(&self, evt: EventRef) {
        if self.post_inner(evt, true).is_err() {
            crate::framework::assert_failed(file!(), line!());
        }
    }

    fn try_post_fifo(&self, evt: EventRef) -> Result<(), QueueFull> {
        self.post_inner(evt, false)
    }

    fn try_post_lifo(&self, evt: EventRef) -> Result<(), QueueFull> {
        self.post_inner(evt, true)
    }

    fn queue_len(&self) -> usize {
        self.queue.with(|q| q.len())
    }

    fn queue_capacity(&self) -> usize {
        N
    }

    fn queue_high_water(&self) -> usize {
        self.queue.with(|q| q.high_water())
    }

    fn is_completed(&self) -> bool {
        // SAFETY: shared read outside dispatch.
        unsafe { &*self.machine.get() }.is_completed()
    }

    fn current_state_name(&self) -> Option<&'static str> {
        // SAFETY: shared read outside dispatch.
        unsafe { &*self.machine.get() }.current_name()
    }

    fn bind_prio(&self, prio: u8) {
        self.prio.store(prio, Ordering::Release);
    }

    fn machine_init(&self) -> Dispatch {
        // SAFETY: scheduler-context exclusive access.
        let machine = unsafe { &mut *self.machine.get() };
        let (outcome, info) = machine.init_with_info();
        trace::emit(&TraceRecord::SmInit {
            prio: self.prio(),
            target: info.target,
            entries: info.entries,
            outcome,
        });
        outcome
    }

    fn machine_dispatch(&self, evt: EventRef) -> Dispatch {
        // SAFETY: scheduler-context exclusive access; RTC steps never
        // overlap.
        let machine = unsafe { &mut *self.machine.get() };
        let (outcome, info) = machine.dispatch_with_info(evt.event());
        trace::emit(&TraceRecord::SmDispatch {
            prio: self.prio(),
            signal: evt.signal(),
            source: info.source,
            target: info.target,
            exits: info.exits,
            entries: info.entries,
            outcome,
        });
        outcome
    }

    fn fetch_event(&self) -> Option<EventRef> {
        let prio = self.prio.load(Ordering::Acquire);
        let fetched = self.queue.with(|q| {
            let evt = q.pop();
            if q.is_empty() && prio != 0 {
                sched::clear_ready(prio);
            }
            evt.map(|e| (e, q.len()))
        });
        let (evt, remaining) = fetched?;
        trace::emit(&TraceRecord::Fetched {
            prio,
            signal: evt.signal(),
            remaining,
        });
        Some(evt)
    }

    fn flush_queue(&self) {
        let prio = self.prio.load(Ordering::Acquire);
        self.queue.with(|q| {
            q.drain(crate::pool::recycle);
            if prio != 0 {
                sched::clear_ready(prio);
            }
        });
    }
}
