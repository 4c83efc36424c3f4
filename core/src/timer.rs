//! Software timers over a single tick input.
//!
//! All armed timers hang off one intrusive list, appended at the tail, so
//! expiry order within a tick is insertion order — that ordering is part
//! of the contract and tests rely on it.  Each [`tick`] decrements every
//! armed timer; timers that hit zero post their embedded event to their
//! target active object in the same tick, then either leave the list
//! (one-shot) or reload (periodic).
//!
//! `tick()` is expected from a single privileged source (a timer
//! interrupt, or the host loop).  It shares the framework critical
//! section with `start`/`stop`, so arming and cancelling are safe from
//! any context, including the target's own action handlers.

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, AtomicU32, Ordering};

use reflex_lib::CritCell;
use reflex_lib::rlog_debug;

use crate::active::Actor;
use crate::config::Signal;
use crate::event::{Event, EventRef};
use crate::sched;
use crate::trace::{self, TraceRecord};

/// A software timer.
///
/// Created `const` with its expiry signal, bound to a target active
/// object with [`bind`](Self::bind), armed with [`start`](Self::start).
/// The expiry event is embedded — static, never recycled — so expiry
/// allocates nothing.
pub struct Timer {
    evt: Event,
    /// Priority of the target active object; 0 = unbound.
    target_prio: AtomicU8,
    /// Ticks until expiry while armed.
    remaining: AtomicU32,
    /// Reload value; 0 = one-shot.
    period: AtomicU32,
    armed: AtomicBool,
    /// Intrusive list link, owned by the timer list under the critical
    /// section.
    next: AtomicPtr<Timer>,
}

impl Timer {
    pub const fn new(signal: Signal) -> Self {
        Self {
            evt: Event::new(signal),
            target_prio: AtomicU8::new(0),
            remaining: AtomicU32::new(0),
            period: AtomicU32::new(0),
            armed: AtomicBool::new(false),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[inline]
    pub fn signal(&self) -> Signal {
        self.evt.signal()
    }

    /// Bind the timer to its target.  The target must already be
    /// registered; expiries address it by priority.
    pub fn bind(&self, target: &'static dyn Actor) {
        let prio = target.prio();
        if prio == 0 {
            crate::framework::assert_failed(file!(), line!());
        }
        self.target_prio.store(prio, Ordering::Release);
    }

    /// Arm the timer: first expiry after `nticks` ticks, then every
    /// `period` ticks (`0` = one-shot).
    ///
    /// Re-arming an armed timer rewrites its counters in place and keeps
    /// its list position.
    pub fn start(&'static self, nticks: u32, period: u32) {
        let prio = self.target_prio.load(Ordering::Acquire);
        if nticks == 0 || prio == 0 {
            crate::framework::assert_failed(file!(), line!());
        }
        TIMERS.with(|list| {
            self.remaining.store(nticks, Ordering::Relaxed);
            self.period.store(period, Ordering::Relaxed);
            if !self.armed.load(Ordering::Relaxed) {
                self.armed.store(true, Ordering::Relaxed);
                self.next.store(ptr::null_mut(), Ordering::Relaxed);
                list.append(self);
            }
        });
        trace::emit(&TraceRecord::TmrStarted {
            signal: self.signal(),
            prio,
            nticks,
            period,
        });
    }

    /// Disarm the timer.  Idempotent; returns whether it was armed.
    pub fn stop(&'static self) -> bool {
        let was_armed = TIMERS.with(|list| {
            if !self.armed.load(Ordering::Relaxed) {
                return false;
            }
            list.unlink(self);
            self.armed.store(false, Ordering::Relaxed);
            self.next.store(ptr::null_mut(), Ordering::Relaxed);
            true
        });
        trace::emit(&TraceRecord::TmrStopped {
            signal: self.signal(),
            prio: self.target_prio.load(Ordering::Acquire),
            was_armed,
        });
        was_armed
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    /// Ticks left until the next expiry (diagnostic; 0 when idle).
    #[inline]
    pub fn ticks_left(&self) -> u32 {
        if self.is_armed() {
            self.remaining.load(Ordering::Relaxed)
        } else {
            0
        }
    }
}

struct TimerList {
    head: *const Timer,
    tail: *const Timer,
}

// SAFETY: the raw links are only walked inside the CritCell closure.
unsafe impl Send for TimerList {}

impl TimerList {
    fn append(&mut self, timer: &'static Timer) {
        let ptr: *const Timer = timer;
        if self.tail.is_null() {
            self.head = ptr;
        } else {
            // SAFETY: `tail` points at a timer previously appended; armed
            // timers are `&'static` by the `start` signature.
            unsafe { (*self.tail).next.store(ptr as *mut Timer, Ordering::Relaxed) };
        }
        self.tail = ptr;
    }

    fn unlink(&mut self, timer: &Timer) {
        let target: *const Timer = timer;
        let mut prev: *const Timer = ptr::null();
        let mut cur = self.head;
        while !cur.is_null() {
            // SAFETY: list nodes are live `&'static Timer`s.
            let next = unsafe { (*cur).next.load(Ordering::Relaxed) } as *const Timer;
            if cur == target {
                if prev.is_null() {
                    self.head = next;
                } else {
                    // SAFETY: `prev` is a live list node.
                    unsafe { (*prev).next.store(next as *mut Timer, Ordering::Relaxed) };
                }
                if self.tail == cur {
                    self.tail = prev;
                }
                return;
            }
            prev = cur;
            cur = next;
        }
    }
}

static TIMERS: CritCell<TimerList> = CritCell::new(TimerList {
    head: ptr::null(),
    tail: ptr::null(),
});

/// Advance time by one tick.
///
/// Decrements every armed timer; expired timers post their event to their
/// target in list (= insertion) order, one-shot timers leave the list,
/// periodic timers reload.  Expiries whose target has since terminated
/// are dropped.
pub fn tick() {
    crate::framework::call_on_tick();
    TIMERS.with(|list| {
        let mut prev: *const Timer = ptr::null();
        let mut cur = list.head;
        while !cur.is_null() {
            // SAFETY: list nodes are live `&'static Timer`s, linked and
            // unlinked only under this critical section.
            let timer: &'static Timer = unsafe { &*cur };
            let next = timer.next.load(Ordering::Relaxed) as *const Timer;
            let remaining = timer.remaining.load(Ordering::Relaxed);
            if remaining > 1 {
                timer.remaining.store(remaining - 1, Ordering::Relaxed);
                prev = cur;
                cur = next;
                continue;
            }

            // Expiry.
            let prio = timer.target_prio.load(Ordering::Acquire);
            match sched::actor_at(prio) {
                Some(target) => {
                    target.post_fifo(EventRef::of(&timer.evt));
                    trace::emit(&TraceRecord::TmrExpired {
                        signal: timer.signal(),
                        prio,
                    });
                }
                None => {
                    rlog_debug!(
                        "timer: expiry for signal {} dropped, target {} gone",
                        timer.signal(),
                        prio
                    );
                }
            }

            let period = timer.period.load(Ordering::Relaxed);
            if period == 0 {
                // One-shot: unlink in place.
                timer.armed.store(false, Ordering::Relaxed);
                timer.next.store(ptr::null_mut(), Ordering::Relaxed);
                if prev.is_null() {
                    list.head = next;
                } else {
                    // SAFETY: `prev` is a live list node.
                    unsafe { (*prev).next.store(next as *mut Timer, Ordering::Relaxed) };
                }
                if list.tail == cur {
                    list.tail = prev;
                }
            } else {
                timer.remaining.store(period, Ordering::Relaxed);
                prev = cur;
            }
            cur = next;
        }
    });
}

/// Number of armed timers (diagnostic).
pub fn armed_count() -> usize {
    TIMERS.with(|list| {
        let mut n = 0;
        let mut cur = list.head;
        while !cur.is_null() {
            n += 1;
            // SAFETY: list nodes are live `&'static Timer`s.
            cur = unsafe { (*cur).next.load(Ordering::Relaxed) } as *const Timer;
        }
        n
    })
}

/// Disarm everything and empty the list.
pub(crate) fn reset() {
    TIMERS.with(|list| {
        let mut cur = list.head;
        while !cur.is_null() {
            // SAFETY: list nodes are live `&'static Timer`s.
            let timer = unsafe { &*cur };
            let next = timer.next.load(Ordering::Relaxed) as *const Timer;
            timer.armed.store(false, Ordering::Relaxed);
            timer.next.store(ptr::null_mut(), Ordering::Relaxed);
            cur = next;
        }
        list.head = ptr::null();
        list.tail = ptr::null();
    });
}
