//! Structured observation hooks.
//!
//! Every significant framework step (pool traffic, queue traffic, state
//! machine activity, timer activity, lifecycle) emits a [`TraceRecord`]
//! to a registered backend, synchronously and inline.  Records are typed
//! data, not bare callbacks per concern; a backend matches on the variant
//! and does whatever its transport wants with it.  The wire format, if
//! any, is the backend's business.
//!
//! Records are filtered before emission by three orthogonal masks:
//!
//! - **group**: one bit per subsystem ([`TraceGroups`]),
//! - **priority**: one bit per active-object priority,
//! - **signal**: one bit per signal below
//!   [`TRACE_SIGNAL_SLOTS`](crate::config::TRACE_SIGNAL_SLOTS) (higher
//!   signals always pass).
//!
//! All three default to fully open.  A backend must execute in bounded
//! time and must not allocate events or dispatch.

use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU8, AtomicU32, AtomicU64, Ordering};

use bitflags::bitflags;

use crate::config::{Signal, TRACE_SIGNAL_SLOTS};
use crate::hsm::Dispatch;

bitflags! {
    /// Trace record categories, one bit per subsystem.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TraceGroups: u8 {
        const POOL  = 1 << 0;
        const QUEUE = 1 << 1;
        const AO    = 1 << 2;
        const SM    = 1 << 3;
        const TMR   = 1 << 4;
        const FWK   = 1 << 5;
    }
}

/// One observation record.
#[derive(Clone, Copy, Debug)]
pub enum TraceRecord {
    // Pool group.
    PoolRegistered { pool: u8, block_size: usize, count: usize },
    EvtAllocated { signal: Signal, pool: u8 },
    EvtRecycled { signal: Signal, pool: u8, refs_left: u8 },
    /// An allocation failed; `pool` is the best-fit pool that was empty,
    /// or `None` when no pool covers the requested size.
    EvtExhausted { pool: Option<u8>, size: usize },

    // Queue group.
    Posted { prio: u8, signal: Signal, lifo: bool, depth: usize },
    Fetched { prio: u8, signal: Signal, remaining: usize },

    // Active-object group.
    AoRegistered { prio: u8, name: &'static str },
    AoTerminated { prio: u8, name: &'static str },

    // State-machine group.
    SmInit {
        prio: u8,
        target: Option<&'static str>,
        entries: u8,
        outcome: Dispatch,
    },
    SmDispatch {
        prio: u8,
        signal: Signal,
        source: Option<&'static str>,
        target: Option<&'static str>,
        exits: u8,
        entries: u8,
        outcome: Dispatch,
    },

    // Timer group.
    TmrStarted { signal: Signal, prio: u8, nticks: u32, period: u32 },
    TmrStopped { signal: Signal, prio: u8, was_armed: bool },
    TmrExpired { signal: Signal, prio: u8 },

    // Framework group.
    FwkInit,
    FwkRun,
    FwkExit,
}

impl TraceRecord {
    pub fn group(&self) -> TraceGroups {
        match self {
            TraceRecord::PoolRegistered { .. }
            | TraceRecord::EvtAllocated { .. }
            | TraceRecord::EvtRecycled { .. }
            | TraceRecord::EvtExhausted { .. } => TraceGroups::POOL,
            TraceRecord::Posted { .. } | TraceRecord::Fetched { .. } => TraceGroups::QUEUE,
            TraceRecord::AoRegistered { .. } | TraceRecord::AoTerminated { .. } => TraceGroups::AO,
            TraceRecord::SmInit { .. } | TraceRecord::SmDispatch { .. } => TraceGroups::SM,
            TraceRecord::TmrStarted { .. }
            | TraceRecord::TmrStopped { .. }
            | TraceRecord::TmrExpired { .. } => TraceGroups::TMR,
            TraceRecord::FwkInit | TraceRecord::FwkRun | TraceRecord::FwkExit => TraceGroups::FWK,
        }
    }

    /// The active-object priority the record concerns, if any.
    pub fn prio(&self) -> Option<u8> {
        match self {
            TraceRecord::Posted { prio, .. }
            | TraceRecord::Fetched { prio, .. }
            | TraceRecord::AoRegistered { prio, .. }
            | TraceRecord::AoTerminated { prio, .. }
            | TraceRecord::SmInit { prio, .. }
            | TraceRecord::SmDispatch { prio, .. }
            | TraceRecord::TmrStarted { prio, .. }
            | TraceRecord::TmrStopped { prio, .. }
            | TraceRecord::TmrExpired { prio, .. } => Some(*prio),
            _ => None,
        }
    }

    /// The event signal the record concerns, if any.
    pub fn signal(&self) -> Option<Signal> {
        match self {
            TraceRecord::EvtAllocated { signal, .. }
            | TraceRecord::EvtRecycled { signal, .. }
            | TraceRecord::Posted { signal, .. }
            | TraceRecord::Fetched { signal, .. }
            | TraceRecord::SmDispatch { signal, .. }
            | TraceRecord::TmrStarted { signal, .. }
            | TraceRecord::TmrStopped { signal, .. }
            | TraceRecord::TmrExpired { signal, .. } => Some(*signal),
            _ => None,
        }
    }
}

/// Signature of a trace backend.
pub type TraceBackend = fn(&TraceRecord);

/// Stored as a raw pointer; `null` means "no backend, drop records".
static BACKEND: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

static GROUP_MASK: AtomicU8 = AtomicU8::new(TraceGroups::all().bits());
static PRIO_MASK: AtomicU64 = AtomicU64::new(u64::MAX);

const SIG_WORDS: usize = TRACE_SIGNAL_SLOTS / 32;
static SIG_MASK: [AtomicU32; SIG_WORDS] = [const { AtomicU32::new(u32::MAX) }; SIG_WORDS];

/// Register the backend that consumes records.
pub fn trace_register_backend(backend: TraceBackend) {
    BACKEND.store(backend as *mut (), Ordering::Release);
}

/// Remove the backend and open all filters.
pub fn trace_reset() {
    BACKEND.store(ptr::null_mut(), Ordering::Release);
    GROUP_MASK.store(TraceGroups::all().bits(), Ordering::Relaxed);
    PRIO_MASK.store(u64::MAX, Ordering::Relaxed);
    for word in &SIG_MASK {
        word.store(u32::MAX, Ordering::Relaxed);
    }
}

/// Enable or disable one or more record groups.
pub fn trace_filter_group(groups: TraceGroups, enable: bool) {
    if enable {
        GROUP_MASK.fetch_or(groups.bits(), Ordering::Relaxed);
    } else {
        GROUP_MASK.fetch_and(!groups.bits(), Ordering::Relaxed);
    }
}

/// Enable or disable records concerning the given priority.
pub fn trace_filter_prio(prio: u8, enable: bool) {
    if prio > 63 {
        return;
    }
    let bit = 1u64 << prio;
    if enable {
        PRIO_MASK.fetch_or(bit, Ordering::Relaxed);
    } else {
        PRIO_MASK.fetch_and(!bit, Ordering::Relaxed);
    }
}

/// Enable or disable records concerning the given signal.  Signals at or
/// above [`TRACE_SIGNAL_SLOTS`](crate::config::TRACE_SIGNAL_SLOTS) are not
/// individually filterable and always pass.
pub fn trace_filter_signal(signal: Signal, enable: bool) {
    let idx = signal as usize;
    if idx >= TRACE_SIGNAL_SLOTS {
        return;
    }
    let bit = 1u32 << (idx % 32);
    let word = &SIG_MASK[idx / 32];
    if enable {
        word.fetch_or(bit, Ordering::Relaxed);
    } else {
        word.fetch_and(!bit, Ordering::Relaxed);
    }
}

fn signal_enabled(signal: Signal) -> bool {
    let idx = signal as usize;
    if idx >= TRACE_SIGNAL_SLOTS {
        return true;
    }
    SIG_MASK[idx / 32].load(Ordering::Relaxed) & (1u32 << (idx % 32)) != 0
}

/// Emit a record through the filters to the backend, if any.
pub(crate) fn emit(record: &TraceRecord) {
    let backend = BACKEND.load(Ordering::Acquire);
    if backend.is_null() {
        return;
    }
    if GROUP_MASK.load(Ordering::Relaxed) & record.group().bits() == 0 {
        return;
    }
    if let Some(prio) = record.prio() {
        if prio <= 63 && PRIO_MASK.load(Ordering::Relaxed) & (1u64 << prio) == 0 {
            return;
        }
    }
    if let Some(signal) = record.signal() {
        if !signal_enabled(signal) {
            return;
        }
    }
    // SAFETY: `trace_register_backend` only stores valid `TraceBackend`
    // fn pointers, which have the same representation as `*mut ()` on
    // supported targets.
    let f: TraceBackend = unsafe { core::mem::transmute(backend) };
    f(record);
}
