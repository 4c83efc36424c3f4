#![cfg_attr(not(test), no_std)]

//! reflex-core: hierarchical state machines as cooperating active
//! objects.
//!
//! Each active object owns a state machine, a private event queue and a
//! priority; objects communicate only by posting events.  A cooperative
//! fixed-priority scheduler drives one run-to-completion step at a time,
//! dynamic events are reference-counted out of fixed-block pools, and a
//! tick-driven timer list turns time into events.

pub mod active;
pub mod config;
pub mod event;
pub mod framework;
pub mod hsm;
pub mod pool;
pub mod queue;
pub mod ready;
pub mod sched;
pub mod timer;
pub mod trace;

pub use active::{ActiveObject, Actor};
pub use config::Signal;
pub use event::{Event, EventRef};
pub use framework::{
    PublishError, framework_exit, framework_init, hooks_reset, publish, set_assert_handler,
    set_on_exit, set_on_idle, set_on_start, set_on_tick, subscribe, unsubscribe,
};
pub use hsm::{Dispatch, StateMachine};
pub use pool::{PoolError, PoolStorage, new_event, new_event_with, recycle};
pub use queue::{EventQueue, QueueFull};
pub use sched::{
    RegisterError, ao_activate, ao_register, ao_terminate, framework_run, framework_step,
};
pub use timer::{Timer, tick};
pub use trace::{
    TraceBackend, TraceGroups, TraceRecord, trace_filter_group, trace_filter_prio,
    trace_filter_signal, trace_register_backend, trace_reset,
};

// The integration registers its critical-section pair through reflex-lib;
// re-exported so applications depend on one crate.
pub use reflex_lib::{crit_register, crit_reset};

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod queue_tests;
#[cfg(test)]
mod ready_tests;
#[cfg(test)]
mod timer_tests;
#[cfg(test)]
mod trace_tests;
