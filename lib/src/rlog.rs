//! Framework logging funnel.
//!
//! All framework log output goes through a single **backend** function
//! pointer.  A library has no serial port of its own: until the
//! integration registers a backend, log lines are discarded.  The host
//! demo registers a stderr writer; an MCU port would hand lines to its
//! UART driver.
//!
//! # Backend contract
//!
//! The backend receives the level and the pre-formatted arguments for a
//! single log line and is responsible for writing the text atomically
//! (no interleaving between contexts) and appending the line terminator.
//!
//! Logging is the human-facing channel; the structured observation stream
//! for tools lives in `reflex-core`'s trace module.

use core::fmt;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

// ---------------------------------------------------------------------------
// Log levels
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RlogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl RlogLevel {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => RlogLevel::Error,
            1 => RlogLevel::Warn,
            2 => RlogLevel::Info,
            3 => RlogLevel::Debug,
            _ => RlogLevel::Trace,
        }
    }
}

static CURRENT_LEVEL: AtomicU8 = AtomicU8::new(RlogLevel::Info as u8);

#[inline(always)]
fn is_enabled(level: RlogLevel) -> bool {
    level as u8 <= CURRENT_LEVEL.load(Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Backend dispatch
// ---------------------------------------------------------------------------

/// Signature of an rlog backend.
pub type RlogBackend = fn(RlogLevel, fmt::Arguments<'_>);

/// Stored as a raw pointer; `null` means "discard".
static BACKEND: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

/// Register a backend that replaces the discarding default.
pub fn rlog_register_backend(backend: RlogBackend) {
    BACKEND.store(backend as *mut (), Ordering::Release);
}

/// Drop back to the discarding default and the default level.
pub fn rlog_reset() {
    BACKEND.store(ptr::null_mut(), Ordering::Release);
    CURRENT_LEVEL.store(RlogLevel::Info as u8, Ordering::Relaxed);
}

pub fn rlog_set_level(level: RlogLevel) {
    CURRENT_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn rlog_get_level() -> RlogLevel {
    RlogLevel::from_raw(CURRENT_LEVEL.load(Ordering::Relaxed))
}

pub fn rlog_is_enabled(level: RlogLevel) -> bool {
    is_enabled(level)
}

/// Emit a formatted log line at the given level.
///
/// The backend appends the line terminator — callers should **not**
/// include one in their format string.
pub fn log_args(level: RlogLevel, args: fmt::Arguments<'_>) {
    if !is_enabled(level) {
        return;
    }
    let ptr = BACKEND.load(Ordering::Acquire);
    if ptr.is_null() {
        return;
    }
    // SAFETY: `rlog_register_backend` only stores valid `RlogBackend` fn
    // pointers, which have the same representation as `*mut ()` on
    // supported targets.
    let backend: RlogBackend = unsafe { core::mem::transmute(ptr) };
    backend(level, args);
}

// ---------------------------------------------------------------------------
// Macros
// ---------------------------------------------------------------------------

#[macro_export]
macro_rules! rlog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::rlog::log_args($level, ::core::format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! rlog_error {
    ($($arg:tt)*) => {
        $crate::rlog::log_args($crate::rlog::RlogLevel::Error, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! rlog_warn {
    ($($arg:tt)*) => {
        $crate::rlog::log_args($crate::rlog::RlogLevel::Warn, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! rlog_info {
    ($($arg:tt)*) => {
        $crate::rlog::log_args($crate::rlog::RlogLevel::Info, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! rlog_debug {
    ($($arg:tt)*) => {
        $crate::rlog::log_args($crate::rlog::RlogLevel::Debug, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! rlog_trace {
    ($($arg:tt)*) => {
        $crate::rlog::log_args($crate::rlog::RlogLevel::Trace, ::core::format_args!($($arg)*))
    };
}
