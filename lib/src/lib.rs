#![cfg_attr(not(test), no_std)]

pub mod cell;
pub mod crit;
pub mod rlog;

pub use cell::CritCell;
pub use crit::{
    CritEnterFn, CritExitFn, CritGuard, crit_depth, crit_is_active, crit_register, crit_reset,
};
pub use rlog::{
    RlogLevel, rlog_get_level, rlog_is_enabled, rlog_register_backend, rlog_reset, rlog_set_level,
};

/// Serializes tests that touch the crate's global state (critical-section
/// depth, log backend).
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
