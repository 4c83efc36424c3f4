//! Compile-time framework limits.
//!
//! Everything here is a build-time decision; the framework has no runtime
//! configuration surface.  Ports that need different limits edit (or
//! feature-gate) these constants.

/// Event signal identifier.
///
/// The alias is the configuration point for the signal width: 8-, 16- or
/// 32-bit signal spaces are all valid choices for the framework, `u16` is
/// the default.
pub type Signal = u16;

/// Maximum state-nesting depth of any state machine (root counts as one
/// level).  Exit/entry chains longer than this abort the transition.
pub const MAX_NEST_DEPTH: usize = 8;

/// Maximum number of pseudostate segments (choice/junction/history hops) a
/// single compound transition may traverse.
pub const MAX_TRANS_SEGS: usize = 8;

/// Highest usable active-object priority.  Valid priorities are
/// `1..=MAX_PRIORITY`; larger values are more urgent.  The ready-set
/// bitmap is sized for 64 slots, with slot 0 unused.
pub const MAX_PRIORITY: u8 = 63;

/// Maximum number of registered event pools.
pub const MAX_POOLS: usize = 4;

/// History slots available per state machine instance.  Each history
/// pseudostate in a machine's topology claims one slot index.
pub const MAX_HISTORY_SLOTS: usize = 8;

/// Signals below this bound are publishable through the subscription
/// table; higher signals are point-to-point only.
pub const MAX_PUB_SIGNAL: usize = 64;

/// Signals below this bound are individually filterable in the trace
/// subsystem; higher signals always pass the signal filter.
pub const TRACE_SIGNAL_SLOTS: usize = 256;
