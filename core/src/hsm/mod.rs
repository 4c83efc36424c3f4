//! Hierarchical state machines: immutable topology descriptors plus the
//! run-to-completion dispatch engine.

pub mod machine;
pub mod state;

pub use machine::{Dispatch, StateMachine, StepInfo};
pub use state::{
    ActionFn, BasicState, Branch, ChoiceState, CompositeState, EntryFn, GuardFn, HistoryState,
    InitFn, JunctionState, State, StateKind, Transition, TransitionTarget,
};
