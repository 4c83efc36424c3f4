//! State descriptors.
//!
//! A state machine's topology is immutable data: a tree of [`State`]
//! descriptors linked by `parent` references and rooted at a state whose
//! parent is `None`.  Transition targets may point anywhere in the tree,
//! so the reference graph is cyclic — which is fine, the descriptors live
//! in `static`s for the program lifetime.
//!
//! Each descriptor kind gets a dedicated handler in the dispatch engine;
//! the tagged [`StateKind`] is the closed set of variants, no open
//! polymorphism.  All per-machine mutable state (current state, history
//! slots, the application context) lives in
//! [`StateMachine`](super::machine::StateMachine).

use crate::config::Signal;
use crate::event::Event;

/// Entry and exit actions run without a triggering event.
pub type EntryFn<C> = fn(&mut C);
/// Initial-transition actions run during default descent into a composite.
pub type InitFn<C> = fn(&mut C);
/// Transition and branch actions see the triggering event.
pub type ActionFn<C> = fn(&mut C, &Event);
/// Guards are pure predicates over the context and the triggering event.
pub type GuardFn<C> = fn(&C, &Event) -> bool;

/// One state in the topology.
pub struct State<C: 'static> {
    pub name: &'static str,
    pub parent: Option<&'static State<C>>,
    pub kind: StateKind<C>,
}

/// The closed set of state variants.
pub enum StateKind<C: 'static> {
    Basic(BasicState<C>),
    Composite(CompositeState<C>),
    Choice(ChoiceState<C>),
    Junction(JunctionState<C>),
    ShallowHistory(HistoryState),
    DeepHistory(HistoryState),
    Final,
}

/// Entry/exit actions plus the trigger table.
pub struct BasicState<C: 'static> {
    pub entry: Option<EntryFn<C>>,
    pub exit: Option<EntryFn<C>>,
    pub transitions: &'static [Transition<C>],
}

/// A basic state that contains substates.
///
/// `default_substate` must be a basic or composite state (not a
/// pseudostate); `initial` is the optional action of the default initial
/// transition.  `shallow_slot`/`deep_slot` name the history slots of any
/// history pseudostates parented here, so exits can record the leaving
/// configuration.
pub struct CompositeState<C: 'static> {
    pub base: BasicState<C>,
    pub initial: Option<InitFn<C>>,
    pub default_substate: &'static State<C>,
    pub shallow_slot: Option<u8>,
    pub deep_slot: Option<u8>,
}

/// Guarded branch table with an optional else-branch.
pub struct ChoiceState<C: 'static> {
    pub branches: &'static [Branch<C>],
    pub default_branch: Option<Branch<C>>,
}

/// One branch of a choice pseudostate.  A `None` guard is always taken.
pub struct Branch<C: 'static> {
    pub guard: Option<GuardFn<C>>,
    pub action: Option<ActionFn<C>>,
    pub target: &'static State<C>,
}

/// Unconditional connector.
pub struct JunctionState<C: 'static> {
    pub action: Option<ActionFn<C>>,
    pub target: &'static State<C>,
}

/// Shallow or deep history marker; `slot` indexes the machine's history
/// store.  The pseudostate's `parent` is the composite it remembers.
pub struct HistoryState {
    pub slot: u8,
}

/// One row of a trigger table.
pub struct Transition<C: 'static> {
    pub signal: Signal,
    pub guard: Option<GuardFn<C>>,
    pub action: Option<ActionFn<C>>,
    pub target: TransitionTarget<C>,
}

/// Where a transition goes.  `Internal` runs the action without any
/// exit/entry processing.
pub enum TransitionTarget<C: 'static> {
    Internal,
    To(&'static State<C>),
}

impl<C: 'static> State<C> {
    /// The trigger table of a basic or composite state; pseudostates have
    /// none.
    pub(crate) fn transitions(&self) -> Option<&'static [Transition<C>]> {
        match &self.kind {
            StateKind::Basic(b) => Some(b.transitions),
            StateKind::Composite(c) => Some(c.base.transitions),
            _ => None,
        }
    }

    pub(crate) fn entry_action(&self) -> Option<EntryFn<C>> {
        match &self.kind {
            StateKind::Basic(b) => b.entry,
            StateKind::Composite(c) => c.base.entry,
            _ => None,
        }
    }

    pub(crate) fn exit_action(&self) -> Option<EntryFn<C>> {
        match &self.kind {
            StateKind::Basic(b) => b.exit,
            StateKind::Composite(c) => c.base.exit,
            _ => None,
        }
    }

    pub(crate) fn as_composite(&self) -> Option<&CompositeState<C>> {
        match &self.kind {
            StateKind::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Whether this state can be the machine's current state.
    pub(crate) fn is_vertex(&self) -> bool {
        matches!(
            self.kind,
            StateKind::Basic(_) | StateKind::Composite(_) | StateKind::Final
        )
    }

    /// Nesting depth: the root is 1.
    pub(crate) fn depth(&self) -> usize {
        let mut depth = 1;
        let mut node = self;
        while let Some(parent) = node.parent {
            depth += 1;
            node = parent;
        }
        depth
    }

}

/// Least common ancestor of two states, or `None` when only the null
/// sentinel above the root is shared (which cannot happen for states of
/// one well-formed tree, but the engine treats it as "exit everything").
pub(crate) fn lca<C: 'static>(
    a: &'static State<C>,
    b: &'static State<C>,
) -> Option<&'static State<C>> {
    let mut a_depth = a.depth();
    let mut b_depth = b.depth();
    let mut a_node = Some(a);
    let mut b_node = Some(b);
    while a_depth > b_depth {
        a_node = a_node.and_then(|s| s.parent);
        a_depth -= 1;
    }
    while b_depth > a_depth {
        b_node = b_node.and_then(|s| s.parent);
        b_depth -= 1;
    }
    while let (Some(x), Some(y)) = (a_node, b_node) {
        if core::ptr::eq(x, y) {
            return Some(x);
        }
        a_node = x.parent;
        b_node = y.parent;
    }
    None
}
