//! The run-to-completion dispatch engine.
//!
//! [`StateMachine`] holds everything mutable about one machine instance:
//! the current state, the history store, and the application context the
//! actions and guards operate on.  One call to [`dispatch`] is one RTC
//! step: trigger search up the parent chain, pseudostate resolution, exit
//! chain, transition actions, entry chain, initial descent, commit.
//!
//! Execution order within a step is fixed and observable: exits run
//! innermost-first, collected segment actions run in resolution order,
//! entries run outermost-first, then the default descent into a composite
//! main target.  Both chains are computed and bounds-checked before any
//! effect runs, so the depth/segment error outcomes leave the machine
//! untouched unless the violation occurs during descent.

use core::ptr;

use crate::config::{MAX_HISTORY_SLOTS, MAX_NEST_DEPTH, MAX_TRANS_SEGS};
use crate::event::Event;
use crate::hsm::state::{
    ActionFn, Branch, InitFn, State, StateKind, Transition, TransitionTarget, lca,
};

/// Outcome of one RTC step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The top-level initial transition completed.
    Initialized,
    /// An enabled transition (or internal action) ran to completion.
    Processed,
    /// No transition matched the signal anywhere up to the root.
    NotFound,
    /// Signal matches existed but every guard rejected the event.
    GuardFalse,
    /// A choice pseudostate had no true branch and no default.
    CndNotFound,
    /// The machine has no dispatchable current state (not initialized,
    /// double-initialized, or already completed), or the topology is
    /// malformed.
    UnknownState,
    /// An exit/entry chain exceeded [`MAX_NEST_DEPTH`].
    ExceededDepth,
    /// Pseudostate resolution exceeded [`MAX_TRANS_SEGS`] segments.
    ExceededSegments,
}

impl Dispatch {
    /// Whether the outcome represents an application-model bug rather
    /// than normal processing.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Dispatch::CndNotFound
                | Dispatch::UnknownState
                | Dispatch::ExceededDepth
                | Dispatch::ExceededSegments
        )
    }
}

/// What one step did, for observation hooks and invariant checks.
#[derive(Clone, Copy, Debug, Default)]
pub struct StepInfo {
    pub source: Option<&'static str>,
    pub target: Option<&'static str>,
    pub exits: u8,
    pub entries: u8,
}

/// A collected segment action: transition/branch actions see the event,
/// initial-transition actions do not.
enum SegAction<C: 'static> {
    Evt(ActionFn<C>),
    Plain(InitFn<C>),
}

impl<C> Clone for SegAction<C> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<C> Copy for SegAction<C> {}

/// One state machine instance.
pub struct StateMachine<C: 'static> {
    root: &'static State<C>,
    current: Option<&'static State<C>>,
    history: [Option<&'static State<C>>; MAX_HISTORY_SLOTS],
    completed: bool,
    ctx: C,
}

impl<C: 'static> StateMachine<C> {
    /// Bind a topology root (a composite state with `parent: None`) to an
    /// application context.  The machine is inert until [`init`] runs.
    ///
    /// [`init`]: Self::init
    pub const fn new(root: &'static State<C>, ctx: C) -> Self {
        Self {
            root,
            current: None,
            history: [None; MAX_HISTORY_SLOTS],
            completed: false,
            ctx,
        }
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    /// Current state; `None` before [`init`](Self::init).
    pub fn current(&self) -> Option<&'static State<C>> {
        self.current
    }

    pub fn current_name(&self) -> Option<&'static str> {
        self.current.map(|s| s.name)
    }

    /// Whether a top-level final state has been reached.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Name of the state stored in a history slot, for diagnostics.
    pub fn history_slot(&self, slot: usize) -> Option<&'static str> {
        self.history.get(slot).copied().flatten().map(|s| s.name)
    }

    /// Run the top-level initial transition: the root's initial action,
    /// then the default chain down to a leaf.
    pub fn init(&mut self) -> Dispatch {
        self.init_with_info().0
    }

    pub(crate) fn init_with_info(&mut self) -> (Dispatch, StepInfo) {
        let mut info = StepInfo::default();
        if self.current.is_some() || self.root.as_composite().is_none() {
            return (Dispatch::UnknownState, info);
        }
        let mut entries = 0u8;
        match self.descend(self.root, &mut entries) {
            Ok(leaf) => {
                self.note_completion(leaf);
                self.current = Some(leaf);
                info.target = Some(leaf.name);
                info.entries = entries;
                (Dispatch::Initialized, info)
            }
            Err(err) => (err, info),
        }
    }

    /// Execute one RTC step for `evt`.
    pub fn dispatch(&mut self, evt: &Event) -> Dispatch {
        self.dispatch_with_info(evt).0
    }

    pub(crate) fn dispatch_with_info(&mut self, evt: &Event) -> (Dispatch, StepInfo) {
        let mut info = StepInfo::default();
        let Some(current) = self.current else {
            return (Dispatch::UnknownState, info);
        };
        if self.completed {
            return (Dispatch::UnknownState, info);
        }

        // Trigger search: innermost state wins; a false guard lets the
        // search continue, first at the same level, then upward.
        let signal = evt.signal();
        let mut saw_guard_false = false;
        let mut found: Option<(&'static State<C>, &'static Transition<C>)> = None;
        let mut cursor = Some(current);
        'search: while let Some(state) = cursor {
            if let Some(table) = state.transitions() {
                for t in table {
                    if t.signal != signal {
                        continue;
                    }
                    match t.guard {
                        Some(g) if !g(&self.ctx, evt) => saw_guard_false = true,
                        _ => {
                            found = Some((state, t));
                            break 'search;
                        }
                    }
                }
            }
            cursor = state.parent;
        }
        let Some((source, trans)) = found else {
            let outcome = if saw_guard_false {
                Dispatch::GuardFalse
            } else {
                Dispatch::NotFound
            };
            return (outcome, info);
        };
        info.source = Some(source.name);

        // Internal transitions: action only, no exit/entry.
        let direct_target = match &trans.target {
            TransitionTarget::Internal => {
                if let Some(action) = trans.action {
                    action(&mut self.ctx, evt);
                }
                return (Dispatch::Processed, info);
            }
            TransitionTarget::To(t) => *t,
        };

        // Pseudostate resolution: follow segments until a real state,
        // collecting segment actions in order.
        let mut actions: [Option<SegAction<C>>; MAX_TRANS_SEGS + 1] = [None; MAX_TRANS_SEGS + 1];
        let mut n_actions = 0;
        if let Some(action) = trans.action {
            actions[n_actions] = Some(SegAction::Evt(action));
            n_actions += 1;
        }
        let mut target = direct_target;
        let mut segs = 0;
        let main_target = loop {
            if target.is_vertex() {
                break target;
            }
            segs += 1;
            if segs > MAX_TRANS_SEGS {
                return (Dispatch::ExceededSegments, info);
            }
            match &target.kind {
                StateKind::Choice(choice) => {
                    let mut taken: Option<&Branch<C>> = None;
                    for branch in choice.branches {
                        let pass = match branch.guard {
                            Some(g) => g(&self.ctx, evt),
                            None => true,
                        };
                        if pass {
                            taken = Some(branch);
                            break;
                        }
                    }
                    let Some(branch) = taken.or(choice.default_branch.as_ref()) else {
                        return (Dispatch::CndNotFound, info);
                    };
                    if let Some(action) = branch.action {
                        actions[n_actions] = Some(SegAction::Evt(action));
                        n_actions += 1;
                    }
                    target = branch.target;
                }
                StateKind::Junction(junction) => {
                    if let Some(action) = junction.action {
                        actions[n_actions] = Some(SegAction::Evt(action));
                        n_actions += 1;
                    }
                    target = junction.target;
                }
                StateKind::ShallowHistory(hist) => {
                    let slot = hist.slot as usize;
                    let Some(owner) = target.parent else {
                        return (Dispatch::UnknownState, info);
                    };
                    let Some(composite) = owner.as_composite() else {
                        return (Dispatch::UnknownState, info);
                    };
                    if slot >= MAX_HISTORY_SLOTS {
                        return (Dispatch::UnknownState, info);
                    }
                    match self.history[slot] {
                        Some(stored) => target = stored,
                        None => {
                            // Empty history takes the owner's default
                            // transition, action included.
                            if let Some(init) = composite.initial {
                                actions[n_actions] = Some(SegAction::Plain(init));
                                n_actions += 1;
                            }
                            target = composite.default_substate;
                        }
                    }
                }
                StateKind::DeepHistory(hist) => {
                    let slot = hist.slot as usize;
                    let Some(owner) = target.parent else {
                        return (Dispatch::UnknownState, info);
                    };
                    if owner.as_composite().is_none() || slot >= MAX_HISTORY_SLOTS {
                        return (Dispatch::UnknownState, info);
                    }
                    match self.history[slot] {
                        // The stored leaf is entered directly; no descent.
                        Some(leaf) => target = leaf,
                        // Empty history enters the owner and runs the full
                        // default chain via the initial descent.
                        None => target = owner,
                    }
                }
                StateKind::Basic(_) | StateKind::Composite(_) | StateKind::Final => {
                    unreachable!("vertex states terminate the resolution loop")
                }
            }
        };

        // Exit and entry chains around the least common ancestor, both
        // bounds-checked before any effect runs.
        let ancestor = lca(source, main_target);
        let mut exit_chain: [Option<&'static State<C>>; MAX_NEST_DEPTH] = [None; MAX_NEST_DEPTH];
        let mut n_exits = 0;
        let mut node = Some(current);
        while let Some(state) = node {
            if let Some(a) = ancestor {
                if ptr::eq(state, a) {
                    break;
                }
            }
            if n_exits >= MAX_NEST_DEPTH {
                return (Dispatch::ExceededDepth, info);
            }
            exit_chain[n_exits] = Some(state);
            n_exits += 1;
            node = state.parent;
        }

        let mut entry_chain: [Option<&'static State<C>>; MAX_NEST_DEPTH] = [None; MAX_NEST_DEPTH];
        let mut n_entries = 0;
        let mut node = Some(main_target);
        while let Some(state) = node {
            if let Some(a) = ancestor {
                if ptr::eq(state, a) {
                    break;
                }
            }
            if n_entries >= MAX_NEST_DEPTH {
                return (Dispatch::ExceededDepth, info);
            }
            entry_chain[n_entries] = Some(state);
            n_entries += 1;
            node = state.parent;
        }

        // Exit chain, innermost first.  Exiting a composite that owns
        // history slots records the leaving configuration: the direct
        // child on the exit path for shallow, the exited leaf for deep.
        for i in 0..n_exits {
            let Some(state) = exit_chain[i] else { break };
            if let Some(exit) = state.exit_action() {
                exit(&mut self.ctx);
            }
            if let Some(composite) = state.as_composite() {
                if let Some(slot) = composite.shallow_slot {
                    if (slot as usize) < MAX_HISTORY_SLOTS && i >= 1 {
                        self.history[slot as usize] = exit_chain[i - 1];
                    }
                }
                if let Some(slot) = composite.deep_slot {
                    if (slot as usize) < MAX_HISTORY_SLOTS {
                        self.history[slot as usize] = Some(current);
                    }
                }
            }
        }

        // Segment actions in collected order.
        for action in actions.iter().take(n_actions) {
            match action {
                Some(SegAction::Evt(f)) => f(&mut self.ctx, evt),
                Some(SegAction::Plain(f)) => f(&mut self.ctx),
                None => {}
            }
        }

        // Entry chain, outermost first.
        for i in (0..n_entries).rev() {
            let Some(state) = entry_chain[i] else { continue };
            if let Some(entry) = state.entry_action() {
                entry(&mut self.ctx);
            }
        }

        // Initial descent into a composite main target.
        let mut total_entries = n_entries as u8;
        let final_state = if main_target.as_composite().is_some() {
            match self.descend(main_target, &mut total_entries) {
                Ok(leaf) => leaf,
                Err(err) => return (err, info),
            }
        } else {
            main_target
        };

        self.note_completion(final_state);
        self.current = Some(final_state);
        info.target = Some(final_state.name);
        info.exits = n_exits as u8;
        info.entries = total_entries;
        (Dispatch::Processed, info)
    }

    /// Follow default initial transitions until a leaf, running each
    /// composite's initial action and each entered state's entry action.
    fn descend(
        &mut self,
        from: &'static State<C>,
        entries: &mut u8,
    ) -> Result<&'static State<C>, Dispatch> {
        let mut state = from;
        let mut depth = state.depth();
        while let Some(composite) = state.as_composite() {
            if let Some(init) = composite.initial {
                init(&mut self.ctx);
            }
            let next = composite.default_substate;
            if !next.is_vertex() {
                return Err(Dispatch::UnknownState);
            }
            depth += 1;
            if depth > MAX_NEST_DEPTH {
                return Err(Dispatch::ExceededDepth);
            }
            if let Some(entry) = next.entry_action() {
                entry(&mut self.ctx);
            }
            *entries += 1;
            state = next;
        }
        Ok(state)
    }

    fn note_completion(&mut self, state: &'static State<C>) {
        if let StateKind::Final = state.kind {
            if let Some(parent) = state.parent {
                if ptr::eq(parent, self.root) {
                    self.completed = true;
                }
            }
        }
    }
}
