//! Host demo: a stopwatch active object.
//!
//! One active object runs a small hierarchical machine —
//!
//! ```text
//!   root ── stopped
//!        ├─ running ── counting
//!        │          ├─ lapped
//!        │          └─ H (shallow)
//!        └─ done (final)
//! ```
//!
//! A periodic timer posts TICK; START/STOP/LAP are injected by the
//! script below.  STOP leaves `running` and the shallow history brings
//! the next START back into whichever substate was active.  After enough
//! ticks the machine moves to the top-level final state, the scheduler
//! terminates the object, and `framework_run` returns.
//!
//! Time is simulated: the idle hook advances the timer tick, so the demo
//! runs in milliseconds of wall clock.

use std::fmt;
use std::io::Write as _;

use reflex_core::hsm::state::{
    BasicState, CompositeState, HistoryState, State, StateKind, Transition, TransitionTarget,
};
use reflex_core::{
    ActiveObject, Actor, Event, EventRef, Signal, Timer, TraceRecord, ao_activate, ao_register,
    framework_init, framework_run, set_on_idle, trace_register_backend,
};
use reflex_lib::rlog::{RlogLevel, rlog_register_backend, rlog_set_level};
use reflex_lib::rlog_info;
use spin::Mutex;

const SIG_TICK: Signal = 1;
const SIG_START: Signal = 2;
const SIG_STOP: Signal = 3;
const SIG_LAP: Signal = 4;

static EV_START: Event = Event::new(SIG_START);
static EV_STOP: Event = Event::new(SIG_STOP);
static EV_LAP: Event = Event::new(SIG_LAP);

/// How many ticks the stopwatch accumulates before finishing.
const RUN_TICKS: u32 = 25;

// ---------------------------------------------------------------------------
// Stopwatch context and actions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Stopwatch {
    ticks: u32,
    laps: u32,
}

fn on_tick(sw: &mut Stopwatch, _e: &Event) {
    sw.ticks += 1;
    if sw.ticks >= RUN_TICKS {
        // Enough counting: ask ourselves to finish.  The event is
        // serviced after this RTC step completes.
        STOPWATCH.post_fifo(EventRef::of(&EV_STOP));
    }
}

fn on_lap(sw: &mut Stopwatch, _e: &Event) {
    sw.laps += 1;
}

fn finished(sw: &Stopwatch, _e: &Event) -> bool {
    sw.ticks >= RUN_TICKS
}

fn en_running(sw: &mut Stopwatch) {
    rlog_info!("stopwatch: running at {} ticks", sw.ticks);
}

fn ex_running(sw: &mut Stopwatch) {
    rlog_info!("stopwatch: paused at {} ticks", sw.ticks);
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

static ROOT: State<Stopwatch> = State {
    name: "root",
    parent: None,
    kind: StateKind::Composite(CompositeState {
        base: BasicState {
            entry: None,
            exit: None,
            transitions: &[],
        },
        initial: None,
        default_substate: &STOPPED,
        shallow_slot: None,
        deep_slot: None,
    }),
};

static STOPPED: State<Stopwatch> = State {
    name: "stopped",
    parent: Some(&ROOT),
    kind: StateKind::Basic(BasicState {
        entry: None,
        exit: None,
        transitions: &[
            // A finished stopwatch ignores START and completes instead.
            Transition {
                signal: SIG_START,
                guard: Some(finished),
                action: None,
                target: TransitionTarget::To(&DONE),
            },
            Transition {
                signal: SIG_START,
                guard: None,
                action: None,
                target: TransitionTarget::To(&HISTORY),
            },
            // The tick that arrives after the final stop completes the
            // machine and lets the scheduler wind the demo down.
            Transition {
                signal: SIG_TICK,
                guard: Some(finished),
                action: None,
                target: TransitionTarget::To(&DONE),
            },
        ],
    }),
};

static RUNNING: State<Stopwatch> = State {
    name: "running",
    parent: Some(&ROOT),
    kind: StateKind::Composite(CompositeState {
        base: BasicState {
            entry: Some(en_running),
            exit: Some(ex_running),
            transitions: &[
                Transition {
                    signal: SIG_TICK,
                    guard: None,
                    action: Some(on_tick),
                    target: TransitionTarget::Internal,
                },
                Transition {
                    signal: SIG_STOP,
                    guard: None,
                    action: None,
                    target: TransitionTarget::To(&STOPPED),
                },
            ],
        },
        initial: None,
        default_substate: &COUNTING,
        shallow_slot: Some(0),
        deep_slot: None,
    }),
};

static COUNTING: State<Stopwatch> = State {
    name: "counting",
    parent: Some(&RUNNING),
    kind: StateKind::Basic(BasicState {
        entry: None,
        exit: None,
        transitions: &[Transition {
            signal: SIG_LAP,
            guard: None,
            action: Some(on_lap),
            target: TransitionTarget::To(&LAPPED),
        }],
    }),
};

static LAPPED: State<Stopwatch> = State {
    name: "lapped",
    parent: Some(&RUNNING),
    kind: StateKind::Basic(BasicState {
        entry: None,
        exit: None,
        transitions: &[Transition {
            signal: SIG_LAP,
            guard: None,
            action: None,
            target: TransitionTarget::To(&COUNTING),
        }],
    }),
};

static HISTORY: State<Stopwatch> = State {
    name: "h(running)",
    parent: Some(&RUNNING),
    kind: StateKind::ShallowHistory(HistoryState { slot: 0 }),
};

static DONE: State<Stopwatch> = State {
    name: "done",
    parent: Some(&ROOT),
    kind: StateKind::Final,
};

static STOPWATCH: ActiveObject<Stopwatch, 8> = ActiveObject::new("stopwatch", &ROOT, Stopwatch {
    ticks: 0,
    laps: 0,
});

static TICK_TIMER: Timer = Timer::new(SIG_TICK);

// ---------------------------------------------------------------------------
// Host integration: log backend, trace backend, idle hook
// ---------------------------------------------------------------------------

fn stderr_log(level: RlogLevel, args: fmt::Arguments<'_>) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "[{level:?}] {args}");
}

/// Dispatch records collected for the post-run report.
static DISPATCHES: Mutex<Vec<String>> = Mutex::new(Vec::new());

fn trace_sink(record: &TraceRecord) {
    if let TraceRecord::SmDispatch {
        signal,
        source,
        target,
        outcome,
        ..
    } = *record
    {
        DISPATCHES.lock().push(format!(
            "sig {:>2}  {} -> {}  ({:?})",
            signal,
            source.unwrap_or("-"),
            target.unwrap_or("-"),
            outcome
        ));
    }
}

/// Idle = nothing queued: advance simulated time and inject the script.
fn idle_advance_time() {
    reflex_core::tick();
    std::thread::sleep(std::time::Duration::from_millis(1));
}

fn main() {
    rlog_register_backend(stderr_log);
    rlog_set_level(RlogLevel::Info);
    trace_register_backend(trace_sink);
    set_on_idle(idle_advance_time);

    framework_init();
    ao_register(&STOPWATCH, 1).expect("register stopwatch");
    ao_activate(&STOPWATCH);

    TICK_TIMER.bind(&STOPWATCH);
    TICK_TIMER.start(1, 1);

    // Script: start counting, lap twice, pause, resume via history.
    STOPWATCH.post_fifo(EventRef::of(&EV_START));
    STOPWATCH.post_fifo(EventRef::of(&EV_LAP));
    STOPWATCH.post_fifo(EventRef::of(&EV_LAP));
    STOPWATCH.post_fifo(EventRef::of(&EV_STOP));
    STOPWATCH.post_fifo(EventRef::of(&EV_START));

    framework_run();

    let (ticks, laps) = STOPWATCH.inspect_context(|sw| (sw.ticks, sw.laps));
    println!("stopwatch finished: {ticks} ticks, {laps} laps");
    println!("dispatch log:");
    for line in DISPATCHES.lock().iter() {
        println!("  {line}");
    }
}
