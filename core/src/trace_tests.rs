//! Observation-hook tests: backend delivery and the group, priority and
//! signal filters.

use spin::Mutex;

use crate::active::{ActiveObject, Actor};
use crate::config::Signal;
use crate::event::{Event, EventRef};
use crate::hsm::state::{
    BasicState, CompositeState, State, StateKind, Transition, TransitionTarget,
};
use crate::pool::{self, PoolStorage, new_event, recycle};
use crate::sched::{ao_activate, ao_register, framework_step};
use crate::test_support::fixture;
use crate::timer::{self, Timer};
use crate::trace::{
    TraceGroups, TraceRecord, trace_filter_group, trace_filter_prio, trace_filter_signal,
    trace_register_backend,
};

const SIG_PING: Signal = 1;
const SIG_AUX: Signal = 2;
const SIG_WILD: Signal = 400;

static EV_PING: Event = Event::new(SIG_PING);
static EV_AUX: Event = Event::new(SIG_AUX);
static EV_WILD: Event = Event::new(SIG_WILD);

#[derive(Clone, Debug, PartialEq)]
struct Rec {
    tag: &'static str,
    prio: Option<u8>,
    signal: Option<Signal>,
}

static RECORDS: Mutex<Vec<Rec>> = Mutex::new(Vec::new());

fn tag_of(record: &TraceRecord) -> &'static str {
    match record {
        TraceRecord::PoolRegistered { .. } => "pool-registered",
        TraceRecord::EvtAllocated { .. } => "evt-alloc",
        TraceRecord::EvtRecycled { .. } => "evt-recycled",
        TraceRecord::EvtExhausted { .. } => "evt-exhausted",
        TraceRecord::Posted { .. } => "posted",
        TraceRecord::Fetched { .. } => "fetched",
        TraceRecord::AoRegistered { .. } => "ao-registered",
        TraceRecord::AoTerminated { .. } => "ao-terminated",
        TraceRecord::SmInit { .. } => "sm-init",
        TraceRecord::SmDispatch { .. } => "sm-dispatch",
        TraceRecord::TmrStarted { .. } => "tmr-started",
        TraceRecord::TmrStopped { .. } => "tmr-stopped",
        TraceRecord::TmrExpired { .. } => "tmr-expired",
        TraceRecord::FwkInit => "fwk-init",
        TraceRecord::FwkRun => "fwk-run",
        TraceRecord::FwkExit => "fwk-exit",
    }
}

fn collect(record: &TraceRecord) {
    RECORDS.lock().push(Rec {
        tag: tag_of(record),
        prio: record.prio(),
        signal: record.signal(),
    });
}

fn start_collecting() {
    RECORDS.lock().clear();
    trace_register_backend(collect);
}

fn tags() -> Vec<&'static str> {
    RECORDS.lock().iter().map(|r| r.tag).collect()
}

fn has_tag(tag: &str) -> bool {
    RECORDS.lock().iter().any(|r| r.tag == tag)
}

static TR_ROOT: State<u32> = State {
    name: "tr_root",
    parent: None,
    kind: StateKind::Composite(CompositeState {
        base: BasicState {
            entry: None,
            exit: None,
            transitions: &[],
        },
        initial: None,
        default_substate: &TR_RUN,
        shallow_slot: None,
        deep_slot: None,
    }),
};

fn count_any(c: &mut u32, _e: &Event) {
    *c += 1;
}

static TR_RUN: State<u32> = State {
    name: "tr_run",
    parent: Some(&TR_ROOT),
    kind: StateKind::Basic(BasicState {
        entry: None,
        exit: None,
        transitions: &[
            Transition {
                signal: SIG_PING,
                guard: None,
                action: Some(count_any),
                target: TransitionTarget::Internal,
            },
            Transition {
                signal: SIG_AUX,
                guard: None,
                action: Some(count_any),
                target: TransitionTarget::Internal,
            },
            Transition {
                signal: SIG_WILD,
                guard: None,
                action: Some(count_any),
                target: TransitionTarget::Internal,
            },
        ],
    }),
};

#[test]
fn records_reach_the_backend_in_step_order() {
    let _fx = fixture();
    static STORE: PoolStorage<16, 2> = PoolStorage::new();
    static A: ActiveObject<u32, 4> = ActiveObject::new("trace-a", &TR_ROOT, 0);
    start_collecting();

    pool::register(STORE.region()).unwrap();
    let evt = new_event(SIG_PING).unwrap();
    ao_register(&A, 21).unwrap();
    ao_activate(&A);
    A.post_fifo(evt);
    recycle(evt);
    framework_step();

    assert_eq!(
        tags(),
        [
            "pool-registered",
            "evt-alloc",
            "ao-registered",
            "sm-init",
            "posted",
            "evt-recycled",
            "fetched",
            "sm-dispatch",
            "evt-recycled",
        ]
    );

    let posted = RECORDS.lock()[4].clone();
    assert_eq!(posted.prio, Some(21));
    assert_eq!(posted.signal, Some(SIG_PING));
}

#[test]
fn timer_records_cover_start_expiry_stop() {
    let _fx = fixture();
    static A: ActiveObject<u32, 4> = ActiveObject::new("trace-t", &TR_ROOT, 0);
    static T: Timer = Timer::new(SIG_PING);
    static T2: Timer = Timer::new(SIG_AUX);
    ao_register(&A, 17).unwrap();
    ao_activate(&A);
    T.bind(&A);
    T2.bind(&A);
    start_collecting();

    T.start(1, 0);
    T2.start(5, 0);
    timer::tick();
    T2.stop();

    let seen = tags();
    assert_eq!(
        seen,
        ["tmr-started", "tmr-started", "posted", "tmr-expired", "tmr-stopped"]
    );
}

#[test]
fn group_filter_suppresses_only_its_category() {
    let _fx = fixture();
    static STORE: PoolStorage<16, 2> = PoolStorage::new();
    static A: ActiveObject<u32, 4> = ActiveObject::new("trace-g", &TR_ROOT, 0);
    start_collecting();
    trace_filter_group(TraceGroups::QUEUE, false);

    pool::register(STORE.region()).unwrap();
    ao_register(&A, 19).unwrap();
    ao_activate(&A);
    A.post_fifo(EventRef::of(&EV_PING));
    framework_step();

    assert!(!has_tag("posted"));
    assert!(!has_tag("fetched"));
    assert!(has_tag("pool-registered"));
    assert!(has_tag("sm-dispatch"));

    trace_filter_group(TraceGroups::QUEUE, true);
    A.post_fifo(EventRef::of(&EV_PING));
    assert!(has_tag("posted"));
}

#[test]
fn prio_filter_suppresses_one_object() {
    let _fx = fixture();
    static LOUD: ActiveObject<u32, 4> = ActiveObject::new("loud", &TR_ROOT, 0);
    static QUIET: ActiveObject<u32, 4> = ActiveObject::new("quiet", &TR_ROOT, 0);
    ao_register(&LOUD, 31).unwrap();
    ao_register(&QUIET, 32).unwrap();
    ao_activate(&LOUD);
    ao_activate(&QUIET);
    start_collecting();
    trace_filter_prio(32, false);

    QUIET.post_fifo(EventRef::of(&EV_PING));
    LOUD.post_fifo(EventRef::of(&EV_PING));
    while framework_step() {}

    let prios: Vec<Option<u8>> = RECORDS.lock().iter().map(|r| r.prio).collect();
    assert!(prios.contains(&Some(31)));
    assert!(!prios.contains(&Some(32)));
}

#[test]
fn signal_filter_suppresses_one_signal() {
    let _fx = fixture();
    static A: ActiveObject<u32, 8> = ActiveObject::new("trace-s", &TR_ROOT, 0);
    ao_register(&A, 23).unwrap();
    ao_activate(&A);
    start_collecting();
    trace_filter_signal(SIG_AUX, false);

    A.post_fifo(EventRef::of(&EV_AUX));
    A.post_fifo(EventRef::of(&EV_PING));
    while framework_step() {}

    let signals: Vec<Option<Signal>> = RECORDS.lock().iter().map(|r| r.signal).collect();
    assert!(signals.contains(&Some(SIG_PING)));
    assert!(!signals.contains(&Some(SIG_AUX)));
}

#[test]
fn signals_beyond_the_filter_table_always_pass() {
    let _fx = fixture();
    static A: ActiveObject<u32, 4> = ActiveObject::new("trace-w", &TR_ROOT, 0);
    ao_register(&A, 24).unwrap();
    ao_activate(&A);
    start_collecting();
    // Out of table range: the call is a no-op and the record still flows.
    trace_filter_signal(SIG_WILD, false);

    A.post_fifo(EventRef::of(&EV_WILD));
    framework_step();

    let signals: Vec<Option<Signal>> = RECORDS.lock().iter().map(|r| r.signal).collect();
    assert!(signals.contains(&Some(SIG_WILD)));
}
