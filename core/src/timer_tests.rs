//! Timer tests: arming, expiry, periodic reload, cancellation, and the
//! insertion-order expiry contract.
//!
//! Expired events are observed in the target's queue directly; the
//! scheduler is not involved.

use crate::active::{ActiveObject, Actor};
use crate::hsm::state::{BasicState, CompositeState, State, StateKind};
use crate::sched::{ao_register, ao_terminate};
use crate::test_support::fixture;
use crate::timer::{self, Timer};

static T_ROOT: State<()> = State {
    name: "t_root",
    parent: None,
    kind: StateKind::Composite(CompositeState {
        base: BasicState {
            entry: None,
            exit: None,
            transitions: &[],
        },
        initial: None,
        default_substate: &T_IDLE,
        shallow_slot: None,
        deep_slot: None,
    }),
};

static T_IDLE: State<()> = State {
    name: "t_idle",
    parent: Some(&T_ROOT),
    kind: StateKind::Basic(BasicState {
        entry: None,
        exit: None,
        transitions: &[],
    }),
};

#[test]
fn one_shot_fires_after_nticks_and_disarms() {
    let _fx = fixture();
    static AO: ActiveObject<(), 4> = ActiveObject::new("tmr-a", &T_ROOT, ());
    static T: Timer = Timer::new(100);
    ao_register(&AO, 5).unwrap();
    T.bind(&AO);

    T.start(3, 0);
    assert!(T.is_armed());
    assert_eq!(T.ticks_left(), 3);

    timer::tick();
    timer::tick();
    assert_eq!(AO.queue_len(), 0);
    assert_eq!(T.ticks_left(), 1);

    timer::tick();
    assert_eq!(AO.queue_len(), 1);
    assert!(!T.is_armed());
    assert_eq!(timer::armed_count(), 0);

    let evt = AO.fetch_event().expect("expiry event");
    assert_eq!(evt.signal(), 100);
    assert_eq!(AO.queue_len(), 0);

    // No further expiries.
    timer::tick();
    assert_eq!(AO.queue_len(), 0);
}

#[test]
fn periodic_timer_reloads_every_period() {
    let _fx = fixture();
    static AO: ActiveObject<(), 8> = ActiveObject::new("tmr-p", &T_ROOT, ());
    static T: Timer = Timer::new(101);
    ao_register(&AO, 5).unwrap();
    T.bind(&AO);

    // First expiry after 2 ticks, then every 3.
    T.start(2, 3);
    let mut expiries = Vec::new();
    for tick_no in 1..=11u32 {
        timer::tick();
        while let Some(evt) = AO.fetch_event() {
            assert_eq!(evt.signal(), 101);
            expiries.push(tick_no);
        }
    }
    assert_eq!(expiries, [2, 5, 8, 11]);
    assert!(T.is_armed());
    T.stop();
}

#[test]
fn stop_is_idempotent() {
    let _fx = fixture();
    static AO: ActiveObject<(), 4> = ActiveObject::new("tmr-s", &T_ROOT, ());
    static T: Timer = Timer::new(102);
    ao_register(&AO, 6).unwrap();
    T.bind(&AO);

    T.start(5, 0);
    assert!(T.stop());
    assert!(!T.stop());
    assert!(!T.stop());
    assert_eq!(timer::armed_count(), 0);

    // A stopped timer never fires.
    for _ in 0..6 {
        timer::tick();
    }
    assert_eq!(AO.queue_len(), 0);
}

#[test]
fn same_tick_expiries_post_in_insertion_order() {
    let _fx = fixture();
    static AO: ActiveObject<(), 8> = ActiveObject::new("tmr-o", &T_ROOT, ());
    static T1: Timer = Timer::new(110);
    static T2: Timer = Timer::new(111);
    static T3: Timer = Timer::new(112);
    ao_register(&AO, 7).unwrap();
    T1.bind(&AO);
    T2.bind(&AO);
    T3.bind(&AO);

    // Same deadline, arming order t2, t1, t3.
    T2.start(2, 0);
    T1.start(2, 0);
    T3.start(2, 0);
    timer::tick();
    timer::tick();

    let order: Vec<u16> =
        core::iter::from_fn(|| AO.fetch_event().map(|e| e.signal())).collect();
    assert_eq!(order, [111, 110, 112]);
}

#[test]
fn restart_while_armed_rewrites_counters_in_place() {
    let _fx = fixture();
    static AO: ActiveObject<(), 4> = ActiveObject::new("tmr-r", &T_ROOT, ());
    static T: Timer = Timer::new(103);
    ao_register(&AO, 8).unwrap();
    T.bind(&AO);

    T.start(10, 0);
    T.start(1, 0);
    assert_eq!(timer::armed_count(), 1);

    timer::tick();
    assert_eq!(AO.queue_len(), 1);
    assert!(!T.is_armed());
}

#[test]
fn expiry_for_a_terminated_target_is_dropped() {
    let _fx = fixture();
    static AO: ActiveObject<(), 4> = ActiveObject::new("tmr-g", &T_ROOT, ());
    static T: Timer = Timer::new(104);
    ao_register(&AO, 9).unwrap();
    T.bind(&AO);

    T.start(1, 0);
    ao_terminate(&AO);
    timer::tick();

    assert_eq!(AO.queue_len(), 0);
    assert!(!T.is_armed());
}

#[test]
fn stopping_a_middle_timer_keeps_the_rest_firing() {
    let _fx = fixture();
    static AO: ActiveObject<(), 8> = ActiveObject::new("tmr-m", &T_ROOT, ());
    static T1: Timer = Timer::new(120);
    static T2: Timer = Timer::new(121);
    static T3: Timer = Timer::new(122);
    ao_register(&AO, 10).unwrap();
    T1.bind(&AO);
    T2.bind(&AO);
    T3.bind(&AO);

    T1.start(2, 0);
    T2.start(2, 0);
    T3.start(2, 0);
    assert!(T2.stop());
    assert_eq!(timer::armed_count(), 2);

    timer::tick();
    timer::tick();
    let order: Vec<u16> =
        core::iter::from_fn(|| AO.fetch_event().map(|e| e.signal())).collect();
    assert_eq!(order, [120, 122]);
}
