//! Event queue tests: FIFO/LIFO ordering laws, capacity, high-water
//! tracking.  The queue is pure data — no fixture needed.

use crate::event::Event;
use crate::event::EventRef;
use crate::queue::{EventQueue, QueueFull};

static E1: Event = Event::new(1);
static E2: Event = Event::new(2);
static E3: Event = Event::new(3);

fn e1() -> EventRef {
    EventRef::of(&E1)
}
fn e2() -> EventRef {
    EventRef::of(&E2)
}
fn e3() -> EventRef {
    EventRef::of(&E3)
}

#[test]
fn fifo_round_trip_preserves_order() {
    let mut q: EventQueue<4> = EventQueue::new();
    q.post_fifo(e1()).unwrap();
    q.post_fifo(e2()).unwrap();
    assert_eq!(q.pop().map(|e| e.signal()), Some(1));
    assert_eq!(q.pop().map(|e| e.signal()), Some(2));
    assert!(q.pop().is_none());
}

#[test]
fn lifo_post_precedes_pending_fifo_entries() {
    let mut q: EventQueue<4> = EventQueue::new();
    q.post_fifo(e1()).unwrap();
    q.post_lifo(e2()).unwrap();
    assert_eq!(q.pop().map(|e| e.signal()), Some(2));
    assert_eq!(q.pop().map(|e| e.signal()), Some(1));
}

#[test]
fn mixed_posts_interleave_correctly() {
    let mut q: EventQueue<4> = EventQueue::new();
    q.post_fifo(e1()).unwrap();
    q.post_fifo(e2()).unwrap();
    q.post_lifo(e3()).unwrap();
    let order: Vec<u16> = core::iter::from_fn(|| q.pop().map(|e| e.signal())).collect();
    assert_eq!(order, [3, 1, 2]);
}

#[test]
fn overflow_reports_full() {
    let mut q: EventQueue<2> = EventQueue::new();
    q.post_fifo(e1()).unwrap();
    q.post_fifo(e2()).unwrap();
    assert!(q.is_full());
    assert_eq!(q.post_fifo(e3()), Err(QueueFull));
    assert_eq!(q.post_lifo(e3()), Err(QueueFull));
    assert_eq!(q.len(), 2);
}

#[test]
fn wraparound_keeps_ordering() {
    let mut q: EventQueue<2> = EventQueue::new();
    for _ in 0..5 {
        q.post_fifo(e1()).unwrap();
        q.post_fifo(e2()).unwrap();
        assert_eq!(q.pop().map(|e| e.signal()), Some(1));
        assert_eq!(q.pop().map(|e| e.signal()), Some(2));
    }
    assert!(q.is_empty());
}

#[test]
fn high_water_tracks_peak_depth() {
    let mut q: EventQueue<4> = EventQueue::new();
    assert_eq!(q.high_water(), 0);
    q.post_fifo(e1()).unwrap();
    q.post_fifo(e2()).unwrap();
    assert_eq!(q.high_water(), 2);
    q.pop();
    q.pop();
    assert_eq!(q.high_water(), 2);
    q.post_lifo(e3()).unwrap();
    assert_eq!(q.high_water(), 2);
}

#[test]
fn drain_empties_front_to_back() {
    let mut q: EventQueue<4> = EventQueue::new();
    q.post_fifo(e1()).unwrap();
    q.post_fifo(e2()).unwrap();
    q.post_lifo(e3()).unwrap();
    let mut seen = Vec::new();
    q.drain(|e| seen.push(e.signal()));
    assert_eq!(seen, [3, 1, 2]);
    assert!(q.is_empty());
    assert_eq!(q.high_water(), 3);
}

#[test]
fn same_event_can_occupy_multiple_slots() {
    let mut q: EventQueue<4> = EventQueue::new();
    q.post_fifo(e1()).unwrap();
    q.post_fifo(e1()).unwrap();
    let first = q.pop().unwrap();
    let second = q.pop().unwrap();
    assert!(first.same_event(&second));
}
