//! Ready-set tests: the two-level bitmap and highest-priority selection.

use crate::ready::ReadySet;

#[test]
fn empty_set_has_no_highest() {
    let r = ReadySet::new();
    assert!(r.is_empty());
    assert_eq!(r.highest(), None);
}

#[test]
fn highest_prefers_larger_priorities() {
    let mut r = ReadySet::new();
    r.mark(3);
    assert_eq!(r.highest(), Some(3));
    r.mark(17);
    assert_eq!(r.highest(), Some(17));
    r.mark(63);
    assert_eq!(r.highest(), Some(63));
    r.clear(63);
    assert_eq!(r.highest(), Some(17));
    r.clear(17);
    assert_eq!(r.highest(), Some(3));
}

#[test]
fn group_boundaries_are_exact() {
    let mut r = ReadySet::new();
    // 7 and 8 straddle the first detail-byte boundary.
    r.mark(7);
    r.mark(8);
    assert_eq!(r.highest(), Some(8));
    r.clear(8);
    assert_eq!(r.highest(), Some(7));
}

#[test]
fn clear_is_idempotent_and_isolated() {
    let mut r = ReadySet::new();
    r.mark(10);
    r.mark(12);
    r.clear(11);
    assert!(r.is_ready(10));
    assert!(r.is_ready(12));
    r.clear(12);
    r.clear(12);
    assert!(r.is_ready(10));
    assert_eq!(r.highest(), Some(10));
}

#[test]
fn mark_is_idempotent() {
    let mut r = ReadySet::new();
    r.mark(5);
    r.mark(5);
    assert_eq!(r.highest(), Some(5));
    r.clear(5);
    assert!(r.is_empty());
}

#[test]
fn reset_clears_everything() {
    let mut r = ReadySet::new();
    for p in 1..=63 {
        r.mark(p);
    }
    assert_eq!(r.highest(), Some(63));
    r.reset();
    assert!(r.is_empty());
    assert_eq!(r.highest(), None);
}
