/// Integration tests for the request throttle.
#[path = "../src/throttle.rs"]
mod throttle;

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use throttle::{RequestThrottle, DAILY_TRADES_KEY, LIVE_ACTIVITY_KEY};

const FLOOR: Duration = Duration::from_secs(15);

#[test]
fn second_call_inside_floor_is_denied_and_ledger_unchanged() {
    let throttle = RequestThrottle::new();
    let t0 = Utc::now();
    assert!(throttle.attempt_at(DAILY_TRADES_KEY, FLOOR, t0));
    assert!(!throttle.attempt_at(DAILY_TRADES_KEY, FLOOR, t0 + ChronoDuration::seconds(5)));
    assert_eq!(throttle.last_dispatch(DAILY_TRADES_KEY), Some(t0));
}

#[test]
fn repeated_denials_do_not_push_the_window() {
    let throttle = RequestThrottle::new();
    let t0 = Utc::now();
    assert!(throttle.attempt_at(DAILY_TRADES_KEY, FLOOR, t0));
    for s in 1..15 {
        assert!(!throttle.attempt_at(DAILY_TRADES_KEY, FLOOR, t0 + ChronoDuration::seconds(s)));
    }
    assert!(throttle.attempt_at(DAILY_TRADES_KEY, FLOOR, t0 + ChronoDuration::seconds(15)));
}

#[test]
fn independent_instances_do_not_share_state() {
    let a = RequestThrottle::new();
    let b = RequestThrottle::new();
    let t0 = Utc::now();
    assert!(a.attempt_at(LIVE_ACTIVITY_KEY, FLOOR, t0));
    assert!(b.attempt_at(LIVE_ACTIVITY_KEY, FLOOR, t0));
    assert_eq!(b.last_dispatch(DAILY_TRADES_KEY), None);
}

#[test]
fn zero_interval_always_permits() {
    let throttle = RequestThrottle::new();
    let t0 = Utc::now();
    assert!(throttle.attempt_at("k", Duration::ZERO, t0));
    assert!(throttle.attempt_at("k", Duration::ZERO, t0));
}

#[test]
fn wall_clock_attempt_records_dispatch() {
    let throttle = RequestThrottle::new();
    assert!(throttle.attempt("wall", FLOOR));
    assert!(!throttle.attempt("wall", FLOOR));
    assert!(throttle.last_dispatch("wall").is_some());
}
