/// throttle.rs – Per-key request gate shared by every polling loop.
///
/// Each key holds at most one "token": a call is permitted only when at least
/// `min_interval` has passed since the last permitted call on the same key.
/// Denied calls leave the ledger untouched.
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

pub const DAILY_TRADES_KEY: &str = "daily-trades";
pub const LIVE_ACTIVITY_KEY: &str = "live-activity";

/// Cloneable handle to a shared throttle ledger. Clones see the same ledger;
/// independent instances (e.g. one per test) do not.
#[derive(Debug, Clone, Default)]
pub struct RequestThrottle {
    ledger: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl RequestThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to dispatch a request for `key` now.
    pub fn attempt(&self, key: &str, min_interval: Duration) -> bool {
        self.attempt_at(key, min_interval, Utc::now())
    }

    /// Same as [`attempt`](Self::attempt) with an explicit clock reading.
    pub fn attempt_at(&self, key: &str, min_interval: Duration, now: DateTime<Utc>) -> bool {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = ledger.get(key) {
            let elapsed_ms = (now - *last).num_milliseconds();
            if elapsed_ms < 0 || (elapsed_ms as u128) < min_interval.as_millis() {
                debug!("Throttled '{key}' ({elapsed_ms}ms since last dispatch)");
                return false;
            }
        }
        ledger.insert(key.to_string(), now);
        true
    }

    pub fn last_dispatch(&self, key: &str) -> Option<DateTime<Utc>> {
        self.ledger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    const FLOOR: Duration = Duration::from_secs(15);

    #[test]
    fn first_call_is_permitted_and_recorded() {
        let throttle = RequestThrottle::new();
        let now = Utc::now();
        assert!(throttle.attempt_at(DAILY_TRADES_KEY, FLOOR, now));
        assert_eq!(throttle.last_dispatch(DAILY_TRADES_KEY), Some(now));
    }

    #[test]
    fn call_at_exact_floor_is_permitted() {
        let throttle = RequestThrottle::new();
        let t0 = Utc::now();
        assert!(throttle.attempt_at("k", FLOOR, t0));
        let t1 = t0 + ChronoDuration::seconds(15);
        assert!(throttle.attempt_at("k", FLOOR, t1));
        assert_eq!(throttle.last_dispatch("k"), Some(t1));
    }

    #[test]
    fn keys_are_independent() {
        let throttle = RequestThrottle::new();
        let now = Utc::now();
        assert!(throttle.attempt_at(DAILY_TRADES_KEY, FLOOR, now));
        assert!(throttle.attempt_at(LIVE_ACTIVITY_KEY, FLOOR, now));
    }

    #[test]
    fn clones_share_one_ledger() {
        let a = RequestThrottle::new();
        let b = a.clone();
        let now = Utc::now();
        assert!(a.attempt_at("k", FLOOR, now));
        assert!(!b.attempt_at("k", FLOOR, now + ChronoDuration::seconds(1)));
    }

    #[test]
    fn clock_going_backwards_is_denied() {
        let throttle = RequestThrottle::new();
        let now = Utc::now();
        assert!(throttle.attempt_at("k", FLOOR, now));
        assert!(!throttle.attempt_at("k", FLOOR, now - ChronoDuration::seconds(60)));
        assert_eq!(throttle.last_dispatch("k"), Some(now));
    }
}
