/// catalog.rs – Today's completed trades and the daily target, refreshed
/// wholesale from the backend through the request throttle.
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::TradeSource;
use crate::models::{DailyTrades, Trade};
use crate::throttle::{RequestThrottle, DAILY_TRADES_KEY};

/// What a refresh attempt ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Request sent; the result is applied when it arrives.
    Dispatched,
    /// Catalog replaced with this many valid trades.
    Replaced(usize),
    /// Throttle denied the dispatch; no request made.
    Throttled,
    /// No credential configured; no request made.
    NoCredential,
    /// Request failed; previous catalog retained.
    Failed(String),
    /// The engine was stopped while the request was in flight; result dropped.
    Discarded,
}

#[derive(Debug, Clone, Default)]
pub struct TradeCatalog {
    trades: Vec<Trade>,
    daily_target: f64,
    last_refreshed: Option<DateTime<Utc>>,
}

impl TradeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn daily_target(&self) -> f64 {
        self.daily_target
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }

    /// Sum of final P/L over trades that have already occurred.
    pub fn daily_pl(&self, now: DateTime<Utc>) -> f64 {
        self.trades
            .iter()
            .filter(|t| t.has_occurred(now))
            .map(|t| t.final_pl)
            .sum()
    }

    /// Replace the held list and target wholesale. Invalid and duplicate
    /// trades are dropped. Returns the number of trades kept.
    pub fn replace(&mut self, daily: DailyTrades, now: DateTime<Utc>) -> usize {
        let mut seen = HashSet::new();
        let received = daily.trades.len();
        let trades: Vec<Trade> = daily
            .trades
            .into_iter()
            .filter(|t| {
                if !t.is_valid() {
                    warn!(
                        "Dropping trade '{}' ({}): duration={} pl={}",
                        t.id, t.symbol, t.duration, t.final_pl
                    );
                    return false;
                }
                seen.insert(t.id.clone())
            })
            .collect();

        if trades.len() < received {
            debug!("Kept {}/{} trades from refresh", trades.len(), received);
        }

        self.trades = trades;
        self.daily_target = if daily.daily_target_amount.is_finite() {
            daily.daily_target_amount
        } else {
            0.0
        };
        self.last_refreshed = Some(now);
        self.trades.len()
    }

    /// Apply the result of a daily-trades fetch. A failure keeps the previous
    /// list; a result that lands after shutdown is dropped untouched.
    pub fn apply(
        &mut self,
        result: Result<DailyTrades>,
        now: DateTime<Utc>,
        stopped: bool,
    ) -> RefreshOutcome {
        if stopped {
            debug!("Discarding daily-trades response received after shutdown");
            return RefreshOutcome::Discarded;
        }
        match result {
            Ok(daily) => {
                let kept = self.replace(daily, now);
                info!(
                    "Trade catalog refreshed: {kept} trade(s), target {:.2}",
                    self.daily_target
                );
                RefreshOutcome::Replaced(kept)
            }
            Err(e) => {
                warn!("Daily-trades refresh failed, keeping {} trade(s): {e:#}", self.len());
                RefreshOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Decide whether a daily-trades request may go out now. The credential is
/// checked first so a missing token never consumes a throttle slot.
pub fn refresh_gate<S: TradeSource>(
    source: &S,
    throttle: &RequestThrottle,
    min_interval: Duration,
    now: DateTime<Utc>,
) -> RefreshOutcome {
    if !source.has_credentials() {
        return RefreshOutcome::NoCredential;
    }
    if !throttle.attempt_at(DAILY_TRADES_KEY, min_interval, now) {
        return RefreshOutcome::Throttled;
    }
    RefreshOutcome::Dispatched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, LiveActivity, TradeStatus};
    use anyhow::anyhow;
    use chrono::Duration as ChronoDuration;

    fn trade(id: &str, pl: f64, duration: u64, at: DateTime<Utc>) -> Trade {
        Trade {
            id: id.into(),
            timestamp: at,
            symbol: "EUR/USD".into(),
            direction: Direction::Long,
            final_pl: pl,
            position_size: None,
            duration: duration as f64,
            status: TradeStatus::Completed,
        }
    }

    fn daily(trades: Vec<Trade>, target: f64) -> DailyTrades {
        DailyTrades {
            trades,
            daily_target_amount: target,
        }
    }

    #[derive(Clone)]
    struct Token(bool);

    impl TradeSource for Token {
        fn has_credentials(&self) -> bool {
            self.0
        }

        async fn fetch_daily_trades(&self) -> Result<DailyTrades> {
            Err(anyhow!("not used"))
        }

        async fn fetch_live_activity(&self) -> Result<LiveActivity> {
            Err(anyhow!("not used"))
        }
    }

    #[test]
    fn replace_drops_invalid_and_duplicate_trades() {
        let now = Utc::now();
        let mut catalog = TradeCatalog::new();
        let mut negative = trade("d", 4.0, 10, now);
        negative.duration = -5.0;
        let kept = catalog.replace(
            daily(
                vec![
                    trade("a", 1.0, 10, now),
                    trade("b", 2.0, 0, now),
                    trade("a", 3.0, 10, now),
                    trade("c", f64::NAN, 10, now),
                    negative,
                ],
                50.0,
            ),
            now,
        );
        assert_eq!(kept, 1);
        assert_eq!(catalog.trades()[0].final_pl, 1.0);
        assert_eq!(catalog.daily_target(), 50.0);
        assert_eq!(catalog.last_refreshed(), Some(now));
    }

    #[test]
    fn replace_is_wholesale() {
        let now = Utc::now();
        let mut catalog = TradeCatalog::new();
        catalog.replace(
            daily(vec![trade("a", 1.0, 10, now), trade("b", 1.0, 10, now)], 10.0),
            now,
        );
        catalog.replace(daily(vec![trade("z", 1.0, 10, now)], 20.0), now);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.trades()[0].id, "z");
        assert_eq!(catalog.daily_target(), 20.0);
    }

    #[test]
    fn daily_pl_counts_only_occurred_trades() {
        let now = Utc::now();
        let mut catalog = TradeCatalog::new();
        catalog.replace(
            daily(
                vec![
                    trade("past", 2.5, 10, now - ChronoDuration::minutes(5)),
                    trade("loss", -1.0, 10, now - ChronoDuration::minutes(1)),
                    trade("future", 100.0, 10, now + ChronoDuration::minutes(5)),
                ],
                0.0,
            ),
            now,
        );
        assert!((catalog.daily_pl(now) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn failed_result_keeps_previous_list() {
        let now = Utc::now();
        let mut catalog = TradeCatalog::new();
        catalog.replace(daily(vec![trade("a", 1.0, 10, now)], 5.0), now);

        let outcome = catalog.apply(Err(anyhow!("timeout")), now, false);
        assert!(matches!(outcome, RefreshOutcome::Failed(_)));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.daily_target(), 5.0);
    }

    #[test]
    fn result_after_shutdown_is_discarded() {
        let now = Utc::now();
        let mut catalog = TradeCatalog::new();
        let outcome = catalog.apply(Ok(daily(vec![trade("a", 1.0, 10, now)], 5.0)), now, true);
        assert_eq!(outcome, RefreshOutcome::Discarded);
        assert!(catalog.is_empty());
        assert_eq!(catalog.last_refreshed(), None);
    }

    #[test]
    fn gate_checks_credential_before_throttle() {
        let throttle = RequestThrottle::new();
        let now = Utc::now();
        let floor = Duration::from_secs(15);

        assert_eq!(
            refresh_gate(&Token(false), &throttle, floor, now),
            RefreshOutcome::NoCredential
        );
        assert_eq!(throttle.last_dispatch(DAILY_TRADES_KEY), None);

        assert_eq!(
            refresh_gate(&Token(true), &throttle, floor, now),
            RefreshOutcome::Dispatched
        );
        assert_eq!(
            refresh_gate(&Token(true), &throttle, floor, now + ChronoDuration::seconds(5)),
            RefreshOutcome::Throttled
        );
    }
}
