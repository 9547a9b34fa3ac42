/// models.rs – Core data types shared across the feed engine modules.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "buy")]
    Long,
    #[serde(alias = "sell")]
    Short,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Completed,
    Open,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl Default for TradeStatus {
    fn default() -> Self {
        TradeStatus::Completed
    }
}

// ---------------------------------------------------------------------------
// Trade (as delivered by the backend)
// ---------------------------------------------------------------------------

/// A completed trade from today's list. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    #[serde(alias = "_id")]
    pub id: String,
    /// When the trade "occurred"; gates backfill eligibility.
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "asset")]
    pub symbol: String,
    #[serde(alias = "type")]
    pub direction: Direction,
    /// Final profit or loss. The simulation converges on this value.
    #[serde(rename = "amount", alias = "profit")]
    pub final_pl: f64,
    /// Notional exposure, when the backend reports one.
    #[serde(default)]
    pub position_size: Option<f64>,
    /// Recorded duration in seconds. Must be > 0; fractional values are kept.
    pub duration: f64,
    #[serde(default)]
    pub status: TradeStatus,
}

impl Trade {
    pub fn duration_ms(&self) -> f64 {
        self.duration * 1000.0
    }

    /// Returns true if this trade satisfies the ingestion invariants.
    pub fn is_valid(&self) -> bool {
        self.duration.is_finite()
            && self.duration > 0.0
            && self.final_pl.is_finite()
            && !self.id.is_empty()
    }

    pub fn has_occurred(&self, now: DateTime<Utc>) -> bool {
        self.timestamp <= now
    }
}

// ---------------------------------------------------------------------------
// Endpoint payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTrades {
    #[serde(default)]
    pub trades: Vec<Trade>,
    #[serde(default)]
    pub daily_target_amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaysTrades {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub total_profit: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveActivity {
    #[serde(default)]
    pub has_activity: bool,
    #[serde(default)]
    pub todays_trades: Option<TodaysTrades>,
}

// ---------------------------------------------------------------------------
// Derived, engine-owned state
// ---------------------------------------------------------------------------

/// A trade currently shown as an open position.
#[derive(Debug, Clone, PartialEq)]
pub struct VisiblePosition {
    pub trade: Trade,
    pub opened_at: DateTime<Utc>,
}

impl VisiblePosition {
    pub fn new(trade: Trade, opened_at: DateTime<Utc>) -> Self {
        Self { trade, opened_at }
    }

    pub fn id(&self) -> &str {
        &self.trade.id
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulationState {
    pub simulated_pl: f64,
    /// Fraction of the recorded duration elapsed, in [0, 1].
    pub progress: f64,
}

/// Portfolio-level numbers pushed to every subscriber on each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
    pub unrealized_pl: f64,
    pub open_positions: usize,
    pub daily_pl: f64,
    pub daily_target: f64,
}

impl AggregateSnapshot {
    /// Realised daily P/L as a fraction of the daily target (0 without a target).
    pub fn target_progress(&self) -> f64 {
        if self.daily_target > 0.0 {
            self.daily_pl / self.daily_target
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboard view state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PositionView {
    pub position: VisiblePosition,
    pub state: SimulationState,
}

#[derive(Debug, Clone, Default)]
pub struct FeedState {
    pub session_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub positions: Vec<PositionView>,
    /// Maximum number of positions shown at once.
    pub capacity: usize,
    pub catalog_size: usize,
    pub last_refresh: Option<DateTime<Utc>>,
    pub live_activity: Option<LiveActivity>,
    pub has_credentials: bool,
    pub logs: VecDeque<String>,
}

impl FeedState {
    pub fn add_log(&mut self, msg: impl Into<String>) {
        let entry = format!("[{}] {}", Utc::now().format("%H:%M:%S"), msg.into());
        self.logs.push_front(entry);
        while self.logs.len() > 200 {
            self.logs.pop_back();
        }
    }

    /// True when there is nothing to show: no positions and no reported activity.
    pub fn is_idle(&self) -> bool {
        self.positions.is_empty()
            && !self
                .live_activity
                .as_ref()
                .map(|a| a.has_activity)
                .unwrap_or(false)
    }
}
