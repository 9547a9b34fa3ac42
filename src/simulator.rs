/// simulator.rs – Animates a visible position's P/L toward its recorded outcome.
///
/// The displayed value is a bounded random walk. Each tick it moves by a
/// uniform step proportional to the position's notional, then is clamped into
/// a band around the final P/L that shrinks as `1 - progress²`:
///
///   upper = final + 1.5·final·(1 − p²)
///   lower = final + 0.5·final·(1 − p²)
///
/// At p = 1 the band is a single point. Past `snap_progress` the value is
/// pinned to the final P/L outright.
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::FeedConfig;
use crate::models::{SimulationState, Trade, VisiblePosition};

const UPPER_SPREAD: f64 = 1.5;
const LOWER_SPREAD: f64 = 0.5;

/// Elapsed fraction of the trade's recorded duration, clamped to [0, 1].
pub fn progress_at(position: &VisiblePosition, now: DateTime<Utc>) -> f64 {
    let elapsed_ms = (now - position.opened_at).num_milliseconds() as f64;
    (elapsed_ms / position.trade.duration_ms()).clamp(0.0, 1.0)
}

/// Convergence band for `final_pl` at `progress`, returned as (lower, upper)
/// with lower ≤ upper regardless of the sign of `final_pl`.
pub fn convergence_bounds(final_pl: f64, progress: f64) -> (f64, f64) {
    let factor = 1.0 - progress * progress;
    let upper = final_pl + (final_pl * UPPER_SPREAD) * factor;
    let lower = final_pl + (final_pl * LOWER_SPREAD) * factor;
    (lower.min(upper), lower.max(upper))
}

#[derive(Debug, Clone)]
pub struct PositionSimulator {
    snap_progress: f64,
    size_multiplier: f64,
    step_fraction: f64,
}

impl Default for PositionSimulator {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default())
    }
}

impl PositionSimulator {
    pub fn new(snap_progress: f64, size_multiplier: f64, step_fraction: f64) -> Self {
        Self {
            snap_progress,
            size_multiplier,
            step_fraction,
        }
    }

    pub fn from_config(cfg: &FeedConfig) -> Self {
        Self::new(cfg.snap_progress, cfg.size_multiplier, cfg.step_fraction)
    }

    /// Notional exposure: the reported position size, else |final P/L| × multiplier.
    pub fn notional(&self, trade: &Trade) -> f64 {
        match trade.position_size {
            Some(size) if size.is_finite() && size > 0.0 => size,
            _ => trade.final_pl.abs() * self.size_multiplier,
        }
    }

    /// Advance `state` to `now`. Returns (simulated P/L, progress).
    pub fn tick<R: Rng + ?Sized>(
        &self,
        position: &VisiblePosition,
        state: &mut SimulationState,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> (f64, f64) {
        let trade = &position.trade;
        // Never let progress run backwards, even if the clock does.
        let progress = progress_at(position, now).max(state.progress);

        let value = if progress >= self.snap_progress {
            trade.final_pl
        } else {
            let width = self.notional(trade) * self.step_fraction;
            let step = (rng.gen::<f64>() - 0.5) * width;
            let (lower, upper) = convergence_bounds(trade.final_pl, progress);
            (state.simulated_pl + step).clamp(lower, upper)
        };

        state.progress = progress;
        state.simulated_pl = value;
        (value, progress)
    }
}
