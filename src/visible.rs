/// visible.rs – The bounded working set of trades shown as open positions.
///
/// Positions are never evicted: once a trade is opened it stays visible for
/// the rest of the session, so the feed only ever grows up to capacity.
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use tracing::debug;

use crate::models::{Trade, VisiblePosition};

pub struct VisibleSetManager {
    capacity: usize,
    backfill_probability: f64,
    positions: Vec<VisiblePosition>,
    opened: HashSet<String>,
}

impl VisibleSetManager {
    pub fn new(capacity: usize, backfill_probability: f64) -> Self {
        Self {
            capacity,
            backfill_probability: backfill_probability.clamp(0.0, 1.0),
            positions: Vec::with_capacity(capacity),
            opened: HashSet::new(),
        }
    }

    pub fn positions(&self) -> &[VisiblePosition] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_open(&self, trade_id: &str) -> bool {
        self.opened.contains(trade_id)
    }

    /// One scheduling step: seed the set when empty, otherwise try a backfill.
    /// Returns the ids admitted during this step.
    pub fn sync<R: Rng + ?Sized>(
        &mut self,
        catalog: &[Trade],
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Vec<String> {
        if self.positions.is_empty() {
            self.populate_initial(catalog, now, rng)
        } else {
            self.try_backfill(catalog, now, rng).into_iter().collect()
        }
    }

    /// Open a uniform random sample of min(capacity, |catalog|) trades at once.
    /// The sample ignores trade timestamps.
    pub fn populate_initial<R: Rng + ?Sized>(
        &mut self,
        catalog: &[Trade],
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Vec<String> {
        if !self.positions.is_empty() || catalog.is_empty() {
            return Vec::new();
        }
        let candidates: Vec<&Trade> = catalog.iter().filter(|t| !self.is_open(&t.id)).collect();
        let picks: Vec<Trade> = candidates
            .choose_multiple(rng, self.capacity)
            .map(|t| (*t).clone())
            .collect();

        let ids: Vec<String> = picks.iter().map(|t| t.id.clone()).collect();
        for trade in picks {
            self.admit(trade, now);
        }
        debug!("Initial population opened {} position(s)", ids.len());
        ids
    }

    /// Trades not yet opened whose timestamp is at or before `now`.
    pub fn eligible_backlog<'a>(&self, catalog: &'a [Trade], now: DateTime<Utc>) -> Vec<&'a Trade> {
        catalog
            .iter()
            .filter(|t| t.has_occurred(now) && !self.is_open(&t.id))
            .collect()
    }

    /// Admit at most one backlog trade, subject to capacity and a Bernoulli trial.
    pub fn try_backfill<R: Rng + ?Sized>(
        &mut self,
        catalog: &[Trade],
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Option<String> {
        if self.positions.len() >= self.capacity {
            return None;
        }
        let backlog = self.eligible_backlog(catalog, now);
        if backlog.is_empty() || !rng.gen_bool(self.backfill_probability) {
            return None;
        }
        let trade = (*backlog.choose(rng)?).clone();
        let id = trade.id.clone();
        self.admit(trade, now);
        debug!("Backfilled position {id}");
        Some(id)
    }

    fn admit(&mut self, trade: Trade, now: DateTime<Utc>) {
        if self.positions.len() >= self.capacity || !self.opened.insert(trade.id.clone()) {
            return;
        }
        self.positions.push(VisiblePosition::new(trade, now));
    }
}
