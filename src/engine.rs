/// engine.rs – Drives the feed: catalog refresh, visible-set upkeep,
/// position ticks and aggregate publication.
///
/// Two entry points are called from the owner's timers:
///  - `cycle_at` on the fast tick: apply landed fetches → refresh dispatch →
///    backfill → tick → publish
///  - `poll_activity_at` on the slow tick: live-activity + refresh dispatch
///
/// Neither awaits the network. Requests run on spawned tasks and report back
/// over a channel that the next cycle drains, so a slow backend never stalls
/// the animation. Both entry points go through the shared `RequestThrottle`,
/// so overlapping timers never produce duplicate requests. After
/// `ShutdownHandle::shutdown` no state is written and nothing is published,
/// even by a fetch that was already in flight.
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::TradeSource;
use crate::catalog::{refresh_gate, RefreshOutcome, TradeCatalog};
use crate::config::{FeedConfig, Settings, ThrottleConfig};
use crate::hub::{summarize, AggregationHub, Subscription};
use crate::models::{
    AggregateSnapshot, DailyTrades, FeedState, LiveActivity, PositionView, SimulationState,
};
use crate::simulator::PositionSimulator;
use crate::throttle::{RequestThrottle, LIVE_ACTIVITY_KEY};
use crate::visible::VisibleSetManager;

/// A backend response delivered by a background fetch task.
enum Fetched {
    DailyTrades(anyhow::Result<DailyTrades>),
    LiveActivity(anyhow::Result<LiveActivity>),
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    stopped: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// FeedEngine
// ---------------------------------------------------------------------------

pub struct FeedEngine<S, R> {
    source: S,
    throttle: RequestThrottle,
    throttle_cfg: ThrottleConfig,
    catalog: TradeCatalog,
    visible: VisibleSetManager,
    simulator: PositionSimulator,
    states: HashMap<String, SimulationState>,
    hub: AggregationHub,
    live_activity: Option<LiveActivity>,
    shutdown: ShutdownHandle,
    view: Option<Arc<RwLock<FeedState>>>,
    rng: R,
    fetched_tx: mpsc::UnboundedSender<Fetched>,
    fetched_rx: mpsc::UnboundedReceiver<Fetched>,
    in_flight: usize,
}

impl<S: TradeSource, R: Rng> FeedEngine<S, R> {
    pub fn new(
        source: S,
        throttle: RequestThrottle,
        feed: &FeedConfig,
        throttle_cfg: &ThrottleConfig,
        rng: R,
    ) -> Self {
        let (fetched_tx, fetched_rx) = mpsc::unbounded_channel();
        Self {
            source,
            throttle,
            throttle_cfg: throttle_cfg.clone(),
            catalog: TradeCatalog::new(),
            visible: VisibleSetManager::new(feed.max_visible_positions, feed.backfill_probability),
            simulator: PositionSimulator::from_config(feed),
            states: HashMap::new(),
            hub: AggregationHub::new(),
            live_activity: None,
            shutdown: ShutdownHandle::default(),
            view: None,
            rng,
            fetched_tx,
            fetched_rx,
            in_flight: 0,
        }
    }

    pub fn from_settings(source: S, throttle: RequestThrottle, settings: &Settings, rng: R) -> Self {
        Self::new(source, throttle, &settings.feed, &settings.throttle, rng)
    }

    /// Mirror positions and log lines into a dashboard state.
    pub fn with_view(mut self, view: Arc<RwLock<FeedState>>) -> Self {
        if let Ok(mut st) = view.write() {
            st.has_credentials = self.source.has_credentials();
            st.capacity = self.visible.capacity();
        }
        self.view = Some(view);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// Last published aggregate.
    pub fn latest(&self) -> AggregateSnapshot {
        self.hub.latest()
    }

    /// Run `callback` on every published aggregate, off the engine's task.
    pub fn on_publish<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnMut(AggregateSnapshot) + Send + 'static,
    {
        self.hub.on_publish(callback)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn catalog(&self) -> &TradeCatalog {
        &self.catalog
    }

    pub fn visible(&self) -> &VisibleSetManager {
        &self.visible
    }

    pub fn state_of(&self, trade_id: &str) -> Option<SimulationState> {
        self.states.get(trade_id).copied()
    }

    pub fn live_activity(&self) -> Option<&LiveActivity> {
        self.live_activity.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_shutdown()
    }

    /// Number of requests sent whose result has not been applied yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    // ------------------------------------------------------------------
    // Fast loop
    // ------------------------------------------------------------------

    /// One scheduling cycle. Returns the published snapshot, or `None` once
    /// the engine has been shut down.
    pub fn cycle_at(&mut self, now: DateTime<Utc>) -> Option<AggregateSnapshot> {
        if self.is_stopped() {
            return None;
        }

        // 1. Fold in whatever the background fetches delivered
        self.apply_landed(now);

        // 2. Catalog refresh (throttled, off-loop)
        self.dispatch_refresh(now);

        // 3. Initial population / backfill
        let admitted = self.visible.sync(self.catalog.trades(), now, &mut self.rng);
        for id in &admitted {
            self.states.entry(id.clone()).or_default();
        }
        if !admitted.is_empty() {
            info!("Opened {} position(s): {}", admitted.len(), admitted.join(", "));
            self.log(format!("Opened {} position(s)", admitted.len()));
        }

        // 4. Tick every visible position
        for position in self.visible.positions() {
            let state = self.states.entry(position.trade.id.clone()).or_default();
            self.simulator.tick(position, state, now, &mut self.rng);
        }

        // 5. Aggregate + publish
        let snapshot = self.snapshot(now);
        self.hub.publish(snapshot);
        self.sync_view();
        Some(snapshot)
    }

    /// Current aggregate without publishing it.
    pub fn snapshot(&self, now: DateTime<Utc>) -> AggregateSnapshot {
        summarize(
            self.visible
                .positions()
                .iter()
                .filter_map(|p| self.states.get(&p.trade.id)),
            self.catalog.daily_pl(now),
            self.catalog.daily_target(),
        )
    }

    /// Send a daily-trades request if the credential and throttle allow it.
    /// Returns `Dispatched` when a request went out.
    pub fn dispatch_refresh(&mut self, now: DateTime<Utc>) -> RefreshOutcome {
        if self.is_stopped() {
            return RefreshOutcome::Discarded;
        }
        let outcome = refresh_gate(
            &self.source,
            &self.throttle,
            self.throttle_cfg.daily_trades_floor(),
            now,
        );
        if outcome == RefreshOutcome::Dispatched {
            let source = self.source.clone();
            self.spawn_fetch(async move {
                Fetched::DailyTrades(source.fetch_daily_trades().await)
            });
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Slow loop
    // ------------------------------------------------------------------

    /// Send the live-activity poll, then attempt a catalog refresh.
    pub fn poll_activity_at(&mut self, now: DateTime<Utc>) {
        if self.is_stopped() || !self.source.has_credentials() {
            return;
        }

        if self
            .throttle
            .attempt_at(LIVE_ACTIVITY_KEY, self.throttle_cfg.live_activity_floor(), now)
        {
            let source = self.source.clone();
            self.spawn_fetch(async move {
                Fetched::LiveActivity(source.fetch_live_activity().await)
            });
        }

        self.apply_landed(now);
        self.dispatch_refresh(now);
        self.sync_view();
    }

    // ------------------------------------------------------------------
    // Background fetches
    // ------------------------------------------------------------------

    fn spawn_fetch<F>(&mut self, fetch: F)
    where
        F: std::future::Future<Output = Fetched> + Send + 'static,
    {
        let tx = self.fetched_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            // The engine may already be gone; nothing to deliver to then.
            let _ = tx.send(fetch.await);
        });
    }

    /// Apply every fetch result that has already arrived. Never waits.
    /// Returns the outcome of the last daily-trades result applied.
    pub fn apply_landed(&mut self, now: DateTime<Utc>) -> Option<RefreshOutcome> {
        let mut last = None;
        while let Ok(fetched) = self.fetched_rx.try_recv() {
            if let Some(outcome) = self.apply_fetched(fetched, now) {
                last = Some(outcome);
            }
        }
        last
    }

    /// Wait for every in-flight request and apply its result. Returns the
    /// outcome of the last daily-trades result applied.
    pub async fn settle(&mut self, now: DateTime<Utc>) -> Option<RefreshOutcome> {
        let mut last = None;
        while self.in_flight > 0 {
            let Some(fetched) = self.fetched_rx.recv().await else {
                break;
            };
            if let Some(outcome) = self.apply_fetched(fetched, now) {
                last = Some(outcome);
            }
        }
        self.sync_view();
        last
    }

    fn apply_fetched(&mut self, fetched: Fetched, now: DateTime<Utc>) -> Option<RefreshOutcome> {
        self.in_flight = self.in_flight.saturating_sub(1);
        let stopped = self.is_stopped();
        match fetched {
            Fetched::DailyTrades(result) => {
                let outcome = self.catalog.apply(result, now, stopped);
                match &outcome {
                    RefreshOutcome::Replaced(n) => {
                        self.log(format!("Catalog refreshed: {n} trade(s)"))
                    }
                    RefreshOutcome::Failed(e) => self.log(format!("Refresh failed: {e}")),
                    _ => {}
                }
                Some(outcome)
            }
            Fetched::LiveActivity(_) if stopped => {
                debug!("Discarding live-activity response received after shutdown");
                None
            }
            Fetched::LiveActivity(Ok(activity)) => {
                debug!("Live activity: has_activity={}", activity.has_activity);
                self.live_activity = Some(activity);
                None
            }
            Fetched::LiveActivity(Err(e)) => {
                warn!("Live-activity poll failed: {e:#}");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Dashboard mirror
    // ------------------------------------------------------------------

    fn sync_view(&self) {
        let Some(view) = &self.view else {
            return;
        };
        if self.is_stopped() {
            return;
        }
        let Ok(mut st) = view.write() else {
            return;
        };
        st.positions = self
            .visible
            .positions()
            .iter()
            .map(|p| PositionView {
                position: p.clone(),
                state: self.states.get(&p.trade.id).copied().unwrap_or_default(),
            })
            .collect();
        st.catalog_size = self.catalog.len();
        st.last_refresh = self.catalog.last_refreshed();
        st.live_activity = self.live_activity.clone();
    }

    fn log(&self, msg: String) {
        if let Some(view) = &self.view {
            if let Ok(mut st) = view.write() {
                st.add_log(msg);
            }
        }
    }
}
