/// main.rs – Entry point for the live trading feed.
///
/// Wires the backend client, request throttle and feed engine together, then
/// runs the fast (animation) and slow (activity poll) timers alongside the
/// ratatui dashboard.
mod api;
mod catalog;
mod config;
mod dashboard;
mod engine;
mod hub;
mod models;
mod simulator;
mod throttle;
mod visible;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use crossterm::event::EventStream;
use futures_util::StreamExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use api::FeedApiClient;
use config::Settings;
use engine::FeedEngine;
use models::FeedState;
use throttle::RequestThrottle;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tradefeed",
    about = "Live trading feed – today's trades animated as open positions",
    version
)]
struct Cli {
    /// Disable the interactive dashboard and print logs to stdout instead.
    #[arg(long, default_value_t = false)]
    no_dashboard: bool,

    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Seed the position RNG for a reproducible feed.
    #[arg(long)]
    seed: Option<u64>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(&cli.config)?;
    if cli.seed.is_some() {
        settings.feed.seed = cli.seed;
    }

    // Logging – respects RUST_LOG; falls back to config
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.app.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !settings.has_credentials() {
        warn!("No FEED_API_TOKEN set – the feed will stay idle.");
    }
    info!("Backend: {}", settings.api.base_url);

    let client = FeedApiClient::new(&settings.api, settings.api_token.clone())?;

    let rng = match settings.feed.seed {
        Some(seed) => {
            info!("Using fixed RNG seed {seed}");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };

    // Shared view state for the dashboard
    let state = Arc::new(RwLock::new(FeedState {
        session_id: Uuid::new_v4().to_string(),
        started_at: Some(Utc::now()),
        ..FeedState::default()
    }));

    let mut engine = FeedEngine::from_settings(client, RequestThrottle::new(), &settings, rng)
        .with_view(Arc::clone(&state));
    let shutdown = engine.shutdown_handle();
    let aggregate = engine.subscribe();

    let _publish_log = engine.on_publish(|snap| {
        debug!(
            "aggregate: unrealised={:+.2} open={} daily={:+.2}",
            snap.unrealized_pl, snap.open_positions, snap.daily_pl
        );
    });

    let mut fast_ticker = tokio::time::interval(settings.feed.tick_interval());
    fast_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut slow_ticker = tokio::time::interval(settings.feed.activity_poll_interval());
    slow_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Dashboard setup (unless --no-dashboard)
    let mut terminal = if !cli.no_dashboard {
        Some(dashboard::setup_terminal()?)
    } else {
        None
    };

    let refresh_ms = (settings.dashboard.refresh_rate * 1000.0) as u64;
    let mut dash_ticker = tokio::time::interval(std::time::Duration::from_millis(refresh_ms));

    let mut event_stream = EventStream::new();

    info!("Feed started.  Press 'q' to quit.");

    // -----------------------------------------------------------------------
    // Main event loop
    // -----------------------------------------------------------------------
    loop {
        tokio::select! {
            // ── Dashboard keyboard events ──────────────────────────────────
            Some(Ok(event)) = event_stream.next() => {
                if terminal.is_some() && dashboard::handle_event(&event) {
                    break;
                }
            }

            // ── Dashboard redraw ───────────────────────────────────────────
            _ = dash_ticker.tick() => {
                if let Some(ref mut term) = terminal {
                    let snapshot = aggregate.current();
                    let st = match state.read() {
                        Ok(st) => st.clone(),
                        Err(poisoned) => poisoned.into_inner().clone(),
                    };
                    term.draw(|f| dashboard::render(f, &st, &snapshot))?;
                }
            }

            // ── Fast tick: apply fetches → backfill → simulate → publish ───
            // Never awaits the backend; requests run on their own tasks.
            _ = fast_ticker.tick() => {
                engine.cycle_at(Utc::now());
            }

            // ── Slow tick: live activity + catalog refresh ─────────────────
            _ = slow_ticker.tick() => {
                engine.poll_activity_at(Utc::now());
                if terminal.is_none() {
                    let snap = aggregate.current();
                    info!(
                        "Open {} │ unrealised {:+.2} │ today {:+.2} / {:.2}",
                        snap.open_positions, snap.unrealized_pl, snap.daily_pl, snap.daily_target
                    );
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Graceful shutdown
    // -----------------------------------------------------------------------
    shutdown.shutdown();

    if let Some(ref mut term) = terminal {
        dashboard::teardown_terminal(term)?;
    }

    if engine.in_flight() > 0 {
        debug!("Dropping {} in-flight request(s)", engine.in_flight());
    }
    let last = engine.latest();
    info!(
        "Feed stopped – {} position(s) shown, final unrealised P&L {:+.2}",
        last.open_positions, last.unrealized_pl
    );

    Ok(())
}
