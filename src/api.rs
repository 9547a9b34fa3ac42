/// api.rs – Async client for the two read-only backend endpoints.
///
/// Responsibilities:
///  - Fetch today's completed trades and the daily target (`/daily-trades`)
///  - Fetch the live-activity summary (`/live-activity`)
///  - Attach the bearer credential; callers check `has_credentials` first
use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::models::{DailyTrades, LiveActivity, Trade};

// ---------------------------------------------------------------------------
// Source abstraction
// ---------------------------------------------------------------------------

/// Where the engine gets its data from. Implemented by [`FeedApiClient`] and by
/// in-memory stubs in tests.
///
/// Fetches run on spawned tasks, so a source is cloned into each request and
/// its futures must be `Send`.
pub trait TradeSource: Clone + Send + Sync + 'static {
    /// False when no credential is configured; the engine then skips fetches.
    fn has_credentials(&self) -> bool;

    fn fetch_daily_trades(&self) -> impl Future<Output = Result<DailyTrades>> + Send;

    fn fetch_live_activity(&self) -> impl Future<Output = Result<LiveActivity>> + Send;
}

// ---------------------------------------------------------------------------
// Response envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyTradesEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    daily_trades: Option<RawDailyTrades>,
    #[serde(default)]
    message: Option<String>,
}

/// Trades are kept as raw JSON until each one is decoded on its own, so a
/// single malformed entry cannot take the whole list down with it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDailyTrades {
    #[serde(default)]
    trades: Vec<serde_json::Value>,
    #[serde(default)]
    daily_target_amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveActivityEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    live_activity: Option<LiveActivity>,
    #[serde(default)]
    message: Option<String>,
}

pub fn parse_daily_trades(body: &str) -> Result<DailyTrades> {
    let env: DailyTradesEnvelope =
        serde_json::from_str(body).context("parsing daily-trades response")?;
    if !env.success {
        bail!(
            "daily-trades request unsuccessful: {}",
            env.message.unwrap_or_else(|| "no message".into())
        );
    }
    let raw = env
        .daily_trades
        .ok_or_else(|| anyhow!("daily-trades response missing 'dailyTrades'"))?;

    let received = raw.trades.len();
    let trades: Vec<Trade> = raw
        .trades
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<Trade>(value) {
            Ok(trade) => Some(trade),
            Err(e) => {
                warn!("Skipping undecodable trade #{i}: {e}");
                None
            }
        })
        .collect();
    if trades.len() < received {
        debug!("Decoded {}/{} trades", trades.len(), received);
    }

    Ok(DailyTrades {
        trades,
        daily_target_amount: raw.daily_target_amount.unwrap_or(0.0),
    })
}

pub fn parse_live_activity(body: &str) -> Result<LiveActivity> {
    let env: LiveActivityEnvelope =
        serde_json::from_str(body).context("parsing live-activity response")?;
    if !env.success {
        bail!(
            "live-activity request unsuccessful: {}",
            env.message.unwrap_or_else(|| "no message".into())
        );
    }
    env.live_activity
        .ok_or_else(|| anyhow!("live-activity response missing 'liveActivity'"))
}

// ---------------------------------------------------------------------------
// FeedApiClient
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FeedApiClient {
    pub base_url: String,
    daily_trades_path: String,
    live_activity_path: String,
    token: Option<String>,
    http: Client,
}

impl FeedApiClient {
    pub fn new(cfg: &ApiConfig, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs_f64(cfg.timeout_seconds))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            daily_trades_path: cfg.daily_trades_path.clone(),
            live_activity_path: cfg.live_activity_path.clone(),
            token,
            http,
        })
    }

    async fn get_body(&self, path: &str) -> Result<String> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("no API credential configured"))?;
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {url}");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("requesting {path}"))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                bail!("{path} rejected credential ({})", resp.status())
            }
            s if !s.is_success() => bail!("{path} returned HTTP {s}"),
            _ => {}
        }
        resp.text()
            .await
            .with_context(|| format!("reading {path} body"))
    }
}

impl TradeSource for FeedApiClient {
    fn has_credentials(&self) -> bool {
        self.token.is_some()
    }

    async fn fetch_daily_trades(&self) -> Result<DailyTrades> {
        let body = self.get_body(&self.daily_trades_path).await?;
        parse_daily_trades(&body)
    }

    async fn fetch_live_activity(&self) -> Result<LiveActivity> {
        let body = self.get_body(&self.live_activity_path).await?;
        parse_live_activity(&body)
    }
}
