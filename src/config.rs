/// config.rs – Load settings from config.yaml + environment variables.
///
/// Environment variables always override YAML values.
/// The API credential is read exclusively from the environment / .env file.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub daily_trades_path: String,
    pub live_activity_path: String,
    /// Per-request timeout.
    pub timeout_seconds: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".into(),
            daily_trades_path: "/daily-trades".into(),
            live_activity_path: "/live-activity".into(),
            timeout_seconds: 15.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Fast loop period: backfill, position ticks and aggregate publication.
    pub tick_interval_ms: u64,
    /// Slow loop period: live-activity poll and catalog refresh attempts.
    pub activity_poll_seconds: f64,
    /// Maximum number of simultaneously visible positions.
    pub max_visible_positions: usize,
    /// Chance per tick of admitting one backlog trade when below capacity.
    pub backfill_probability: f64,
    /// Progress at which the simulated value snaps to the final P/L.
    pub snap_progress: f64,
    /// Notional estimate multiplier when a trade has no position size.
    pub size_multiplier: f64,
    /// Width of the per-tick random step as a fraction of notional.
    pub step_fraction: f64,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            activity_poll_seconds: 30.0,
            max_visible_positions: 5,
            backfill_probability: 0.3,
            snap_progress: 0.98,
            size_multiplier: 20.0,
            step_fraction: 0.05,
            seed: None,
        }
    }
}

impl FeedConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn activity_poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.activity_poll_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub daily_trades_min_interval_ms: u64,
    pub live_activity_min_interval_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            daily_trades_min_interval_ms: 15_000,
            live_activity_min_interval_ms: 15_000,
        }
    }
}

impl ThrottleConfig {
    pub fn daily_trades_floor(&self) -> Duration {
        Duration::from_millis(self.daily_trades_min_interval_ms)
    }

    pub fn live_activity_floor(&self) -> Duration {
        Duration::from_millis(self.live_activity_min_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Dashboard refresh rate in seconds.
    pub refresh_rate: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { refresh_rate: 0.5 }
    }
}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppConfig,
    pub api: ApiConfig,
    pub feed: FeedConfig,
    pub throttle: ThrottleConfig,
    pub dashboard: DashboardConfig,

    // Bearer credential – populated from env, not from YAML.
    #[serde(skip)]
    pub api_token: Option<String>,
}

impl Settings {
    /// Load settings from *config_path* YAML file, then overlay env vars.
    pub fn load(config_path: &str) -> Result<Self> {
        // Try to load .env file (ignore error if absent)
        let _ = dotenvy::dotenv();

        let mut settings = Self::from_file(config_path)?;

        settings.api_token = std::env::var("FEED_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        if let Ok(url) = std::env::var("FEED_API_URL") {
            settings.api.base_url = url;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            settings.app.log_level = level;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// YAML only, no environment overlay. Missing file yields defaults.
    pub fn from_file(config_path: &str) -> Result<Self> {
        if !std::path::Path::new(config_path).exists() {
            return Ok(Settings::default());
        }
        let yaml = std::fs::read_to_string(config_path).context("reading config file")?;
        serde_yaml::from_str::<Settings>(&yaml).context("parsing config YAML")
    }

    pub fn has_credentials(&self) -> bool {
        self.api_token.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed.tick_interval_ms == 0 {
            bail!("feed.tick_interval_ms must be > 0");
        }
        validate_positive("feed.activity_poll_seconds", self.feed.activity_poll_seconds)?;
        validate_positive("api.timeout_seconds", self.api.timeout_seconds)?;
        validate_positive("dashboard.refresh_rate", self.dashboard.refresh_rate)?;
        validate_positive("feed.size_multiplier", self.feed.size_multiplier)?;

        if self.api.base_url.trim().is_empty() {
            bail!("api.base_url must not be empty");
        }
        for (name, path) in [
            ("api.daily_trades_path", &self.api.daily_trades_path),
            ("api.live_activity_path", &self.api.live_activity_path),
        ] {
            if !path.starts_with('/') {
                bail!("{name} must start with '/'");
            }
        }
        if self.feed.max_visible_positions == 0 {
            bail!("feed.max_visible_positions must be > 0");
        }
        if !(0.0..=1.0).contains(&self.feed.backfill_probability) {
            bail!("feed.backfill_probability must be in [0, 1]");
        }
        if !self.feed.snap_progress.is_finite()
            || self.feed.snap_progress <= 0.0
            || self.feed.snap_progress > 1.0
        {
            bail!("feed.snap_progress must be in (0, 1]");
        }
        if !self.feed.step_fraction.is_finite() || self.feed.step_fraction < 0.0 {
            bail!("feed.step_fraction must be a finite number >= 0");
        }
        Ok(())
    }
}

fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{name} must be a finite number > 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_tick_interval() {
        let mut settings = Settings::default();
        settings.feed.tick_interval_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_probability_above_one() {
        let mut settings = Settings::default();
        settings.feed.backfill_probability = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut settings = Settings::default();
        settings.feed.max_visible_positions = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_snap_progress_out_of_range() {
        let mut settings = Settings::default();
        settings.feed.snap_progress = 0.0;
        assert!(settings.validate().is_err());
        settings.feed.snap_progress = 1.2;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_relative_endpoint_path() {
        let mut settings = Settings::default();
        settings.api.daily_trades_path = "daily-trades".into();
        assert!(settings.validate().is_err());
    }
}
