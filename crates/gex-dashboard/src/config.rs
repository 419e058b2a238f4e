//! Application configuration.

use crate::error::{AppError, AppResult};
use crate::session::{SessionConfig, SessionRequest};
use chrono::NaiveDate;
use gex_core::{nearest_friday, StrikeSelection, StrikeSpacing, MAX_GRID_STRIKES};
use gex_feed::{ProducerConfig, RetryPolicy};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
/// Environment variable naming a configuration file.
pub const CONFIG_ENV_VAR: &str = "GEX_CONFIG";

/// Allowed redraw interval range (seconds).
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 5;
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 300;

/// Producer timing and retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerSettings {
    /// Sleep between feed reads (ms). Default: 1000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Attempts per topic, including the first. Default: 3.
    #[serde(default = "default_subscribe_attempts")]
    pub subscribe_attempts: u32,
    /// Fixed backoff between attempts (ms). Default: 100.
    #[serde(default = "default_subscribe_backoff_ms")]
    pub subscribe_backoff_ms: u64,
    /// Pause after subscribing, before the first read (ms). Default: 300.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_subscribe_attempts() -> u32 {
    3
}

fn default_subscribe_backoff_ms() -> u64 {
    100
}

fn default_settle_delay_ms() -> u64 {
    300
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            subscribe_attempts: default_subscribe_attempts(),
            subscribe_backoff_ms: default_subscribe_backoff_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl From<&ProducerSettings> for ProducerConfig {
    fn from(cfg: &ProducerSettings) -> Self {
        Self {
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            retry: RetryPolicy {
                max_attempts: cfg.subscribe_attempts,
                backoff: Duration::from_millis(cfg.subscribe_backoff_ms),
            },
            settle_delay: Duration::from_millis(cfg.settle_delay_ms),
        }
    }
}

/// Session lifecycle timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Wait for a previous producer on restart (ms). Default: 2000.
    #[serde(default = "default_restart_grace_ms")]
    pub restart_grace_ms: u64,
    /// Wait for the bootstrap producer when expanding (ms). Default: 1000.
    #[serde(default = "default_expand_grace_ms")]
    pub expand_grace_ms: u64,
    /// How often the console consumer polls the session (ms). Default: 250.
    #[serde(default = "default_consumer_tick_ms")]
    pub consumer_tick_ms: u64,
}

fn default_restart_grace_ms() -> u64 {
    2_000
}

fn default_expand_grace_ms() -> u64 {
    1_000
}

fn default_consumer_tick_ms() -> u64 {
    250
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            restart_grace_ms: default_restart_grace_ms(),
            expand_grace_ms: default_expand_grace_ms(),
            consumer_tick_ms: default_consumer_tick_ms(),
        }
    }
}

/// Simulated feed parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// Starting underlying price. Default: 600.0.
    #[serde(default = "default_base_price")]
    pub base_price: f64,
    /// Price change per feed tick. Default: 0.05.
    #[serde(default = "default_drift")]
    pub drift: f64,
}

fn default_base_price() -> f64 {
    600.0
}

fn default_drift() -> f64 {
    0.05
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_price: default_base_price(),
            drift: default_drift(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info,gex=debug".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Underlying ticker. Default: "SPY".
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Option expiration. Default: the nearest Friday on or after today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,
    #[serde(default)]
    pub spacing: StrikeSpacing,
    /// Redraw interval (seconds), within [5, 300]. Default: 60.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub strikes: StrikeSelection,
    #[serde(default)]
    pub producer: ProducerSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_symbol() -> String {
    "SPY".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            expiry: None,
            spacing: StrikeSpacing::default(),
            refresh_interval_secs: default_refresh_interval_secs(),
            strikes: StrikeSelection::default(),
            producer: ProducerSettings::default(),
            session: SessionSettings::default(),
            feed: FeedSettings::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Path priority: `path` argument > `GEX_CONFIG` > `config/default.toml`.
    /// An explicitly named file must exist; a missing default file yields
    /// the built-in defaults.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let explicit = path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok());

        let config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            None => {
                tracing::warn!(path = DEFAULT_CONFIG_PATH, "Config file not found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Check bounds that serde cannot express.
    pub fn validate(&self) -> AppResult<()> {
        if self.symbol.trim().is_empty() {
            return Err(AppError::Config("symbol must not be empty".to_string()));
        }

        if !(MIN_REFRESH_INTERVAL_SECS..=MAX_REFRESH_INTERVAL_SECS)
            .contains(&self.refresh_interval_secs)
        {
            return Err(AppError::Config(format!(
                "refresh_interval_secs must be within [{MIN_REFRESH_INTERVAL_SECS}, {MAX_REFRESH_INTERVAL_SECS}], got {}",
                self.refresh_interval_secs
            )));
        }

        match &self.strikes {
            StrikeSelection::Centered { range } if range.is_sign_negative() => {
                return Err(AppError::Config(format!(
                    "strike range must not be negative, got {range}"
                )));
            }
            StrikeSelection::Bounded { low, high } if low > high || *low < Decimal::ZERO => {
                return Err(AppError::Config(format!(
                    "invalid strike bounds [{low}, {high}]"
                )));
            }
            _ => {}
        }

        let width = match &self.strikes {
            StrikeSelection::Centered { range } => range.checked_mul(Decimal::TWO),
            StrikeSelection::Bounded { low, high } => high.checked_sub(*low),
        };
        let max_width = self.spacing.as_decimal() * Decimal::from(MAX_GRID_STRIKES - 1);
        if width.map_or(true, |w| w > max_width) {
            return Err(AppError::Config(format!(
                "strike selection spans more than {MAX_GRID_STRIKES} strikes at spacing {}",
                self.spacing
            )));
        }

        if self.producer.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "producer.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.producer.subscribe_attempts == 0 {
            return Err(AppError::Config(
                "producer.subscribe_attempts must be at least 1".to_string(),
            ));
        }
        if self.session.consumer_tick_ms == 0 {
            return Err(AppError::Config(
                "session.consumer_tick_ms must be positive".to_string(),
            ));
        }
        if !self.feed.base_price.is_finite() || self.feed.base_price <= 0.0 {
            return Err(AppError::Config(format!(
                "feed.base_price must be positive, got {}",
                self.feed.base_price
            )));
        }

        Ok(())
    }

    /// Expiry to stream, defaulting to the nearest Friday on or after `today`.
    pub fn resolve_expiry(&self, today: NaiveDate) -> NaiveDate {
        self.expiry.unwrap_or_else(|| nearest_friday(today))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn consumer_tick(&self) -> Duration {
        Duration::from_millis(self.session.consumer_tick_ms)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            producer: ProducerConfig::from(&self.producer),
            restart_grace: Duration::from_millis(self.session.restart_grace_ms),
            expand_grace: Duration::from_millis(self.session.expand_grace_ms),
        }
    }

    /// Session start request for `today`.
    pub fn session_request(&self, today: NaiveDate) -> SessionRequest {
        SessionRequest {
            symbol: self.symbol.trim().to_uppercase(),
            expiry: self.resolve_expiry(today),
            strikes: self.strikes.clone(),
            spacing: self.spacing,
            refresh_interval: self.refresh_interval(),
        }
    }
}
