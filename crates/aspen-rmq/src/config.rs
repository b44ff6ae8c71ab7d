//! Configuration for connections and consumers.
//!
//! Supports TOML files and environment variables, with defaults matching the
//! protocol constants. Timing overrides exist for tests and unusual
//! deployments; every peer sharing a store should run the same values.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use snafu::Snafu;
use tracing::info;

use crate::constants;

/// Default values for configuration
mod defaults {
    pub fn redis_url() -> String {
        "redis://127.0.0.1:6379/0".to_string()
    }
    pub fn tag() -> String {
        "rmq".to_string()
    }
    pub fn heartbeat_ttl_secs() -> u64 {
        super::constants::HEARTBEAT_TTL.as_secs()
    }
    pub fn heartbeat_interval_secs() -> u64 {
        super::constants::HEARTBEAT_INTERVAL.as_secs()
    }
    pub fn scan_interval_secs() -> u64 {
        super::constants::SCAN_INTERVAL.as_secs()
    }
    pub fn prefetch_limit() -> usize {
        super::constants::DEFAULT_PREFETCH_LIMIT
    }
    pub fn poll_interval_ms() -> u64 {
        super::constants::DEFAULT_POLL_INTERVAL.as_millis() as u64
    }
}

/// Configuration errors.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid value '{value}' for {key}: {reason}"))]
    InvalidValue {
        /// Setting name (env var or file key).
        key: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required configuration value is missing.
    #[snafu(display("missing required configuration {key}: {hint}"))]
    MissingRequired {
        /// Setting name.
        key: String,
        /// How to provide it.
        hint: String,
    },
}

/// Lease and scan timing for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Lifetime of the heartbeat lease.
    pub heartbeat_ttl: Duration,
    /// Delay between lease renewals.
    pub heartbeat_interval: Duration,
    /// Delay between peer-liveness scans.
    pub scan_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_ttl: constants::HEARTBEAT_TTL,
            heartbeat_interval: constants::HEARTBEAT_INTERVAL,
            scan_interval: constants::SCAN_INTERVAL,
        }
    }
}

impl ConnectionConfig {
    /// Reject timings under which a healthy connection could lose its lease.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "heartbeat_ttl_secs".to_string(),
                value: "0".to_string(),
                reason: "lease must outlive at least one renewal".to_string(),
            });
        }
        if self.heartbeat_interval.is_zero() || self.heartbeat_interval >= self.heartbeat_ttl {
            return Err(ConfigError::InvalidValue {
                key: "heartbeat_interval_secs".to_string(),
                value: self.heartbeat_interval.as_secs().to_string(),
                reason: format!(
                    "must be non-zero and shorter than the {}s lease",
                    self.heartbeat_ttl.as_secs()
                ),
            });
        }
        if self.scan_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "scan_interval_secs".to_string(),
                value: "0".to_string(),
                reason: "scan interval must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmqConfig {
    /// Redis server URL.
    #[serde(default = "defaults::redis_url")]
    pub redis_url: String,
    /// Tag used as the prefix of this process's connection name.
    #[serde(default = "defaults::tag")]
    pub tag: String,
    /// Heartbeat lease lifetime in seconds.
    #[serde(default = "defaults::heartbeat_ttl_secs")]
    pub heartbeat_ttl_secs: u64,
    /// Seconds between lease renewals.
    #[serde(default = "defaults::heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Seconds between peer-liveness scans.
    #[serde(default = "defaults::scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Deliveries buffered per consuming queue.
    #[serde(default = "defaults::prefetch_limit")]
    pub prefetch_limit: usize,
    /// Milliseconds between ready-list polls.
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RmqConfig {
    fn default() -> Self {
        Self {
            redis_url: defaults::redis_url(),
            tag: defaults::tag(),
            heartbeat_ttl_secs: defaults::heartbeat_ttl_secs(),
            heartbeat_interval_secs: defaults::heartbeat_interval_secs(),
            scan_interval_secs: defaults::scan_interval_secs(),
            prefetch_limit: defaults::prefetch_limit(),
            poll_interval_ms: defaults::poll_interval_ms(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where T::Err: std::fmt::Display {
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

impl RmqConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to defaults; set-but-unparseable ones are
    /// errors.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self {
            redis_url: std::env::var("RMQ_REDIS_URL").unwrap_or_else(|_| defaults::redis_url()),
            tag: std::env::var("RMQ_TAG").unwrap_or_else(|_| defaults::tag()),
            heartbeat_ttl_secs: env_or("RMQ_HEARTBEAT_TTL_SECS", defaults::heartbeat_ttl_secs())?,
            heartbeat_interval_secs: env_or("RMQ_HEARTBEAT_INTERVAL_SECS", defaults::heartbeat_interval_secs())?,
            scan_interval_secs: env_or("RMQ_SCAN_INTERVAL_SECS", defaults::scan_interval_secs())?,
            prefetch_limit: env_or("RMQ_PREFETCH_LIMIT", defaults::prefetch_limit())?,
            poll_interval_ms: env_or("RMQ_POLL_INTERVAL_MS", defaults::poll_interval_ms())?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            key: "config_file".to_string(),
            value: path.display().to_string(),
            reason: format!("failed to read file: {e}"),
        })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::InvalidValue {
            key: "config_file".to_string(),
            value: path.display().to_string(),
            reason: format!("failed to parse TOML: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file if one is given and exists, otherwise from the
    /// environment.
    pub fn load_with_optional_file(path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        if let Some(path) = path
            && path.as_ref().exists()
        {
            info!(path = %path.as_ref().display(), "loading configuration from file");
            return Self::from_toml_file(path);
        }

        info!("loading configuration from environment variables");
        Self::load()
    }

    /// Validate every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "redis_url".to_string(),
                hint: "set RMQ_REDIS_URL or redis_url in the config file".to_string(),
            });
        }
        if self.tag.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "tag".to_string(),
                value: String::new(),
                reason: "connection tag must not be empty".to_string(),
            });
        }
        if self.prefetch_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "prefetch_limit".to_string(),
                value: "0".to_string(),
                reason: "must buffer at least one delivery".to_string(),
            });
        }
        self.connection_config().validate()
    }

    /// Timing for [`Connection::open_with_config`](crate::Connection::open_with_config).
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            heartbeat_ttl: Duration::from_secs(self.heartbeat_ttl_secs),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            scan_interval: Duration::from_secs(self.scan_interval_secs),
        }
    }

    /// Delay between ready-list polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
