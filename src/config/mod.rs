//! # Configuration
//!
//! Settings for the storage, the click pipeline, the monitor and the short
//! code allocator.
//!
//! ## Sources (later wins)
//! 1. built-in defaults
//! 2. `configs/config.{yaml,toml,json}` (optional)
//! 3. environment variables prefixed with `APP`, sections separated by `__`
//!    (e.g. `APP__ANALYTICS__WORKER_COUNT=8`)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Longest accepted monitor interval (one week).
pub const MAX_MONITOR_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Main application settings.
///
/// # Example
/// ```rust
/// use link_shortener::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.analytics.buffer_size, 1000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// sqlx connection string
    pub database_url: String,

    /// Execution environment
    pub environment: Environment,

    /// Output format of the log subscriber
    pub log_format: LogFormat,

    /// Seconds the ingestion workers get to drain the queue on shutdown
    pub shutdown_grace_secs: u64,

    pub analytics: AnalyticsConfig,

    pub monitor: MonitorConfig,

    pub shortener: ShortenerConfig,
}

/// Click ingestion pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Capacity of the click event queue
    pub buffer_size: usize,

    /// Number of ingestion workers
    pub worker_count: usize,
}

/// Availability monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Minutes between two sweeps
    pub interval_minutes: u64,

    /// Hard timeout of a single liveness probe
    pub probe_timeout_secs: u64,
}

/// Short code allocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortenerConfig {
    pub code_length: usize,

    /// Attempts before the allocator gives up
    pub max_retries: u32,
}

/// Execution environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, multi-line
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/links.db?mode=rwc".to_string(),
            environment: Environment::Development,
            log_format: LogFormat::Pretty,
            shutdown_grace_secs: 5,
            analytics: AnalyticsConfig {
                buffer_size: 1000,
                worker_count: 5,
            },
            monitor: MonitorConfig {
                interval_minutes: 5,
                probe_timeout_secs: 5,
            },
            shortener: ShortenerConfig {
                code_length: 6,
                max_retries: 5,
            },
        }
    }
}

impl Config {
    /// Loads the settings from defaults, the optional config file and the
    /// environment, then validates them.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] if a source is malformed or a value is
    /// out of range.
    pub fn load() -> Result<Self> {
        let defaults = Config::default();

        let settings = config::Config::builder()
            .set_default("database_url", defaults.database_url)?
            .set_default("environment", "development")?
            .set_default("log_format", "pretty")?
            .set_default("shutdown_grace_secs", defaults.shutdown_grace_secs)?
            .set_default("analytics.buffer_size", defaults.analytics.buffer_size as u64)?
            .set_default("analytics.worker_count", defaults.analytics.worker_count as u64)?
            .set_default("monitor.interval_minutes", defaults.monitor.interval_minutes)?
            .set_default("monitor.probe_timeout_secs", defaults.monitor.probe_timeout_secs)?
            .set_default("shortener.code_length", defaults.shortener.code_length as u64)?
            .set_default("shortener.max_retries", defaults.shortener.max_retries)?
            .add_source(config::File::with_name("configs/config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the subsystems cannot run with.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.analytics.buffer_size == 0 {
            return Err(AppError::Config("analytics.buffer_size cannot be 0".to_string()));
        }
        if self.analytics.worker_count == 0 {
            return Err(AppError::Config("analytics.worker_count cannot be 0".to_string()));
        }
        if self.monitor.interval_minutes == 0 {
            return Err(AppError::Config("monitor.interval_minutes cannot be 0".to_string()));
        }
        if self.monitor.interval_minutes > MAX_MONITOR_INTERVAL_MINUTES {
            return Err(AppError::Config(format!(
                "monitor.interval_minutes cannot exceed {}",
                MAX_MONITOR_INTERVAL_MINUTES
            )));
        }
        if self.monitor.probe_timeout_secs == 0 {
            return Err(AppError::Config("monitor.probe_timeout_secs cannot be 0".to_string()));
        }
        if self.shortener.code_length == 0 {
            return Err(AppError::Config("shortener.code_length cannot be 0".to_string()));
        }
        if self.shortener.max_retries == 0 {
            return Err(AppError::Config("shortener.max_retries cannot be 0".to_string()));
        }
        Ok(())
    }

    /// Time between two monitor sweeps.
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_minutes.saturating_mul(60))
    }

    /// Hard timeout of one liveness probe.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.probe_timeout_secs)
    }

    /// Time the click workers get to drain on shutdown.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

// =====================================
// Builder Pattern
// =====================================
/// Programmatic construction of a [`Config`], mostly for tests and embedding.
///
/// # Example
/// ```rust
/// use link_shortener::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .buffer_size(10)
///     .worker_count(2)
///     .build();
/// assert_eq!(config.analytics.worker_count, 2);
/// ```
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Starts from [`Config::default`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Sets the sqlx connection string.
    #[must_use]
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    #[must_use]
    pub fn environment(mut self, env: Environment) -> Self {
        self.config.environment = env;
        self
    }

    #[must_use]
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    /// Sets the click queue capacity.
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.analytics.buffer_size = size;
        self
    }

    /// Sets the number of click workers.
    #[must_use]
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.analytics.worker_count = count;
        self
    }

    /// Sets the minutes between monitor sweeps.
    #[must_use]
    pub fn monitor_interval_minutes(mut self, minutes: u64) -> Self {
        self.config.monitor.interval_minutes = minutes;
        self
    }

    /// Sets the probe timeout in seconds.
    #[must_use]
    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.monitor.probe_timeout_secs = secs;
        self
    }

    /// Sets the length of generated short codes.
    #[must_use]
    pub fn code_length(mut self, length: usize) -> Self {
        self.config.shortener.code_length = length;
        self
    }

    /// Sets the allocation attempts before giving up.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.shortener.max_retries = retries;
        self
    }

    /// Sets the shutdown grace period in seconds.
    #[must_use]
    pub fn shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_grace_secs = secs;
        self
    }

    /// Returns the config without validating it.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }

    /// # Errors
    /// Fails if [`Config::validate`] fails.
    pub fn build_validated(self) -> Result<Config> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

// =====================================
// Tests
// =====================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.analytics.buffer_size, 1000);
        assert_eq!(config.analytics.worker_count, 5);
        assert_eq!(config.monitor_interval(), Duration::from_secs(300));
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.shortener.code_length, 6);
        assert_eq!(config.shortener.max_retries, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .buffer_size(16)
            .worker_count(3)
            .code_length(8)
            .build();

        assert_eq!(config.analytics.buffer_size, 16);
        assert_eq!(config.analytics.worker_count, 3);
        assert_eq!(config.shortener.code_length, 8);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        assert!(ConfigBuilder::new().buffer_size(0).build_validated().is_err());
        assert!(ConfigBuilder::new().worker_count(0).build_validated().is_err());
        assert!(ConfigBuilder::new().monitor_interval_minutes(0).build_validated().is_err());
        assert!(ConfigBuilder::new().max_retries(0).build_validated().is_err());
        assert!(ConfigBuilder::new().code_length(0).build_validated().is_err());
    }

    #[test]
    fn test_oversized_monitor_interval() {
        let config = ConfigBuilder::new().monitor_interval_minutes(u64::MAX).build();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
        assert_eq!(config.monitor_interval(), Duration::from_secs(u64::MAX));

        let week = ConfigBuilder::new()
            .monitor_interval_minutes(MAX_MONITOR_INTERVAL_MINUTES)
            .build_validated()
            .unwrap();
        assert_eq!(week.monitor_interval(), Duration::from_secs(7 * 24 * 3600));
    }
}
