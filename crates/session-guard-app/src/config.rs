//! Environment-driven runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use session_guard_auth::validate_provider_endpoint;
use session_guard_monitor::{MonitorConfig, WarningConfig};
use thiserror::Error;
use url::Url;

/// Identity provider base URL (HTTPS).
pub const ENV_PROVIDER_URL: &str = "SESSION_GUARD_PROVIDER_URL";
/// Prefix for persisted token keys.
pub const ENV_STORAGE_NAMESPACE: &str = "SESSION_GUARD_STORAGE_NAMESPACE";
/// JSON file holding persisted tokens; in-memory storage when unset.
pub const ENV_STORAGE_PATH: &str = "SESSION_GUARD_STORAGE_PATH";
/// Monitor tick in milliseconds.
pub const ENV_TICK_INTERVAL_MS: &str = "SESSION_GUARD_TICK_INTERVAL_MS";
/// Warning threshold in milliseconds.
pub const ENV_WARNING_THRESHOLD_MS: &str = "SESSION_GUARD_WARNING_THRESHOLD_MS";
/// Re-arm threshold in milliseconds.
pub const ENV_REARM_THRESHOLD_MS: &str = "SESSION_GUARD_REARM_THRESHOLD_MS";

/// Validated runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionGuardConfig {
    /// Identity provider base URL, when talking to a remote provider.
    pub provider_url: Option<Url>,
    /// Token key namespace.
    pub storage_namespace: Option<String>,
    /// Token file path; `None` keeps tokens in memory.
    pub storage_path: Option<PathBuf>,
    /// Session monitor timing.
    pub monitor: MonitorConfig,
    /// Warning controller timing.
    pub warning: WarningConfig,
}

impl SessionGuardConfig {
    /// Reads configuration from process environment variables.
    ///
    /// # Errors
    /// See [`Self::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`.
    ///
    /// Unset or blank values fall back to defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for an invalid provider URL, an unparseable or
    /// zero duration, or thresholds the monitor rejects.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let provider_url = value(ENV_PROVIDER_URL)
            .map(|raw| {
                validate_provider_endpoint(&raw).map_err(|error| ConfigError::Invalid {
                    key: ENV_PROVIDER_URL,
                    message: error.message().to_string(),
                })
            })
            .transpose()?;

        let defaults = MonitorConfig::default();
        let tick_interval = millis(ENV_TICK_INTERVAL_MS, value(ENV_TICK_INTERVAL_MS))?
            .unwrap_or(defaults.tick_interval());
        let warning_threshold = millis(ENV_WARNING_THRESHOLD_MS, value(ENV_WARNING_THRESHOLD_MS))?
            .unwrap_or(defaults.warning_threshold());
        let rearm_threshold = millis(ENV_REARM_THRESHOLD_MS, value(ENV_REARM_THRESHOLD_MS))?
            .unwrap_or(WarningConfig::default().rearm_threshold());

        Ok(Self {
            provider_url,
            storage_namespace: value(ENV_STORAGE_NAMESPACE),
            storage_path: value(ENV_STORAGE_PATH).map(PathBuf::from),
            monitor: MonitorConfig::new(tick_interval, warning_threshold)
                .map_err(|error| ConfigError::Monitor(error.to_string()))?,
            warning: WarningConfig::new(rearm_threshold)
                .map_err(|error| ConfigError::Monitor(error.to_string()))?,
        })
    }
}

fn millis(key: &'static str, raw: Option<String>) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            message: "must be greater than zero".to_string(),
        }),
        Ok(ms) => Ok(Some(Duration::from_millis(ms))),
        Err(error) => Err(ConfigError::Invalid {
            key,
            message: format!("expected milliseconds: {error}"),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment value could not be used.
    #[error("invalid {key}: {message}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Reason.
        message: String,
    },
    /// Values parsed but the monitor rejected them.
    #[error("invalid monitor settings: {0}")]
    Monitor(String),
}
