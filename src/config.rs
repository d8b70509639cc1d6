//! Application-level configuration loading: local data directory, sync cadence and the default
//! match format.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::{services::offline_queue::QueueOptions, state::match_state::MatchFormat};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COURTSIDE_CONFIG_PATH";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Directory holding the local snapshot and queue files.
    pub data_dir: PathBuf,
    /// Period of the background drain tick.
    pub drain_interval: Duration,
    /// Delay between two remote health checks.
    pub health_poll_interval: Duration,
    /// Unclassified failures tolerated before an operation is dead-lettered.
    pub max_unclassified_attempts: u32,
    /// Format used when a match is started without one.
    pub default_format: MatchFormat,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        data_dir = %app_config.data_dir.display(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Queue tuning derived from this configuration.
    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            max_unclassified_attempts: self.max_unclassified_attempts,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            health_poll_interval: DEFAULT_HEALTH_POLL_INTERVAL,
            max_unclassified_attempts: QueueOptions::default().max_unclassified_attempts,
            default_format: MatchFormat::default(),
        }
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    data_dir: Option<PathBuf>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    drain_interval_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    health_poll_interval_ms: Option<Duration>,
    max_unclassified_attempts: Option<u32>,
    default_format: Option<MatchFormat>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: value.data_dir.unwrap_or(defaults.data_dir),
            drain_interval: value.drain_interval_ms.unwrap_or(defaults.drain_interval),
            health_poll_interval: value
                .health_poll_interval_ms
                .unwrap_or(defaults.health_poll_interval),
            max_unclassified_attempts: value
                .max_unclassified_attempts
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.max_unclassified_attempts),
            default_format: value.default_format.unwrap_or(defaults.default_format),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_the_remaining_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{ "data_dir": "/var/lib/courtside", "drain_interval_ms": 2500 }"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/courtside"));
        assert_eq!(config.drain_interval, Duration::from_millis(2_500));
        assert_eq!(config.health_poll_interval, DEFAULT_HEALTH_POLL_INTERVAL);
        assert_eq!(config.default_format, MatchFormat::default());
    }

    #[test]
    fn zero_attempt_budget_falls_back_to_default() {
        let raw: RawConfig = serde_json::from_str(r#"{ "max_unclassified_attempts": 0 }"#).unwrap();
        assert_eq!(
            AppConfig::from(raw).max_unclassified_attempts,
            QueueOptions::default().max_unclassified_attempts
        );
    }

    #[test]
    fn custom_format_is_read_from_file() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "default_format": {
                    "points_per_set": [15],
                    "two_point_margin": false,
                    "side_switch_every": [5],
                    "technical_timeout": null,
                    "timeouts_per_set": 2,
                    "timeout_duration_ms": 60000,
                    "coin_toss_mode": "alternate"
                }
            }"#,
        )
        .unwrap();
        let format = AppConfig::from(raw).default_format;
        assert_eq!(format.points_per_set, vec![15]);
        assert!(!format.two_point_margin);
        assert_eq!(format.timeouts_per_set, 2);
    }
}
