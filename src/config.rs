//! Configuration management and validation.
//!
//! Collection settings are layered: built-in defaults, then an optional JSON
//! config file, then environment variables, then command-line flags (applied
//! by the CLI layer). The result is validated once before collection starts.

use crate::constants::{
    APP_DIR_NAME, DEFAULT_CITY, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SNAPSHOT_INTERVAL_SECS,
    DEFAULT_STALE_AFTER_SECS, city_feed_url, env_vars,
};
use crate::error::{CollectorError, Result};
use crate::persistence::SnapshotFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Settings for the collection loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Station feed to poll
    pub feed_url: String,

    /// Seconds between polls
    pub poll_interval_secs: u64,

    /// Where snapshots are written; no snapshots when unset
    pub snapshot_path: Option<PathBuf>,

    /// Snapshot backend, inferred from the path extension when unset
    pub snapshot_format: Option<SnapshotFormat>,

    /// Seconds between snapshot writes
    pub snapshot_interval_secs: u64,

    /// Fetch twice per tick and skip the tick when the reads differ
    pub verify_fetch: bool,

    /// Ignore stations silent for longer than this many seconds
    pub stale_after_secs: Option<u64>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            feed_url: city_feed_url(DEFAULT_CITY)
                .unwrap_or_default()
                .to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            snapshot_path: None,
            snapshot_format: None,
            snapshot_interval_secs: DEFAULT_SNAPSHOT_INTERVAL_SECS,
            verify_fetch: false,
            stale_after_secs: Some(DEFAULT_STALE_AFTER_SECS),
        }
    }
}

impl CollectorConfig {
    /// `<config dir>/bikeshare-collector/config.json`
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME).join("config.json"))
            .ok_or_else(|| {
                CollectorError::configuration("Could not determine user config directory")
            })
    }

    /// Read a JSON config file; absent keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CollectorError::configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            CollectorError::configuration(format!(
                "Invalid config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Defaults, then `config_file` if given, then the process environment
    pub fn load_layered(config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        debug!("Layered configuration: {:?}", config);
        Ok(config)
    }

    /// Override settings from environment variables looked up through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(env_vars::FEED_URL) {
            self.feed_url = url;
        }
        if let Some(interval) = lookup(env_vars::POLL_INTERVAL) {
            self.poll_interval_secs = interval.trim().parse().map_err(|_| {
                CollectorError::configuration(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    env_vars::POLL_INTERVAL,
                    interval
                ))
            })?;
        }
        if let Some(path) = lookup(env_vars::SNAPSHOT) {
            self.snapshot_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Point the collector at a known city or an explicit URL
    pub fn set_feed(&mut self, city: Option<&str>, url: Option<&str>) -> Result<()> {
        match (city, url) {
            (Some(_), Some(_)) => Err(CollectorError::configuration(
                "Specify either a city or a feed URL, not both",
            )),
            (Some(city), None) => {
                let url = city_feed_url(city).ok_or_else(|| {
                    CollectorError::configuration(format!("Unknown city '{}'", city))
                })?;
                self.feed_url = url.to_string();
                Ok(())
            }
            (None, Some(url)) => {
                self.feed_url = url.to_string();
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn stale_after(&self) -> Option<chrono::Duration> {
        self.stale_after_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(chrono::Duration::seconds)
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if !(self.feed_url.starts_with("http://") || self.feed_url.starts_with("https://")) {
            return Err(CollectorError::configuration(format!(
                "Feed URL must start with http:// or https://, got '{}'",
                self.feed_url
            )));
        }

        if self.poll_interval_secs == 0 {
            return Err(CollectorError::configuration(
                "Poll interval must be greater than 0 seconds",
            ));
        }

        if self.snapshot_path.is_some() && self.snapshot_interval_secs == 0 {
            return Err(CollectorError::configuration(
                "Snapshot interval must be greater than 0 seconds",
            ));
        }

        if let Some(path) = &self.snapshot_path {
            if self.snapshot_format.is_none() && SnapshotFormat::from_path(path).is_none() {
                return Err(CollectorError::configuration(format!(
                    "Cannot infer snapshot format from '{}': use .json, .db or .sqlite",
                    path.display()
                )));
            }
        }

        Ok(())
    }
}
