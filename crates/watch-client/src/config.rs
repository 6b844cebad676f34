//! Watch session configuration
//!
//! `WatchConfig` holds the session knobs (cursor, retry limit, delays) and can
//! be loaded from environment variables. Cluster connection settings are not
//! handled here; `KubeTransport` gets them from `kube::Config`.

use crate::error::WatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default delay between reconnect attempts, in seconds
pub const DEFAULT_RETRY_DELAY_SEC: u64 = 10;

/// Default interval after which an idle stream is forcibly restarted, in seconds
pub const DEFAULT_RESYNC_INTERVAL_SEC: u64 = 300;

fn default_retry_delay_sec() -> u64 {
    DEFAULT_RETRY_DELAY_SEC
}

fn default_resync_interval_sec() -> u64 {
    DEFAULT_RESYNC_INTERVAL_SEC
}

/// Watch session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    /// Last processed resource version; the watch resumes from here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Maximum reconnect attempts, `None` for unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_max: Option<u32>,

    /// Fixed delay before each reconnect attempt
    #[serde(default = "default_retry_delay_sec")]
    pub retry_delay_sec: u64,

    /// Restart the stream when no event arrived for this long
    #[serde(default = "default_resync_interval_sec")]
    pub resync_interval_sec: u64,

    /// Ask the server for BOOKMARK events
    #[serde(default)]
    pub allow_watch_bookmarks: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            resource_version: None,
            retry_max: None,
            retry_delay_sec: DEFAULT_RETRY_DELAY_SEC,
            resync_interval_sec: DEFAULT_RESYNC_INTERVAL_SEC,
            allow_watch_bookmarks: false,
        }
    }
}

impl WatchConfig {
    /// Load from `WATCH_*` environment variables, defaulting anything unset
    ///
    /// * `WATCH_RESOURCE_VERSION`
    /// * `WATCH_RETRY_MAX`
    /// * `WATCH_RETRY_DELAY_SEC`
    /// * `WATCH_RESYNC_INTERVAL_SEC`
    /// * `WATCH_ALLOW_BOOKMARKS`
    pub fn from_env() -> Result<Self, WatchError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (used by `from_env`)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WatchError> {
        let defaults = Self::default();
        let config = Self {
            resource_version: lookup("WATCH_RESOURCE_VERSION").filter(|rv| !rv.is_empty()),
            retry_max: parse_var(&lookup, "WATCH_RETRY_MAX")?,
            retry_delay_sec: parse_var(&lookup, "WATCH_RETRY_DELAY_SEC")?
                .unwrap_or(defaults.retry_delay_sec),
            resync_interval_sec: parse_var(&lookup, "WATCH_RESYNC_INTERVAL_SEC")?
                .unwrap_or(defaults.resync_interval_sec),
            allow_watch_bookmarks: parse_var(&lookup, "WATCH_ALLOW_BOOKMARKS")?
                .unwrap_or(defaults.allow_watch_bookmarks),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable by a session
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.resync_interval_sec == 0 {
            return Err(WatchError::InvalidConfig(
                "resyncIntervalSec must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry delay as a `Duration`
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_sec)
    }

    /// Resync interval as a `Duration`
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_sec)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, WatchError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key).filter(|value| !value.trim().is_empty()) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|e| {
            WatchError::InvalidConfig(format!("{} has invalid value {:?}: {}", key, value, e))
        }),
    }
}
