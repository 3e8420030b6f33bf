//! Application-level configuration loading: event feed endpoints and timeouts.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::{dal::DalOptions, event_feed::FeedConfig};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ATTENDANCE_BADGES_CONFIG_PATH";

const DEFAULT_UPCOMING_URL: &str = "https://api.rocketparty.example/v1/events/upcoming";
const DEFAULT_PAST_URL: &str = "https://api.rocketparty.example/v1/events/past";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Event feed endpoints and request limits.
    pub feed: FeedSettings,
    /// Upper bound for any single store round-trip, writes of preference
    /// transitions included.
    pub store_operation_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Where and how to pull event listings.
pub struct FeedSettings {
    /// Listing of current and upcoming events.
    pub upcoming_url: String,
    /// Listing of historical events.
    pub past_url: String,
    /// Upper bound for one page request.
    pub request_timeout: Duration,
    /// How far back historical events are kept.
    pub history_window_days: u32,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        upcoming_url = %app_config.feed.upcoming_url,
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

    /// Parse a JSON document; absent keys keep their defaults.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Settings for the HTTP event feed client.
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            upcoming_url: self.feed.upcoming_url.clone(),
            past_url: self.feed.past_url.clone(),
            request_timeout: self.feed.request_timeout,
            history_window: time::Duration::days(i64::from(self.feed.history_window_days)),
        }
    }

    /// Settings for the data access layer.
    pub fn dal_options(&self) -> DalOptions {
        DalOptions {
            operation_timeout: self.store_operation_timeout,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    feed: RawFeed,
    store: RawStore,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFeed {
    upcoming_url: Option<String>,
    past_url: Option<String>,
    request_timeout_ms: Option<u64>,
    history_window_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStore {
    operation_timeout_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let feed = FeedSettings {
            upcoming_url: value
                .feed
                .upcoming_url
                .unwrap_or_else(|| DEFAULT_UPCOMING_URL.into()),
            past_url: value
                .feed
                .past_url
                .unwrap_or_else(|| DEFAULT_PAST_URL.into()),
            request_timeout: Duration::from_millis(value.feed.request_timeout_ms.unwrap_or(5_000)),
            history_window_days: value.feed.history_window_days.unwrap_or(730),
        };

        Self {
            feed,
            store_operation_timeout: Duration::from_millis(
                value.store.operation_timeout_ms.unwrap_or(30_000),
            ),
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
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.feed.request_timeout, Duration::from_secs(5));
        assert_eq!(config.feed.history_window_days, 730);
        assert_eq!(config.store_operation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn partial_document_overrides_given_keys() {
        let config = AppConfig::from_json(
            r#"{ "feed": { "past_url": "http://feed/past" }, "store": { "operation_timeout_ms": 250 } }"#,
        )
        .unwrap();
        assert_eq!(config.feed.past_url, "http://feed/past");
        assert_eq!(config.feed.upcoming_url, DEFAULT_UPCOMING_URL);
        assert_eq!(config.dal_options().operation_timeout, Duration::from_millis(250));
    }

    #[test]
    fn history_window_converts_to_days() {
        let config = AppConfig::from_json(r#"{ "feed": { "history_window_days": 10 } }"#).unwrap();
        assert_eq!(config.feed_config().history_window, time::Duration::days(10));
    }
}
