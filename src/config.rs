//! Engine configuration.
//!
//! Everything is read from the environment (the binary honors a `.env`
//! file) and validated up front: a missing or malformed value fails startup
//! with a [`ConfigError`] instead of failing a fetch later.

use crate::error::ConfigError;

const VIDEO_FEED_URL: &str = "MASQ_VIDEO_FEED_URL";
const COUNT_URL: &str = "MASQ_COUNT_URL";
const STORE_URL: &str = "MASQ_STORE_URL";
const STORE_KEY: &str = "MASQ_STORE_KEY";
const STORE_TABLE: &str = "MASQ_STORE_TABLE";
const PROBE_INTERVAL: &str = "MASQ_PROBE_INTERVAL_SECS";

const DEFAULT_TABLE: &str = "observations";
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 2;

/// Connection settings for the remote observation store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub table: String,
    /// How often the change probe polls, in seconds.
    pub probe_interval_secs: u64,
}

/// Full engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The detector's multipart image stream (consumed opaquely).
    pub video_feed_url: String,
    /// The detector's live count endpoint.
    pub count_url: String,
    pub store: StoreConfig,
}

impl Config {
    /// Loads and validates configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let video_feed_url = require_url(&lookup, VIDEO_FEED_URL)?;
        let count_url = require_url(&lookup, COUNT_URL)?;
        let base_url = require_url(&lookup, STORE_URL)?;

        let api_key = lookup(STORE_KEY).ok_or(ConfigError::MissingVar(STORE_KEY))?;
        let table = lookup(STORE_TABLE).unwrap_or_else(|| DEFAULT_TABLE.to_string());

        let probe_interval_secs = match lookup(PROBE_INTERVAL) {
            // Zero would mean a busy-loop against the store; reject it.
            Some(raw) => match raw.parse() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        name: PROBE_INTERVAL,
                        value: raw,
                    });
                }
            },
            None => DEFAULT_PROBE_INTERVAL_SECS,
        };

        Ok(Self {
            video_feed_url,
            count_url,
            store: StoreConfig {
                base_url,
                api_key,
                table,
                probe_interval_secs,
            },
        })
    }
}

fn require_url(
    lookup: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    let value = lookup(name).ok_or(ConfigError::MissingVar(name))?;
    value
        .parse::<reqwest::Url>()
        .map_err(|_| ConfigError::InvalidUrl {
            name,
            value: value.clone(),
        })?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> = pairs
            .iter()
            .map(|(name, value)| (*name, value.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn complete() -> Vec<(&'static str, &'static str)> {
        vec![
            (VIDEO_FEED_URL, "http://detector.local/video"),
            (COUNT_URL, "http://detector.local/counts"),
            (STORE_URL, "https://store.example.com"),
            (STORE_KEY, "secret"),
        ]
    }

    #[test]
    fn test_complete_config_loads_with_defaults() {
        let config = Config::from_lookup(env(&complete())).unwrap();
        assert_eq!(config.store.table, "observations");
        assert_eq!(config.store.probe_interval_secs, 2);
        assert_eq!(config.count_url, "http://detector.local/counts");
    }

    #[test]
    fn test_missing_variable_fails_fast() {
        let mut pairs = complete();
        pairs.retain(|(name, _)| *name != STORE_KEY);

        let err = Config::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(STORE_KEY)));
    }

    #[test]
    fn test_invalid_url_fails_fast() {
        let mut pairs = complete();
        pairs.retain(|(name, _)| *name != STORE_URL);
        pairs.push((STORE_URL, "not a url"));

        let err = Config::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { name: STORE_URL, .. }));
    }

    #[test]
    fn test_overrides_are_honored() {
        let mut pairs = complete();
        pairs.push((STORE_TABLE, "readings"));
        pairs.push((PROBE_INTERVAL, "10"));

        let config = Config::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.store.table, "readings");
        assert_eq!(config.store.probe_interval_secs, 10);
    }

    #[test]
    fn test_bad_probe_interval_is_rejected() {
        for bad in ["soon", "0", "-1"] {
            let mut pairs = complete();
            pairs.push((PROBE_INTERVAL, bad));

            let err = Config::from_lookup(env(&pairs)).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidNumber { name: PROBE_INTERVAL, .. }
            ));
        }
    }
}
