//! Process configuration loaded from `EVALORCH_*` environment variables.
//!
//! | variable | default |
//! |---|---|
//! | `EVALORCH_BATCH_CONCURRENCY` | 10 |
//! | `EVALORCH_CALLBACK_DEBOUNCE_MS` | 3000 |
//! | `EVALORCH_TRAJECTORY_EXTRACT_INTERVAL_MS` | 0 |
//! | `EVALORCH_CONTEXT_TTL_SECS` | 86400 |
//! | `EVALORCH_REAPER_INTERVAL_SECS` | 60 |
//! | `EVALORCH_LOG_FORMAT` | `text` (`json` for JSON lines) |
//! | `EVALORCH_LOG_LEVEL` | `info` |

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::Level;

pub const DEFAULT_BATCH_CONCURRENCY: usize = 10;
pub const DEFAULT_CALLBACK_DEBOUNCE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Worker limit for batch evaluator debugging.
    pub batch_concurrency: usize,
    /// Delay applied before republishing a callback's downstream event.
    pub callback_debounce: Duration,
    /// Extra delay added on top of the debounce.
    pub trajectory_extract_interval: Duration,
    /// Lifetime of a stored correlation context.
    pub context_ttl: Duration,
    /// How often the daemon purges expired contexts.
    pub reaper_interval: Duration,
    pub log_json: bool,
    pub log_level: Level,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            callback_debounce: DEFAULT_CALLBACK_DEBOUNCE,
            trajectory_extract_interval: Duration::ZERO,
            context_ttl: evalorch_state::DEFAULT_CONTEXT_TTL,
            reaper_interval: Duration::from_secs(60),
            log_json: false,
            log_level: Level::INFO,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults;
    /// malformed values are an error naming the key.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let batch_concurrency = parse_or(
            &lookup,
            "EVALORCH_BATCH_CONCURRENCY",
            defaults.batch_concurrency,
        )?;
        let callback_debounce = parse_or(&lookup, "EVALORCH_CALLBACK_DEBOUNCE_MS", 3_000u64)
            .map(Duration::from_millis)?;
        let trajectory_extract_interval =
            parse_or(&lookup, "EVALORCH_TRAJECTORY_EXTRACT_INTERVAL_MS", 0u64)
                .map(Duration::from_millis)?;
        let context_ttl = parse_or(
            &lookup,
            "EVALORCH_CONTEXT_TTL_SECS",
            defaults.context_ttl.as_secs(),
        )
        .map(Duration::from_secs)?;
        let reaper_interval = parse_or(
            &lookup,
            "EVALORCH_REAPER_INTERVAL_SECS",
            defaults.reaper_interval.as_secs(),
        )
        .map(Duration::from_secs)?;

        let log_json = match lookup("EVALORCH_LOG_FORMAT").as_deref() {
            None | Some("text") => false,
            Some("json") => true,
            Some(other) => return Err(anyhow!("EVALORCH_LOG_FORMAT: unknown format {other:?}")),
        };
        let log_level = match lookup("EVALORCH_LOG_LEVEL") {
            Some(raw) => Level::from_str(&raw)
                .map_err(|e| anyhow!("EVALORCH_LOG_LEVEL: {e}"))?,
            None => defaults.log_level,
        };

        if reaper_interval.is_zero() {
            return Err(anyhow!("EVALORCH_REAPER_INTERVAL_SECS must be positive"));
        }

        Ok(Self {
            batch_concurrency,
            callback_debounce,
            trajectory_extract_interval,
            context_ttl,
            reaper_interval,
            log_json,
            log_level,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key}: invalid value {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = OrchestratorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.batch_concurrency, 10);
        assert_eq!(config.callback_debounce, Duration::from_secs(3));
    }

    #[test]
    fn test_overrides() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            ("EVALORCH_BATCH_CONCURRENCY", "4"),
            ("EVALORCH_CALLBACK_DEBOUNCE_MS", "1500"),
            ("EVALORCH_TRAJECTORY_EXTRACT_INTERVAL_MS", "500"),
            ("EVALORCH_CONTEXT_TTL_SECS", "60"),
            ("EVALORCH_LOG_FORMAT", "json"),
            ("EVALORCH_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.batch_concurrency, 4);
        assert_eq!(config.callback_debounce, Duration::from_millis(1500));
        assert_eq!(config.trajectory_extract_interval, Duration::from_millis(500));
        assert_eq!(config.context_ttl, Duration::from_secs(60));
        assert!(config.log_json);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_malformed_value_names_key() {
        let err = OrchestratorConfig::from_lookup(lookup(&[("EVALORCH_BATCH_CONCURRENCY", "ten")]))
            .unwrap_err();
        assert!(err.to_string().contains("EVALORCH_BATCH_CONCURRENCY"));

        let err = OrchestratorConfig::from_lookup(lookup(&[("EVALORCH_LOG_FORMAT", "xml")]))
            .unwrap_err();
        assert!(err.to_string().contains("EVALORCH_LOG_FORMAT"));
    }

    #[test]
    fn test_zero_reaper_interval_rejected() {
        assert!(
            OrchestratorConfig::from_lookup(lookup(&[("EVALORCH_REAPER_INTERVAL_SECS", "0")]))
                .is_err()
        );
    }
}
