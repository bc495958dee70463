//! Environment variable-based configuration overrides

use super::logging_config::LogFormat;
use super::model::ScoutConfig;
use crate::error::{ScoutError, ScoutResult};
use humantime_serde::re::humantime;
use std::path::PathBuf;
use std::time::Duration;

/// Apply `SCOUT_*` overrides from the process environment
pub fn apply_env_overrides(config: &mut ScoutConfig) -> ScoutResult<()> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

/// Apply `SCOUT_*` overrides from an arbitrary variable source
pub fn apply_overrides_from<F>(config: &mut ScoutConfig, lookup: F) -> ScoutResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup("SCOUT_STORAGE_PATH") {
        config.storage_path = PathBuf::from(path);
    }

    if let Some(value) = lookup("SCOUT_EAGER_LOADING") {
        config.eager_loading = parse_bool("SCOUT_EAGER_LOADING", &value)?;
    }

    if let Some(value) = lookup("SCOUT_CACHE_DEFAULT_TTL") {
        config.cache.default_ttl = parse_duration("SCOUT_CACHE_DEFAULT_TTL", &value)?;
    }

    if let Some(value) = lookup("SCOUT_CACHE_MAX_SIZE") {
        config.cache.max_size = parse_usize("SCOUT_CACHE_MAX_SIZE", &value)?;
    }

    if let Some(value) = lookup("SCOUT_MAX_EVENTS_PER_STREAM") {
        config.events.max_events_per_stream = parse_usize("SCOUT_MAX_EVENTS_PER_STREAM", &value)?;
    }

    if let Some(value) = lookup("SCOUT_EVENT_TTL") {
        config.events.event_ttl = parse_duration("SCOUT_EVENT_TTL", &value)?;
    }

    if let Some(value) = lookup("SCOUT_PERSISTENCE_INTERVAL") {
        let interval = parse_duration("SCOUT_PERSISTENCE_INTERVAL", &value)?;
        config.cache.persistence_interval = interval;
        config.events.persistence_interval = interval;
    }

    if let Some(key) = lookup("SCOUT_EVENT_KEY") {
        if !key.trim().is_empty() {
            config.encryption.key = Some(key.trim().to_string());
            config.encryption.enabled = true;
        }
    }

    if let Some(level) = lookup("SCOUT_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Some(value) = lookup("SCOUT_LOG_FORMAT") {
        config.logging.format = value
            .parse::<LogFormat>()
            .map_err(|e| ScoutError::config_with_context(e, "SCOUT_LOG_FORMAT"))?;
    }

    Ok(())
}

fn parse_bool(name: &str, value: &str) -> ScoutResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ScoutError::config(format!("Invalid {} value: {}", name, value))),
    }
}

fn parse_usize(name: &str, value: &str) -> ScoutResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| ScoutError::config(format!("Invalid {} value: {}", name, value)))
}

fn parse_duration(name: &str, value: &str) -> ScoutResult<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| ScoutError::config(format!("Invalid {} value '{}': {}", name, value, e)))
}
