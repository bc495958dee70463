//! Configuration data structures

use super::logging_config::LoggingConfig;
use crate::error::{ScoutError, ScoutResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default storage directory name under the user's home directory
pub const DEFAULT_STORAGE_DIR: &str = ".scout";

/// Namespace pattern that marks every namespace as persistent
pub const ALL_NAMESPACES: &str = "*";

/// A duration written in humantime form (`"30s"`, `"5m"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HumanDuration(#[serde(with = "humantime_serde")] pub Duration);

impl From<Duration> for HumanDuration {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

/// Top-level Scout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    /// Root directory for all persisted state
    pub storage_path: PathBuf,
    /// Load everything into memory at startup instead of lazily
    pub eager_loading: bool,
    /// Request cache settings
    pub cache: CacheConfig,
    /// Event store settings
    pub events: EventConfig,
    /// At-rest encryption of stored events
    pub encryption: EncryptionConfig,
    /// Redaction of sensitive message fields
    pub sanitization: SanitizationConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        let storage_path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_STORAGE_DIR)
            .join("storage");

        Self {
            storage_path,
            eager_loading: true,
            cache: CacheConfig::default(),
            events: EventConfig::default(),
            encryption: EncryptionConfig::default(),
            sanitization: SanitizationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ScoutConfig {
    /// Create a configuration rooted at the given storage path
    pub fn with_storage_path(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Default::default()
        }
    }

    /// Directory holding cache entry files
    pub fn cache_dir(&self) -> PathBuf {
        self.storage_path.join("cache")
    }

    /// Directory holding one sub-directory per event stream
    pub fn events_dir(&self) -> PathBuf {
        self.storage_path.join("events")
    }

    /// Validate the configuration
    pub fn validate(&self) -> ScoutResult<()> {
        if self.storage_path.as_os_str().is_empty() {
            return Err(ScoutError::config("storage_path must not be empty"));
        }
        self.cache.validate()?;
        self.events.validate()?;
        if self.encryption.enabled && self.encryption.key.is_none() {
            return Err(ScoutError::config_with_context(
                "encryption is enabled but no key is configured",
                "set encryption.key or SCOUT_EVENT_KEY",
            ));
        }
        if !self.logging.is_valid_level() {
            return Err(ScoutError::config(format!(
                "invalid logging level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// Request cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a call supplies none and the namespace has no override
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Maximum number of resident entries
    pub max_size: usize,
    /// Namespaces flushed to disk on every write
    pub critical_namespaces: Vec<String>,
    /// Namespaces flushed on the persistence interval; `"*"` means all
    pub persistent_namespaces: Vec<String>,
    /// Per-namespace TTL overrides
    pub namespace_ttls: HashMap<String, HumanDuration>,
    /// Flush interval for non-critical persistent namespaces
    #[serde(with = "humantime_serde")]
    pub persistence_interval: Duration,
    /// Sweep interval for expired entries
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Entry files read per sweep when purging expired entries from disk
    pub purge_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_size: 1000,
            critical_namespaces: Vec::new(),
            persistent_namespaces: vec![ALL_NAMESPACES.to_string()],
            namespace_ttls: HashMap::new(),
            persistence_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(60),
            purge_batch_size: 256,
        }
    }
}

impl CacheConfig {
    /// TTL for a namespace when the caller did not supply one
    pub fn ttl_for(&self, namespace: &str) -> Duration {
        self.namespace_ttls
            .get(namespace)
            .map(|ttl| ttl.0)
            .unwrap_or(self.default_ttl)
    }

    fn validate(&self) -> ScoutResult<()> {
        if self.max_size == 0 {
            return Err(ScoutError::invalid_input_field(
                "max_size must be greater than zero",
                "cache.max_size",
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(ScoutError::invalid_input_field(
                "default_ttl must be greater than zero",
                "cache.default_ttl",
            ));
        }
        if self.persistence_interval.is_zero() || self.cleanup_interval.is_zero() {
            return Err(ScoutError::invalid_input_field(
                "cache intervals must be greater than zero",
                "cache.persistence_interval",
            ));
        }
        if self.purge_batch_size == 0 {
            return Err(ScoutError::invalid_input_field(
                "purge_batch_size must be greater than zero",
                "cache.purge_batch_size",
            ));
        }
        Ok(())
    }
}

/// Event store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Resident events kept per stream; older ones stay on disk only
    pub max_events_per_stream: usize,
    /// Resident events kept across all streams
    pub max_total_events: usize,
    /// Idle time after which a whole stream is purged
    #[serde(with = "humantime_serde")]
    pub event_ttl: Duration,
    /// Batch flush interval for non-critical streams
    #[serde(with = "humantime_serde")]
    pub persistence_interval: Duration,
    /// Streams flushed to disk on every event
    pub critical_stream_ids: Vec<String>,
    /// Sweep interval for expired streams
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Upper bound for the final flush on shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            max_events_per_stream: 1000,
            max_total_events: 10_000,
            event_ttl: Duration::from_secs(24 * 60 * 60),
            persistence_interval: Duration::from_secs(5),
            critical_stream_ids: Vec::new(),
            cleanup_interval: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl EventConfig {
    fn validate(&self) -> ScoutResult<()> {
        if self.max_events_per_stream == 0 {
            return Err(ScoutError::invalid_input_field(
                "max_events_per_stream must be greater than zero",
                "events.max_events_per_stream",
            ));
        }
        if self.max_total_events == 0 {
            return Err(ScoutError::invalid_input_field(
                "max_total_events must be greater than zero",
                "events.max_total_events",
            ));
        }
        if self.event_ttl.is_zero() {
            return Err(ScoutError::invalid_input_field(
                "event_ttl must be greater than zero",
                "events.event_ttl",
            ));
        }
        if self.persistence_interval.is_zero() || self.cleanup_interval.is_zero() {
            return Err(ScoutError::invalid_input_field(
                "event intervals must be greater than zero",
                "events.persistence_interval",
            ));
        }
        Ok(())
    }
}

/// Encryption of events at rest
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Encrypt event payloads before they are written
    pub enabled: bool,
    /// Base64-encoded 256-bit key
    #[serde(skip_serializing)]
    pub key: Option<String>,
}

/// Redaction of sensitive fields before persistence or logging
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SanitizationConfig {
    /// Field names redacted in addition to the built-in list
    pub extra_sensitive_keys: Vec<String>,
}
