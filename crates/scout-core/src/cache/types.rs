//! Cache types and data structures

use super::key::canonical_hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Cache key identifying one logical request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Key namespace (e.g., "search", "scrape")
    pub namespace: String,
    /// Hex SHA-256 of the canonical form of the request arguments
    pub hash: String,
}

impl CacheKey {
    /// Create a cache key from an already computed hash
    pub fn new(namespace: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            hash: hash.into(),
        }
    }

    /// Derive the key for a namespace and its request arguments
    pub fn from_args(namespace: impl Into<String>, args: &serde_json::Value) -> Self {
        Self::new(namespace, canonical_hash(args))
    }

    /// File name of the persisted entry
    pub fn file_name(&self) -> String {
        format!("{}.json", self.hash)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.hash.get(..12).unwrap_or(&self.hash);
        write!(f, "{}:{}", self.namespace, short)
    }
}

/// Freshness of an entry at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Within its TTL
    Fresh,
    /// Past its TTL but inside the stale-while-revalidate window
    Stale,
    /// Past every horizon
    Expired,
}

/// Cache entry containing a value and its timing metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key the entry is stored under
    pub key: CacheKey,
    /// Cached value
    pub value: serde_json::Value,
    /// When the value was computed
    pub created_at: DateTime<Utc>,
    /// End of the fresh window
    pub expires_at: DateTime<Utc>,
    /// End of the stale window, when stale-while-revalidate was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_until: Option<DateTime<Utc>>,
    /// Last access time
    pub last_accessed: DateTime<Utc>,
    /// Number of times this entry has been served
    #[serde(default)]
    pub access_count: u64,
}

impl CacheEntry {
    /// Create a new entry computed now
    pub fn new(
        key: CacheKey,
        value: serde_json::Value,
        ttl: Duration,
        stale_time: Option<Duration>,
    ) -> Self {
        let now = Utc::now();
        let expires_at = add_duration(now, ttl);
        let stale_until = stale_time.map(|stale| add_duration(expires_at, stale));

        Self {
            key,
            value,
            created_at: now,
            expires_at,
            stale_until,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// State of the entry at `now`
    pub fn state_at(&self, now: DateTime<Utc>) -> EntryState {
        if now < self.expires_at {
            EntryState::Fresh
        } else if self.stale_until.is_some_and(|until| now < until) {
            EntryState::Stale
        } else {
            EntryState::Expired
        }
    }

    /// State of the entry right now
    pub fn state(&self) -> EntryState {
        self.state_at(Utc::now())
    }

    /// Whether the entry is past every horizon
    pub fn is_expired(&self) -> bool {
        self.state() == EntryState::Expired
    }

    /// Last instant at which the entry may still be served
    pub fn horizon(&self) -> DateTime<Utc> {
        self.stale_until.unwrap_or(self.expires_at)
    }

    /// Time left in the fresh window
    pub fn remaining_ttl(&self) -> Option<Duration> {
        (self.expires_at - Utc::now()).to_std().ok()
    }

    /// Mark the entry as served
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
    }
}

fn add_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Per-call cache options
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Fresh window; falls back to the namespace or default TTL
    pub ttl: Option<Duration>,
    /// Serve stale values while recomputing in the background
    pub stale_while_revalidate: bool,
    /// Stale window after the TTL; defaults to the TTL itself
    pub stale_time: Option<Duration>,
    /// Upper bound on a single computation
    pub compute_timeout: Option<Duration>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fresh window
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Enable stale-while-revalidate with an optional stale window
    pub fn with_stale_while_revalidate(mut self, stale_time: Option<Duration>) -> Self {
        self.stale_while_revalidate = true;
        self.stale_time = stale_time;
        self
    }

    /// Bound computations started by this call
    pub fn with_compute_timeout(mut self, timeout: Duration) -> Self {
        self.compute_timeout = Some(timeout);
        self
    }

    /// Stale window to record on new entries
    pub(crate) fn effective_stale_time(&self, ttl: Duration) -> Option<Duration> {
        self.stale_while_revalidate
            .then(|| self.stale_time.unwrap_or(ttl))
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    /// Resident entries
    pub size: usize,
    /// Resident entry limit
    pub max_size: usize,
    /// Requests served from memory or disk
    pub hits: u64,
    /// Requests that had to compute
    pub misses: u64,
    /// Hits that served a stale value
    pub stale_hits: u64,
    /// Entries dropped to respect the size limit
    pub evictions: u64,
    /// Entries dropped because they expired
    pub expirations: u64,
    /// Computations started
    pub computations: u64,
    /// Successful background refreshes
    pub revalidations: u64,
    /// Failed background refreshes
    pub revalidation_failures: u64,
    /// Computations currently running
    pub in_flight: usize,
    /// Writes waiting for the next flush
    pub pending_writes: usize,
}

impl CacheStatistics {
    /// Fraction of requests served without computing
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> CacheKey {
        CacheKey::from_args("search", &json!({"q": "rust"}))
    }

    #[test]
    fn test_entry_states() {
        let entry = CacheEntry::new(
            key(),
            json!("R1"),
            Duration::from_millis(100),
            Some(Duration::from_millis(1000)),
        );
        let created = entry.created_at;

        assert_eq!(entry.state_at(created), EntryState::Fresh);
        assert_eq!(
            entry.state_at(created + chrono::Duration::milliseconds(150)),
            EntryState::Stale
        );
        assert_eq!(
            entry.state_at(created + chrono::Duration::milliseconds(1200)),
            EntryState::Expired
        );
    }

    #[test]
    fn test_entry_without_stale_window_expires_at_ttl() {
        let entry = CacheEntry::new(key(), json!(1), Duration::from_millis(100), None);
        let later = entry.created_at + chrono::Duration::milliseconds(101);
        assert_eq!(entry.state_at(later), EntryState::Expired);
        assert_eq!(entry.horizon(), entry.expires_at);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = CacheEntry::new(key(), json!(1), Duration::from_secs(u64::MAX), None);
        assert_eq!(entry.state(), EntryState::Fresh);
    }

    #[test]
    fn test_stale_time_defaults_to_ttl() {
        let ttl = Duration::from_secs(10);
        assert_eq!(CacheOptions::new().effective_stale_time(ttl), None);
        assert_eq!(
            CacheOptions::new()
                .with_stale_while_revalidate(None)
                .effective_stale_time(ttl),
            Some(ttl)
        );
    }

    #[test]
    fn test_key_display_is_short() {
        let key = key();
        assert_eq!(key.to_string(), format!("search:{}", &key.hash[..12]));
        assert_eq!(key.file_name(), format!("{}.json", key.hash));
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStatistics {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(CacheStatistics::default().hit_rate(), 0.0);
    }
}
