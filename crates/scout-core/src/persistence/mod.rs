//! Disk persistence shared by the cache and the event store
//!
//! Every manager follows the same contract: `initialize()` brings the storage
//! root up and opens a [`Readiness`] gate, every other operation awaits that
//! gate, and every write lands through [`atomic::atomic_write`] so a reader
//! never observes a half-written file.

pub mod atomic;
pub mod cache_files;
pub mod readiness;

pub use atomic::{atomic_write, atomic_write_sync, is_temp_file, read_json, write_json};
pub use cache_files::{CachePersistenceManager, PersistScope};
pub use readiness::Readiness;

use crate::error::{ScoutError, ScoutResult};
use async_trait::async_trait;

/// Maximum length of a namespace or stream id used as a directory name
pub const MAX_COMPONENT_LEN: usize = 128;

/// Persistence contract for one kind of record
#[async_trait]
pub trait PersistenceManager: Send + Sync {
    /// Logical key of a record
    type Key: Send + Sync;
    /// Record stored under a key
    type Record: Send + Sync;

    /// Readiness gate opened by `initialize`
    fn readiness(&self) -> &Readiness;

    /// Create the storage root and clean up after interrupted writes.
    /// Idempotent once it has succeeded.
    async fn initialize(&self) -> ScoutResult<()>;

    /// Wait until `initialize` has completed
    async fn ready(&self) -> ScoutResult<()> {
        self.readiness().wait().await
    }

    /// Persist one record atomically
    async fn save(&self, key: &Self::Key, record: &Self::Record) -> ScoutResult<()>;

    /// Load one record; a key that was never persisted yields `None`
    async fn load(&self, key: &Self::Key) -> ScoutResult<Option<Self::Record>>;

    /// Load every persisted record
    async fn load_all(&self) -> ScoutResult<Vec<Self::Record>>;

    /// Remove one record; removing a missing record is not an error
    async fn delete(&self, key: &Self::Key) -> ScoutResult<()>;

    /// Remove every record
    async fn clear(&self) -> ScoutResult<()>;
}

/// Check that a namespace or stream id is safe to use as a single path component
pub fn validate_component(kind: &str, value: &str) -> ScoutResult<()> {
    if value.is_empty() {
        return Err(ScoutError::invalid_input_field(
            format!("{} must not be empty", kind),
            kind,
        ));
    }
    if value.len() > MAX_COMPONENT_LEN {
        return Err(ScoutError::invalid_input_field(
            format!("{} exceeds {} bytes", kind, MAX_COMPONENT_LEN),
            kind,
        ));
    }
    if value.starts_with('.') {
        return Err(ScoutError::invalid_input_field(
            format!("{} must not start with '.'", kind),
            kind,
        ));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(ScoutError::invalid_input_field(
            format!("{} contains invalid character {:?}", kind, c),
            kind,
        ));
    }
    Ok(())
}
