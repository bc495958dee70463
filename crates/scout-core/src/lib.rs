//! Scout core library
//!
//! Shared building blocks for the Scout request cache and event log:
//! the unified error model, layered configuration, the persistence contract
//! with atomic file writes, and the two-layer persistent cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod persistence;

pub use cache::{CacheEntry, CacheKey, CacheOptions, CacheStatistics, EntryState, PersistentCache};
pub use config::{ScoutConfig, load_config};
pub use error::{ResultExt, ScoutError, ScoutResult, UnifiedError};
pub use persistence::{CachePersistenceManager, PersistScope, PersistenceManager, Readiness};
