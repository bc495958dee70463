//! Two-layer request cache
//!
//! An LRU-bounded memory layer sits in front of the hybrid disk layer in
//! [`crate::persistence::CachePersistenceManager`]. Values are keyed by
//! namespace and a canonical hash of the request arguments, computed at most
//! once per key at a time, and optionally served stale while a background
//! refresh runs.

pub mod key;
mod persistent;
mod single_flight;
pub mod types;

pub use key::{canonical_hash, canonical_string};
pub use persistent::PersistentCache;
pub use types::{CacheEntry, CacheKey, CacheOptions, CacheStatistics, EntryState};

#[cfg(test)]
mod tests;
