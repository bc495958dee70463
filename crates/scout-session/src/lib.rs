//! Resumable event log for Scout client sessions
//!
//! This crate provides:
//! - Per-session event streams with replay after a given event id
//! - Bounded in-memory buffers backed by one JSON file per event
//! - Optional AES-256-GCM encryption of stored messages
//! - Redaction of credentials before anything is stored or logged

pub mod crypto;
pub mod event;
pub mod storage;
pub mod store;

pub use crypto::{CryptoError, EncryptedEnvelope, MessageCipher, Sanitizer};
pub use event::{EventId, EventPayload, EventRecord};
pub use storage::EventPersistenceManager;
pub use store::{
    EventStoreStats, PersistentEventStore, ReplaySummary, ReplayedEvent, StreamStats,
};
