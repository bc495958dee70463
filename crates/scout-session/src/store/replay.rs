//! Replay items

use crate::event::{EventPayload, EventRecord};
use chrono::{DateTime, Utc};
use scout_core::error::ScoutError;
use serde::Serialize;

/// One event handed to a replay callback
#[derive(Debug, Clone)]
pub struct ReplayedEvent {
    pub event_id: String,
    pub stream_id: String,
    pub seq: u64,
    pub stored_at: DateTime<Utc>,
    /// The message, or a `Decryption` error for an event that could not be
    /// read back
    pub message: Result<serde_json::Value, ScoutError>,
}

impl ReplayedEvent {
    pub fn is_readable(&self) -> bool {
        self.message.is_ok()
    }
}

impl From<EventRecord> for ReplayedEvent {
    fn from(record: EventRecord) -> Self {
        let event_id = record.id.to_string();
        let message = match record.payload {
            EventPayload::Message(message) => Ok(message),
            EventPayload::Unreadable { reason } => Err(ScoutError::decryption(&event_id, reason)),
        };
        Self {
            stream_id: record.id.stream_id().to_string(),
            seq: record.id.seq(),
            stored_at: record.stored_at,
            event_id,
            message,
        }
    }
}

/// Outcome of a replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub stream_id: String,
    /// Events handed to the callback
    pub delivered: usize,
    /// Delivered events whose message could not be read
    pub undecryptable: usize,
    /// Whether the disk layer had to be consulted
    pub from_disk: bool,
}
