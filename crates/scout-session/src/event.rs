//! Event identifiers and records

use chrono::{DateTime, Utc};
use scout_core::error::{ScoutError, ScoutResult};
use scout_core::persistence::validate_component;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Digits in the zero-padded sequence part of an event id
pub const SEQ_WIDTH: usize = 20;

/// Event id of the form `<stream_id>_<seq>`.
///
/// The sequence is zero-padded so ids of one stream sort lexically in
/// event order, and the stream is recoverable from the id alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId {
    stream_id: String,
    seq: u64,
}

impl EventId {
    pub fn new(stream_id: impl Into<String>, seq: u64) -> Self {
        Self {
            stream_id: stream_id.into(),
            seq,
        }
    }

    /// Parse and validate an event id
    pub fn parse(raw: &str) -> ScoutResult<Self> {
        let (stream_id, seq) = raw.rsplit_once('_').ok_or_else(|| {
            ScoutError::invalid_input_field(format!("malformed event id '{}'", raw), "event_id")
        })?;

        if seq.len() != SEQ_WIDTH || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScoutError::invalid_input_field(
                format!("malformed sequence in event id '{}'", raw),
                "event_id",
            ));
        }
        let seq = seq.parse::<u64>().map_err(|_| {
            ScoutError::invalid_input_field(format!("sequence out of range in '{}'", raw), "event_id")
        })?;
        validate_component("stream id", stream_id)?;

        Ok(Self::new(stream_id, seq))
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// File name of the persisted event
    pub fn file_name(&self) -> String {
        format!("{}.json", self)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:0width$}", self.stream_id, self.seq, width = SEQ_WIDTH)
    }
}

impl FromStr for EventId {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Message carried by an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Sanitized plaintext message
    Message(serde_json::Value),
    /// Stored message that could not be decrypted or decoded
    Unreadable { reason: String },
}

/// One event of a stream
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: EventId,
    pub stored_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl EventRecord {
    pub fn new(id: EventId, message: serde_json::Value) -> Self {
        Self {
            id,
            stored_at: Utc::now(),
            payload: EventPayload::Message(message),
        }
    }

    pub fn stream_id(&self) -> &str {
        self.id.stream_id()
    }

    pub fn seq(&self) -> u64 {
        self.id.seq()
    }
}

/// On-disk encoding of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum StoredMessage {
    Plain(serde_json::Value),
    Encrypted(crate::crypto::EncryptedEnvelope),
}

/// On-disk event document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: String,
    pub stream_id: String,
    pub seq: u64,
    pub stored_at: DateTime<Utc>,
    pub message: StoredMessage,
}
