//! Event store statistics

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Statistics for one stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStats {
    pub stream_id: String,
    /// Events held in memory
    pub resident_events: usize,
    /// Sequence the next event will get, when the stream is resident
    pub next_seq: Option<u64>,
    /// Events dropped from memory since the stream became resident
    pub evicted_from_memory: u64,
    /// Event files on disk
    pub on_disk: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Aggregate event store statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventStoreStats {
    pub streams: Vec<StreamStats>,
    pub resident_streams: usize,
    pub resident_events: usize,
    pub max_events_per_stream: usize,
    pub max_total_events: usize,
    /// Events waiting for the next flush
    pub pending_writes: usize,
    pub events_stored: u64,
    /// Events dropped because their stream was full
    pub stream_evictions: u64,
    /// Events dropped because the global cap was reached
    pub global_evictions: u64,
    /// Streams purged after their TTL
    pub expired_streams: u64,
    pub encrypted: bool,
}

impl EventStoreStats {
    /// Events on disk across all streams
    pub fn total_on_disk(&self) -> usize {
        self.streams.iter().map(|stream| stream.on_disk).sum()
    }
}
