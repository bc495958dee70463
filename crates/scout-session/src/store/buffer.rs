//! Resident window of one stream

use crate::event::{EventId, EventRecord};
use crate::storage::StreamTail;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// In-memory events of one stream.
///
/// Every event with a sequence at or above `floor` is resident; older
/// events may exist on disk only.
#[derive(Debug)]
pub(crate) struct StreamBuffer {
    stream_id: String,
    events: VecDeque<EventRecord>,
    next_seq: u64,
    floor: u64,
    evicted: u64,
    last_activity: DateTime<Utc>,
}

impl StreamBuffer {
    /// Buffer for a stream with no history
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            events: VecDeque::new(),
            next_seq: 1,
            floor: 1,
            evicted: 0,
            last_activity: Utc::now(),
        }
    }

    /// Buffer resuming a persisted stream
    pub fn from_tail(stream_id: impl Into<String>, tail: StreamTail) -> Self {
        let next_seq = tail.last_seq.map_or(1, |seq| seq + 1);
        let floor = tail.events.first().map_or(next_seq, |record| record.seq());
        let last_activity = tail
            .events
            .last()
            .map_or_else(Utc::now, |record| record.stored_at);

        Self {
            stream_id: stream_id.into(),
            events: tail.events.into(),
            next_seq,
            floor,
            evicted: 0,
            last_activity,
        }
    }

    /// Append a message under the next sequence
    pub fn append(&mut self, message: serde_json::Value) -> EventRecord {
        let record = EventRecord::new(EventId::new(self.stream_id.clone(), self.next_seq), message);
        self.next_seq += 1;
        self.last_activity = record.stored_at;
        self.events.push_back(record.clone());
        record
    }

    /// Drop the oldest events beyond `max`; returns how many were dropped
    pub fn trim(&mut self, max: usize) -> usize {
        let mut dropped = 0;
        while self.events.len() > max {
            if self.pop_oldest().is_none() {
                break;
            }
            dropped += 1;
        }
        dropped
    }

    /// Remove the oldest resident event
    pub fn pop_oldest(&mut self) -> Option<EventRecord> {
        let record = self.events.pop_front()?;
        self.floor = record.seq() + 1;
        self.evicted += 1;
        Some(record)
    }

    pub fn oldest(&self) -> Option<&EventRecord> {
        self.events.front()
    }

    /// Whether every event after `seq` is resident
    pub fn covers_after(&self, seq: u64) -> bool {
        self.floor <= seq.saturating_add(1)
    }

    /// Resident events with a sequence greater than `seq`
    pub fn events_after(&self, seq: u64) -> Vec<EventRecord> {
        self.events
            .iter()
            .filter(|record| record.seq() > seq)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_and_trim() {
        let mut buffer = StreamBuffer::new("s1");
        for n in 0..5 {
            buffer.append(json!(n));
        }
        assert_eq!(buffer.trim(3), 2);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.oldest().map(|r| r.seq()), Some(3));
        assert_eq!(buffer.next_seq(), 6);
        assert_eq!(buffer.evicted(), 2);

        assert!(buffer.covers_after(2));
        assert!(buffer.covers_after(4));
        assert!(!buffer.covers_after(1));
        assert_eq!(buffer.events_after(4).len(), 1);
    }

    #[test]
    fn test_new_stream_covers_everything() {
        let mut buffer = StreamBuffer::new("s1");
        buffer.append(json!("a"));
        assert!(buffer.covers_after(0));
    }

    #[test]
    fn test_resume_from_tail() {
        let events = (8..=10)
            .map(|seq| EventRecord::new(EventId::new("s1", seq), json!(seq)))
            .collect();
        let tail = StreamTail {
            events,
            on_disk: 10,
            last_seq: Some(10),
        };

        let mut buffer = StreamBuffer::from_tail("s1", tail);
        assert_eq!(buffer.next_seq(), 11);
        assert!(buffer.covers_after(7));
        assert!(!buffer.covers_after(6));
        assert_eq!(buffer.append(json!("next")).seq(), 11);
    }
}
