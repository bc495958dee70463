//! Persistent event store
//!
//! Each client session owns a stream of events. The newest events of every
//! active stream stay in memory for cheap replay; everything is written to
//! disk through [`EventPersistenceManager`], so a client can resume after
//! memory eviction or a restart.

mod buffer;
mod replay;
mod stats;

pub use replay::{ReplaySummary, ReplayedEvent};
pub use stats::{EventStoreStats, StreamStats};

use crate::crypto::Sanitizer;
use crate::event::{EventId, EventRecord};
use crate::storage::EventPersistenceManager;
use buffer::StreamBuffer;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scout_core::config::{EventConfig, ScoutConfig};
use scout_core::error::{ScoutError, ScoutResult};
use scout_core::persistence::{PersistenceManager, validate_component};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct Counters {
    stored: AtomicU64,
    stream_evictions: AtomicU64,
    global_evictions: AtomicU64,
    expired_streams: AtomicU64,
}

/// Append-only, replayable event store keyed by stream id
pub struct PersistentEventStore {
    config: EventConfig,
    streams: Mutex<HashMap<String, StreamBuffer>>,
    /// Shared by writers, exclusive for stream removal, so a purge never
    /// races an append to the same stream
    removal_gate: RwLock<()>,
    persistence: Arc<EventPersistenceManager>,
    sanitizer: Sanitizer,
    counters: Counters,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl PersistentEventStore {
    /// Open the store on top of `persistence`.
    ///
    /// Waits for the disk layer, makes persisted streams resident when eager
    /// loading is enabled, then starts the flusher and the TTL sweeper.
    pub async fn open(
        config: &ScoutConfig,
        persistence: Arc<EventPersistenceManager>,
    ) -> ScoutResult<Arc<Self>> {
        persistence.initialize().await?;

        let store = Arc::new(Self {
            config: config.events.clone(),
            streams: Mutex::new(HashMap::new()),
            removal_gate: RwLock::new(()),
            persistence,
            sanitizer: Sanitizer::from_config(&config.sanitization),
            counters: Counters::default(),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });

        if config.eager_loading {
            let loaded = store.load_streams().await.map_err(|e| {
                ScoutError::initialization_with_context(e.to_string(), "loading event streams")
            })?;
            info!(streams = loaded, "event streams loaded from disk");
        }

        store.start_background_tasks();
        Ok(store)
    }

    fn start_background_tasks(self: &Arc<Self>) {
        let flusher = self.persistence.spawn_flusher(self.shutdown.clone());
        let sweeper = spawn_sweeper(
            Arc::downgrade(self),
            self.config.cleanup_interval,
            self.shutdown.clone(),
        );
        self.tasks.lock().extend([flusher, sweeper]);
    }

    async fn load_streams(&self) -> ScoutResult<usize> {
        let streams = self.persistence.list_streams().await?;
        for stream_id in &streams {
            self.ensure_resident(stream_id).await?;
        }
        let mut resident = self.streams.lock();
        self.enforce_global_cap(&mut resident);
        Ok(streams.len())
    }

    /// Make a stream resident, resuming its sequence from disk
    async fn ensure_resident(&self, stream_id: &str) -> ScoutResult<()> {
        if self.streams.lock().contains_key(stream_id) {
            return Ok(());
        }

        let tail = self
            .persistence
            .load_tail(stream_id, self.config.max_events_per_stream)
            .await?;
        let buffer = StreamBuffer::from_tail(stream_id, tail);
        self.streams
            .lock()
            .entry(stream_id.to_string())
            .or_insert(buffer);
        Ok(())
    }

    /// Append a message to a stream and return its event id.
    ///
    /// The message is sanitized first. The disk write is queued; this call
    /// does not wait for it.
    pub async fn store_event(&self, stream_id: &str, message: serde_json::Value) -> ScoutResult<String> {
        validate_component("stream id", stream_id)?;
        let message = self.sanitizer.sanitize_message(message);
        let _gate = self.removal_gate.read().await;
        self.ensure_resident(stream_id).await?;

        let record = {
            let mut streams = self.streams.lock();
            let buffer = streams
                .entry(stream_id.to_string())
                .or_insert_with(|| StreamBuffer::new(stream_id));
            let record = buffer.append(message);

            let trimmed = buffer.trim(self.config.max_events_per_stream);
            if trimmed > 0 {
                self.counters
                    .stream_evictions
                    .fetch_add(trimmed as u64, Ordering::Relaxed);
            }
            self.enforce_global_cap(&mut streams);
            record
        };

        self.persistence.record_write(&record);
        self.counters.stored.fetch_add(1, Ordering::Relaxed);
        debug!(event_id = %record.id, "stored event");
        Ok(record.id.to_string())
    }

    /// Evict the globally oldest events until the total fits the cap
    fn enforce_global_cap(&self, streams: &mut HashMap<String, StreamBuffer>) {
        let mut total: usize = streams.values().map(StreamBuffer::len).sum();
        while total > self.config.max_total_events {
            let victim = streams
                .iter()
                .filter_map(|(stream_id, buffer)| {
                    buffer
                        .oldest()
                        .map(|record| (record.stored_at, record.seq(), stream_id.clone()))
                })
                .min();
            let Some((_, _, stream_id)) = victim else { break };

            if let Some(buffer) = streams.get_mut(&stream_id) {
                buffer.pop_oldest();
            }
            total -= 1;
            self.counters.global_evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Deliver every event of the stream newer than `last_event_id`, in
    /// ascending order.
    ///
    /// Memory serves the replay when it still holds everything after the
    /// id; otherwise the stream is rebuilt from disk and merged with memory.
    /// Events that cannot be read back are delivered as errors without
    /// stopping the replay.
    pub async fn replay_events_after<F>(
        &self,
        last_event_id: &str,
        mut deliver: F,
    ) -> ScoutResult<ReplaySummary>
    where
        F: FnMut(ReplayedEvent) -> ScoutResult<()>,
    {
        let after = EventId::parse(last_event_id)?;
        let stream_id = after.stream_id().to_string();

        let (resident, covered) = {
            let streams = self.streams.lock();
            match streams.get(&stream_id) {
                Some(buffer) => (buffer.events_after(after.seq()), buffer.covers_after(after.seq())),
                None => (Vec::new(), false),
            }
        };

        let (events, from_disk) = if covered {
            (resident, false)
        } else {
            let persisted = self.persistence.load_stream(&stream_id).await.map_err(|e| {
                ScoutError::replay(&stream_id, format!("failed to load stream: {}", e), 0)
            })?;
            let mut merged: BTreeMap<u64, EventRecord> = persisted
                .into_iter()
                .filter(|record| record.seq() > after.seq())
                .map(|record| (record.seq(), record))
                .collect();
            for record in resident {
                merged.insert(record.seq(), record);
            }
            (merged.into_values().collect::<Vec<_>>(), true)
        };

        let mut summary = ReplaySummary {
            stream_id: stream_id.clone(),
            delivered: 0,
            undecryptable: 0,
            from_disk,
        };
        for record in events {
            let event = ReplayedEvent::from(record);
            let readable = event.is_readable();
            deliver(event).map_err(|e| {
                ScoutError::replay(&stream_id, format!("delivery failed: {}", e), summary.delivered)
            })?;
            summary.delivered += 1;
            if !readable {
                summary.undecryptable += 1;
            }
        }

        debug!(
            stream_id = %stream_id,
            after = after.seq(),
            delivered = summary.delivered,
            from_disk,
            "replayed events"
        );
        Ok(summary)
    }

    /// Remove a stream from memory and disk. Returns whether it existed.
    pub async fn delete_stream(&self, stream_id: &str) -> ScoutResult<bool> {
        validate_component("stream id", stream_id)?;
        let _gate = self.removal_gate.write().await;
        let resident = self.streams.lock().remove(stream_id).is_some();
        let persisted = self.persistence.delete_stream(stream_id).await?;
        Ok(resident || persisted)
    }

    /// Every known stream, resident or persisted, sorted
    pub async fn list_streams(&self) -> ScoutResult<Vec<String>> {
        let mut streams: BTreeSet<String> = self.streams.lock().keys().cloned().collect();
        streams.extend(self.persistence.list_streams().await?);
        Ok(streams.into_iter().collect())
    }

    /// Purge every stream idle for longer than the event TTL, from memory
    /// and disk. Returns the number of streams purged.
    pub async fn cleanup_expired_streams(&self) -> ScoutResult<usize> {
        let ttl = chrono::Duration::from_std(self.config.event_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now() - ttl;

        let candidates = self.expired_candidates(cutoff).await?;
        let purged = self.purge_expired(candidates, cutoff).await?;

        if purged > 0 {
            self.counters
                .expired_streams
                .fetch_add(purged as u64, Ordering::Relaxed);
            info!(count = purged, "purged expired event streams");
        }
        Ok(purged)
    }

    /// Streams whose newest event is older than `cutoff`
    async fn expired_candidates(&self, cutoff: DateTime<Utc>) -> ScoutResult<Vec<String>> {
        let mut candidates = Vec::new();
        for stream_id in self.list_streams().await? {
            if self.is_expired(&stream_id, cutoff).await? {
                candidates.push(stream_id);
            }
        }
        Ok(candidates)
    }

    /// Remove the candidates that are still expired once writers are held off
    async fn purge_expired(&self, candidates: Vec<String>, cutoff: DateTime<Utc>) -> ScoutResult<usize> {
        if candidates.is_empty() {
            return Ok(0);
        }

        let _gate = self.removal_gate.write().await;
        let mut purged = 0;
        for stream_id in candidates {
            // A write since the scan revives the stream
            if !self.is_expired(&stream_id, cutoff).await? {
                debug!(stream_id = %stream_id, "stream active again, not purged");
                continue;
            }

            self.streams.lock().remove(&stream_id);
            match self.persistence.delete_stream(&stream_id).await {
                Ok(_) => purged += 1,
                Err(e) => warn!(stream_id = %stream_id, error = %e, "failed to purge expired stream"),
            }
        }
        Ok(purged)
    }

    async fn is_expired(&self, stream_id: &str, cutoff: DateTime<Utc>) -> ScoutResult<bool> {
        let resident = self.streams.lock().get(stream_id).map(StreamBuffer::last_activity);
        if let Some(last_activity) = resident {
            return Ok(last_activity < cutoff);
        }
        let newest = self.persistence.newest_stored_at(stream_id).await?;
        Ok(newest.is_none_or(|at| at < cutoff))
    }

    /// Per-stream and aggregate statistics
    pub async fn get_stats(&self) -> ScoutResult<EventStoreStats> {
        let mut streams: BTreeMap<String, StreamStats> = self
            .streams
            .lock()
            .iter()
            .map(|(stream_id, buffer)| {
                (
                    stream_id.clone(),
                    StreamStats {
                        stream_id: stream_id.clone(),
                        resident_events: buffer.len(),
                        next_seq: Some(buffer.next_seq()),
                        evicted_from_memory: buffer.evicted(),
                        on_disk: 0,
                        last_activity: Some(buffer.last_activity()),
                    },
                )
            })
            .collect();

        for stream_id in self.persistence.list_streams().await? {
            let on_disk = self.persistence.count_on_disk(&stream_id).await?;
            streams
                .entry(stream_id.clone())
                .or_insert_with(|| StreamStats {
                    stream_id,
                    resident_events: 0,
                    next_seq: None,
                    evicted_from_memory: 0,
                    on_disk: 0,
                    last_activity: None,
                })
                .on_disk = on_disk;
        }

        let streams: Vec<StreamStats> = streams.into_values().collect();
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        Ok(EventStoreStats {
            resident_streams: streams.iter().filter(|s| s.next_seq.is_some()).count(),
            resident_events: streams.iter().map(|s| s.resident_events).sum(),
            streams,
            max_events_per_stream: self.config.max_events_per_stream,
            max_total_events: self.config.max_total_events,
            pending_writes: self.persistence.pending_len(),
            events_stored: load(&self.counters.stored),
            stream_evictions: load(&self.counters.stream_evictions),
            global_evictions: load(&self.counters.global_evictions),
            expired_streams: load(&self.counters.expired_streams),
            encrypted: self.persistence.is_encrypted(),
        })
    }

    /// Stop background tasks and write every queued event with blocking
    /// I/O, bounded by the shutdown grace period.
    ///
    /// Returns the number of events written. Calling it again is a no-op.
    pub fn dispose(&self) -> ScoutResult<usize> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }

        self.shutdown.cancel();
        self.tasks.lock().clear();

        let result = self
            .persistence
            .flush_pending_blocking(self.config.shutdown_grace);
        match &result {
            Ok(flushed) => info!(flushed, "event store disposed"),
            Err(e) => error!(error = %e, "event store shutdown flush incomplete"),
        }
        result
    }
}

fn spawn_sweeper(
    store: Weak<PersistentEventStore>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(store) = store.upgrade() else { break };
            if let Err(e) = store.cleanup_expired_streams().await {
                warn!(error = %e, "event stream sweep failed");
            }
        }
        debug!("event sweeper stopped");
    })
}
