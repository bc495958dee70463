//! Local filesystem event storage

use crate::crypto::MessageCipher;
use crate::event::{EventId, EventPayload, EventRecord, StoredEvent, StoredMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scout_core::config::{EventConfig, ScoutConfig};
use scout_core::error::{ScoutError, ScoutResult};
use scout_core::persistence::atomic::{remove_file_if_exists, remove_stale_temp_files};
use scout_core::persistence::{
    PersistenceManager, Readiness, atomic_write_sync, is_temp_file, read_json, validate_component,
    write_json,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Most recent events of a persisted stream
#[derive(Debug, Clone, Default)]
pub struct StreamTail {
    /// Up to `limit` newest events, ascending
    pub events: Vec<EventRecord>,
    /// Event files on disk
    pub on_disk: usize,
    /// Highest sequence on disk or queued
    pub last_seq: Option<u64>,
}

/// Event persistence manager.
///
/// Writes are queued and flushed by a single background task; events of
/// critical streams wake it immediately. A record stays queued until its
/// file is written, so a final blocking flush at shutdown sees everything
/// that is not yet durable.
pub struct EventPersistenceManager {
    root: PathBuf,
    cipher: Option<Arc<MessageCipher>>,
    critical: HashSet<String>,
    interval: Duration,
    pending: Mutex<BTreeMap<EventId, EventRecord>>,
    flush_lock: tokio::sync::Mutex<()>,
    wake: Notify,
    readiness: Readiness,
}

impl EventPersistenceManager {
    /// Create a manager rooted at `root`; call `initialize` before use
    pub fn new(
        root: impl Into<PathBuf>,
        config: &EventConfig,
        cipher: Option<Arc<MessageCipher>>,
    ) -> Self {
        Self {
            root: root.into(),
            cipher,
            critical: config.critical_stream_ids.iter().cloned().collect(),
            interval: config.persistence_interval,
            pending: Mutex::new(BTreeMap::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            readiness: Readiness::new(),
        }
    }

    /// Create a manager for `config.events_dir()` with the configured cipher
    pub fn from_config(config: &ScoutConfig) -> ScoutResult<Self> {
        let cipher = MessageCipher::from_config(&config.encryption)?.map(Arc::new);
        Ok(Self::new(config.events_dir(), &config.events, cipher))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether messages are encrypted at rest
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn is_critical(&self, stream_id: &str) -> bool {
        self.critical.contains(stream_id)
    }

    fn stream_dir(&self, stream_id: &str) -> PathBuf {
        self.root.join(stream_id)
    }

    fn event_path(&self, id: &EventId) -> PathBuf {
        self.stream_dir(id.stream_id()).join(id.file_name())
    }

    /// Queue an event for the flusher
    pub fn record_write(&self, record: &EventRecord) {
        self.pending.lock().insert(record.id.clone(), record.clone());
        if self.is_critical(record.stream_id()) {
            self.wake.notify_one();
        }
    }

    /// Events queued but not yet written
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    fn pending_for(&self, stream_id: &str) -> Vec<EventRecord> {
        let start = EventId::new(stream_id, 0);
        let end = EventId::new(stream_id, u64::MAX);
        self.pending
            .lock()
            .range(start..=end)
            .map(|(_, record)| record.clone())
            .collect()
    }

    fn encode(&self, record: &EventRecord) -> ScoutResult<StoredEvent> {
        let EventPayload::Message(message) = &record.payload else {
            return Err(ScoutError::invalid_input(format!(
                "event {} has no readable message to persist",
                record.id
            )));
        };

        let message = match &self.cipher {
            Some(cipher) => StoredMessage::Encrypted(cipher.encrypt_message(message).map_err(|e| {
                ScoutError::persistence(format!("failed to encrypt {}: {}", record.id, e))
            })?),
            None => StoredMessage::Plain(message.clone()),
        };

        Ok(StoredEvent {
            event_id: record.id.to_string(),
            stream_id: record.stream_id().to_string(),
            seq: record.seq(),
            stored_at: record.stored_at,
            message,
        })
    }

    fn decode(&self, stored: StoredEvent) -> EventRecord {
        let id = EventId::parse(&stored.event_id)
            .unwrap_or_else(|_| EventId::new(stored.stream_id.clone(), stored.seq));

        let payload = match stored.message {
            StoredMessage::Plain(message) => EventPayload::Message(message),
            StoredMessage::Encrypted(envelope) => match &self.cipher {
                Some(cipher) => match cipher.decrypt_message(&envelope) {
                    Ok(message) => EventPayload::Message(message),
                    Err(e) => EventPayload::Unreadable {
                        reason: e.to_string(),
                    },
                },
                None => EventPayload::Unreadable {
                    reason: "event is encrypted and no key is configured".to_string(),
                },
            },
        };

        EventRecord {
            id,
            stored_at: stored.stored_at,
            payload,
        }
    }

    /// Read one event file. A file that cannot be parsed still yields a
    /// record (marked unreadable) when its name identifies the event.
    async fn read_event(&self, path: &Path) -> Option<EventRecord> {
        match read_json::<StoredEvent>(path).await {
            Ok(Some(stored)) => Some(self.decode(stored)),
            Ok(None) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable event file");
                let id = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| EventId::parse(stem).ok())?;
                Some(EventRecord {
                    id,
                    stored_at: Utc::now(),
                    payload: EventPayload::Unreadable {
                        reason: e.to_string(),
                    },
                })
            }
        }
    }

    async fn write_record(&self, record: &EventRecord) -> ScoutResult<()> {
        let stored = self.encode(record)?;
        write_json(&self.event_path(&record.id), &stored).await
    }

    /// Event files of a stream, ascending by sequence
    async fn list_event_files(&self, stream_id: &str) -> ScoutResult<Vec<(u64, PathBuf)>> {
        let dir = self.stream_dir(stream_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ScoutError::persistence_at(e.to_string(), &dir)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_temp_file(&path) || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let parsed = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| EventId::parse(stem).ok());
            if let Some(id) = parsed.filter(|id| id.stream_id() == stream_id) {
                files.push((id.seq(), path));
            }
        }

        files.sort_by_key(|(seq, _)| *seq);
        Ok(files)
    }

    /// Every persisted and queued event of a stream, ascending
    pub async fn load_stream(&self, stream_id: &str) -> ScoutResult<Vec<EventRecord>> {
        self.ready().await?;

        let mut events = BTreeMap::new();
        for (seq, path) in self.list_event_files(stream_id).await? {
            if let Some(record) = self.read_event(&path).await {
                events.insert(seq, record);
            }
        }
        for record in self.pending_for(stream_id) {
            events.insert(record.seq(), record);
        }

        Ok(events.into_values().collect())
    }

    /// Newest `limit` events of a stream plus its sequence high-water mark
    pub async fn load_tail(&self, stream_id: &str, limit: usize) -> ScoutResult<StreamTail> {
        self.ready().await?;

        let files = self.list_event_files(stream_id).await?;
        let on_disk = files.len();
        let last_disk_seq = files.last().map(|(seq, _)| *seq);

        let mut events = BTreeMap::new();
        for (seq, path) in files.iter().skip(on_disk.saturating_sub(limit)) {
            if let Some(record) = self.read_event(path).await {
                events.insert(*seq, record);
            }
        }
        for record in self.pending_for(stream_id) {
            events.insert(record.seq(), record);
        }

        let last_seq = events.keys().next_back().copied().max(last_disk_seq);
        let skip = events.len().saturating_sub(limit);
        Ok(StreamTail {
            events: events.into_values().skip(skip).collect(),
            on_disk,
            last_seq,
        })
    }

    /// Highest sequence persisted or queued for a stream
    pub async fn last_sequence(&self, stream_id: &str) -> ScoutResult<Option<u64>> {
        self.ready().await?;
        let on_disk = self
            .list_event_files(stream_id)
            .await?
            .last()
            .map(|(seq, _)| *seq);
        let queued = self.pending_for(stream_id).last().map(|record| record.seq());
        Ok(on_disk.max(queued))
    }

    /// Number of event files of a stream
    pub async fn count_on_disk(&self, stream_id: &str) -> ScoutResult<usize> {
        self.ready().await?;
        Ok(self.list_event_files(stream_id).await?.len())
    }

    /// Storage time of the newest persisted or queued event
    pub async fn newest_stored_at(&self, stream_id: &str) -> ScoutResult<Option<DateTime<Utc>>> {
        self.ready().await?;
        if let Some(record) = self.pending_for(stream_id).last() {
            return Ok(Some(record.stored_at));
        }
        match self.list_event_files(stream_id).await?.last() {
            Some((_, path)) => Ok(self.read_event(path).await.map(|record| record.stored_at)),
            None => Ok(None),
        }
    }

    /// Streams with persisted or queued events, sorted
    pub async fn list_streams(&self) -> ScoutResult<Vec<String>> {
        self.ready().await?;

        let mut streams: BTreeSet<String> = self
            .pending
            .lock()
            .keys()
            .map(|id| id.stream_id().to_string())
            .collect();

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(streams.into_iter().collect());
            }
            Err(e) => return Err(ScoutError::persistence_at(e.to_string(), &self.root)),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_component("stream id", name).is_ok() {
                    streams.insert(name.to_string());
                }
            }
        }

        Ok(streams.into_iter().collect())
    }

    /// Remove a stream's queued events and files. Returns whether anything
    /// existed.
    pub async fn delete_stream(&self, stream_id: &str) -> ScoutResult<bool> {
        self.ready().await?;
        let _guard = self.flush_lock.lock().await;

        let dropped = {
            let mut pending = self.pending.lock();
            let before = pending.len();
            pending.retain(|id, _| id.stream_id() != stream_id);
            before - pending.len()
        };

        let dir = self.stream_dir(stream_id);
        let removed_dir = match fs::remove_dir_all(&dir).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(ScoutError::persistence_at(e.to_string(), &dir)),
        };

        debug!(stream_id, dropped, removed_dir, "deleted event stream");
        Ok(dropped > 0 || removed_dir)
    }

    /// Write every queued event. Returns the number written.
    pub async fn flush_pending(&self) -> ScoutResult<usize> {
        self.ready().await?;
        let _guard = self.flush_lock.lock().await;

        let batch: Vec<EventRecord> = self.pending.lock().values().cloned().collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        let mut first_error = None;
        for record in batch {
            match self.write_record(&record).await {
                Ok(()) => {
                    self.pending.lock().remove(&record.id);
                    written += 1;
                }
                Err(e) => {
                    warn!(event_id = %record.id, error = %e, "event flush failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!(written, "flushed events");
        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Write every queued event with blocking I/O, giving up after `grace`.
    ///
    /// Used at shutdown when no runtime may be available to drive the
    /// asynchronous flusher. Returns the number written, or a `Timeout`
    /// naming how many events were left behind.
    pub fn flush_pending_blocking(&self, grace: Duration) -> ScoutResult<usize> {
        let deadline = Instant::now() + grace;
        let batch: Vec<EventRecord> = self.pending.lock().values().cloned().collect();
        let total = batch.len();

        let mut written = 0;
        let mut failed = 0;
        for record in batch {
            if Instant::now() >= deadline {
                let left = total - written - failed;
                return Err(ScoutError::timeout_with_context(
                    grace.as_millis() as u64,
                    format!("{} of {} events not flushed", left, total),
                ));
            }

            let result = self.encode(&record).and_then(|stored| {
                let bytes = serde_json::to_vec_pretty(&stored)?;
                atomic_write_sync(&self.event_path(&record.id), &bytes)
            });
            match result {
                Ok(()) => {
                    self.pending.lock().remove(&record.id);
                    written += 1;
                }
                Err(e) => {
                    error!(event_id = %record.id, error = %e, "final event flush failed");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(ScoutError::persistence(format!(
                "{} of {} events failed to flush",
                failed, total
            )));
        }
        Ok(written)
    }

    /// Start the flusher task
    pub fn spawn_flusher(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                    _ = manager.wake.notified() => {}
                }

                if let Err(e) = manager.flush_pending().await {
                    warn!(error = %e, "background event flush failed");
                }
            }
            debug!("event flusher stopped");
        })
    }
}

#[async_trait]
impl PersistenceManager for EventPersistenceManager {
    type Key = EventId;
    type Record = EventRecord;

    fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    async fn initialize(&self) -> ScoutResult<()> {
        if self.readiness.is_ready() {
            return Ok(());
        }

        let result = async {
            fs::create_dir_all(&self.root).await.map_err(|e| {
                ScoutError::initialization_with_context(
                    format!("Failed to create events directory: {}", e),
                    self.root.display().to_string(),
                )
            })?;
            remove_stale_temp_files(&self.root).await?;
            Ok::<_, ScoutError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.readiness.mark_ready();
                debug!(root = %self.root.display(), encrypted = self.is_encrypted(), "event persistence ready");
                Ok(())
            }
            Err(e) => {
                self.readiness.mark_failed(e.clone());
                Err(e)
            }
        }
    }

    async fn save(&self, id: &EventId, record: &EventRecord) -> ScoutResult<()> {
        self.ready().await?;
        let _guard = self.flush_lock.lock().await;
        self.write_record(record).await?;
        self.pending.lock().remove(id);
        Ok(())
    }

    async fn load(&self, id: &EventId) -> ScoutResult<Option<EventRecord>> {
        self.ready().await?;
        let queued = self.pending.lock().get(id).cloned();
        if queued.is_some() {
            return Ok(queued);
        }
        Ok(self.read_event(&self.event_path(id)).await)
    }

    async fn load_all(&self) -> ScoutResult<Vec<EventRecord>> {
        let mut all = Vec::new();
        for stream_id in self.list_streams().await? {
            all.extend(self.load_stream(&stream_id).await?);
        }
        Ok(all)
    }

    async fn delete(&self, id: &EventId) -> ScoutResult<()> {
        self.ready().await?;
        let _guard = self.flush_lock.lock().await;
        self.pending.lock().remove(id);
        remove_file_if_exists(&self.event_path(id)).await?;
        Ok(())
    }

    async fn clear(&self) -> ScoutResult<()> {
        self.ready().await?;
        let _guard = self.flush_lock.lock().await;
        self.pending.lock().clear();

        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ScoutError::persistence_at(e.to_string(), &self.root)),
        }
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ScoutError::persistence_at(e.to_string(), &self.root))
    }
}
