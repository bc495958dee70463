//! Hybrid persistence for cache entries
//!
//! Entries live at `<root>/<namespace>/<hash>.json`. Writes for critical
//! namespaces are flushed as soon as they are queued, other persistent
//! namespaces are batched on an interval, and memory-only namespaces never
//! touch the disk. A single flusher task owns every background write.

use super::atomic::{
    is_temp_file, read_json, remove_file_if_exists, remove_stale_temp_files, write_json,
};
use super::readiness::Readiness;
use super::PersistenceManager;
use crate::cache::{CacheEntry, CacheKey};
use crate::config::model::{ALL_NAMESPACES, CacheConfig};
use crate::error::{ScoutError, ScoutResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How writes for a namespace reach the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistScope {
    /// Flushed right after every write
    Critical,
    /// Flushed on the persistence interval
    Interval,
    /// Never persisted
    MemoryOnly,
}

#[derive(Debug, Clone)]
enum PendingOp {
    Save(CacheEntry),
    Delete,
}

/// Persistence manager for cache entries
pub struct CachePersistenceManager {
    root: PathBuf,
    critical: HashSet<String>,
    persistent: HashSet<String>,
    persist_all: bool,
    interval: Duration,
    purge_batch: usize,
    /// Last file examined by the previous purge
    purge_cursor: Mutex<Option<PathBuf>>,
    pending: Mutex<HashMap<CacheKey, PendingOp>>,
    flush_lock: tokio::sync::Mutex<()>,
    wake: Notify,
    readiness: Readiness,
}

impl CachePersistenceManager {
    /// Create a manager rooted at `root`; call `initialize` before use
    pub fn new(root: impl Into<PathBuf>, config: &CacheConfig) -> Self {
        Self {
            root: root.into(),
            critical: config.critical_namespaces.iter().cloned().collect(),
            persistent: config.persistent_namespaces.iter().cloned().collect(),
            persist_all: config
                .persistent_namespaces
                .iter()
                .any(|ns| ns == ALL_NAMESPACES),
            interval: config.persistence_interval,
            purge_batch: config.purge_batch_size.max(1),
            purge_cursor: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            readiness: Readiness::new(),
        }
    }

    /// Storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persistence scope of a namespace
    pub fn scope(&self, namespace: &str) -> PersistScope {
        if self.critical.contains(namespace) {
            PersistScope::Critical
        } else if self.persist_all || self.persistent.contains(namespace) {
            PersistScope::Interval
        } else {
            PersistScope::MemoryOnly
        }
    }

    /// Whether entries of a namespace are persisted at all
    pub fn is_persistent(&self, namespace: &str) -> bool {
        self.scope(namespace) != PersistScope::MemoryOnly
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(&key.namespace).join(key.file_name())
    }

    /// Queue an entry for the flusher
    pub fn record_write(&self, entry: &CacheEntry) {
        self.queue(entry.key.clone(), PendingOp::Save(entry.clone()));
    }

    /// Queue removal of an entry's file
    pub fn record_delete(&self, key: &CacheKey) {
        self.queue(key.clone(), PendingOp::Delete);
    }

    fn queue(&self, key: CacheKey, op: PendingOp) {
        let scope = self.scope(&key.namespace);
        if scope == PersistScope::MemoryOnly {
            return;
        }
        self.pending.lock().insert(key, op);
        if scope == PersistScope::Critical {
            self.wake.notify_one();
        }
    }

    /// Writes waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Write every queued operation to disk.
    ///
    /// Failed saves are re-queued unless a newer operation for the same key
    /// arrived meanwhile. Returns the number of operations applied.
    pub async fn flush_pending(&self) -> ScoutResult<usize> {
        self.ready().await?;
        let _guard = self.flush_lock.lock().await;

        let batch: Vec<(CacheKey, PendingOp)> = self.pending.lock().drain().collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let mut applied = 0;
        let mut first_error = None;
        for (key, op) in batch {
            let path = self.entry_path(&key);
            let result = match &op {
                PendingOp::Save(entry) => write_json(&path, entry).await,
                PendingOp::Delete => remove_file_if_exists(&path).await.map(|_| ()),
            };

            match result {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "cache flush failed");
                    self.pending.lock().entry(key).or_insert(op);
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!(applied, "flushed cache writes");
        match first_error {
            Some(e) => Err(e),
            None => Ok(applied),
        }
    }

    /// Delete expired entry files, including ones not resident in memory.
    ///
    /// Reads at most `purge_batch_size` files per call and resumes after the
    /// last file examined, so successive sweeps walk the whole directory.
    /// Keys with a queued write are left to the flusher.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> ScoutResult<usize> {
        self.ready().await?;
        let files = self.entry_files().await?;

        let start = match self.purge_cursor.lock().as_ref() {
            Some(last) => files.partition_point(|path| path <= last),
            None => 0,
        };
        let start = if start >= files.len() { 0 } else { start };
        let batch = &files[start..files.len().min(start + self.purge_batch)];

        let mut purged = 0;
        for path in batch {
            let Some(entry) = self.read_entry(path).await else {
                continue;
            };
            if entry.horizon() > now || self.pending.lock().contains_key(&entry.key) {
                continue;
            }
            self.delete(&entry.key).await?;
            purged += 1;
        }

        *self.purge_cursor.lock() = batch.last().cloned();
        debug!(examined = batch.len(), total = files.len(), purged, "cache purge pass");
        Ok(purged)
    }

    /// Every entry file on disk, sorted by path
    async fn entry_files(&self) -> ScoutResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut namespaces = match tokio::fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
            Err(e) => return Err(ScoutError::persistence_at(e.to_string(), &self.root)),
        };

        while let Some(namespace_dir) = namespaces.next_entry().await? {
            if !namespace_dir.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(namespace_dir.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if is_temp_file(&path) || path.extension().is_none_or(|ext| ext != "json") {
                    continue;
                }
                paths.push(path);
            }
        }

        paths.sort();
        Ok(paths)
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
                    warn!(error = %e, "background cache flush failed");
                }
            }
            debug!("cache flusher stopped");
        })
    }

    async fn read_entry(&self, path: &Path) -> Option<CacheEntry> {
        match read_json::<CacheEntry>(path).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "dropping unreadable cache entry");
                let _ = remove_file_if_exists(path).await;
                None
            }
        }
    }
}

#[async_trait]
impl PersistenceManager for CachePersistenceManager {
    type Key = CacheKey;
    type Record = CacheEntry;

    fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    async fn initialize(&self) -> ScoutResult<()> {
        if self.readiness.is_ready() {
            return Ok(());
        }

        let result = async {
            tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
                ScoutError::initialization_with_context(
                    format!("Failed to create cache directory: {}", e),
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
                debug!(root = %self.root.display(), "cache persistence ready");
                Ok(())
            }
            Err(e) => {
                self.readiness.mark_failed(e.clone());
                Err(e)
            }
        }
    }

    async fn save(&self, key: &CacheKey, entry: &CacheEntry) -> ScoutResult<()> {
        self.ready().await?;
        let _guard = self.flush_lock.lock().await;
        self.pending.lock().remove(key);
        write_json(&self.entry_path(key), entry).await
    }

    async fn load(&self, key: &CacheKey) -> ScoutResult<Option<CacheEntry>> {
        self.ready().await?;
        if let Some(op) = self.pending.lock().get(key) {
            return Ok(match op {
                PendingOp::Save(entry) => Some(entry.clone()),
                PendingOp::Delete => None,
            });
        }
        Ok(self.read_entry(&self.entry_path(key)).await)
    }

    async fn load_all(&self) -> ScoutResult<Vec<CacheEntry>> {
        self.ready().await?;

        let mut entries: HashMap<CacheKey, CacheEntry> = HashMap::new();
        for path in self.entry_files().await? {
            if let Some(entry) = self.read_entry(&path).await {
                entries.insert(entry.key.clone(), entry);
            }
        }

        for (key, op) in self.pending.lock().iter() {
            match op {
                PendingOp::Save(entry) => {
                    entries.insert(key.clone(), entry.clone());
                }
                PendingOp::Delete => {
                    entries.remove(key);
                }
            }
        }

        Ok(entries.into_values().collect())
    }

    async fn delete(&self, key: &CacheKey) -> ScoutResult<()> {
        self.ready().await?;
        let _guard = self.flush_lock.lock().await;
        self.pending.lock().remove(key);
        remove_file_if_exists(&self.entry_path(key)).await?;
        Ok(())
    }

    async fn clear(&self) -> ScoutResult<()> {
        self.ready().await?;
        let _guard = self.flush_lock.lock().await;
        self.pending.lock().clear();

        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ScoutError::persistence_at(e.to_string(), &self.root)),
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ScoutError::persistence_at(e.to_string(), &self.root))
    }
}
