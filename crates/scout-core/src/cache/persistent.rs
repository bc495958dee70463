//! Persistent request cache

use super::single_flight::{FlightOutcome, FlightTable};
use super::types::{CacheEntry, CacheKey, CacheOptions, CacheStatistics, EntryState};
use crate::config::{CacheConfig, ScoutConfig};
use crate::error::{ScoutError, ScoutResult, UnifiedError};
use crate::persistence::{CachePersistenceManager, PersistenceManager, validate_component};
use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type ComputeJob = Box<dyn FnOnce() -> BoxFuture<'static, ScoutResult<Value>> + Send>;

enum Lookup {
    Fresh(Value),
    Stale(Value),
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlightKind {
    Load,
    Revalidate,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_hits: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    computations: AtomicU64,
    revalidations: AtomicU64,
    revalidation_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Two-layer cache with TTL, stale-while-revalidate and single-flight
/// computation.
///
/// Lock order is flights before entries; neither lock is held across an
/// `.await`.
pub struct PersistentCache {
    config: CacheConfig,
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    flights: Mutex<FlightTable>,
    persistence: Arc<CachePersistenceManager>,
    counters: Counters,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl PersistentCache {
    /// Open the cache on top of `persistence`.
    ///
    /// Waits for the disk layer, loads persisted entries when eager loading is
    /// enabled, then starts the flusher and the expiry sweeper.
    pub async fn open(
        config: &ScoutConfig,
        persistence: Arc<CachePersistenceManager>,
    ) -> ScoutResult<Arc<Self>> {
        persistence.initialize().await?;

        let cache = Arc::new(Self {
            config: config.cache.clone(),
            entries: Mutex::new(LruCache::unbounded()),
            flights: Mutex::new(FlightTable::default()),
            persistence,
            counters: Counters::default(),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });

        if config.eager_loading {
            let loaded = cache.load_from_disk().await.map_err(|e| {
                ScoutError::initialization_with_context(e.to_string(), "loading cache entries")
            })?;
            info!(loaded, "cache warmed from disk");
        }

        cache.start_background_tasks();
        Ok(cache)
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

    /// Return the cached value for `(namespace, args)` or compute it.
    ///
    /// Concurrent callers for the same key share a single computation and its
    /// outcome. A failed computation is returned to every waiter and never
    /// cached.
    pub async fn get_or_compute<T, F, Fut>(
        self: &Arc<Self>,
        namespace: &str,
        args: &Value,
        compute: F,
        options: CacheOptions,
    ) -> ScoutResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ScoutResult<T>> + Send + 'static,
    {
        validate_component("namespace", namespace)?;
        let key = CacheKey::from_args(namespace, args);
        let label = key.to_string();

        let job: ComputeJob = Box::new(move || {
            async move {
                let value = compute().await?;
                serde_json::to_value(value).map_err(ScoutError::from)
            }
            .boxed()
        });

        let value = self.resolve(key, options, job).await?;
        serde_json::from_value(value).map_err(|e| {
            ScoutError::json(format!("cached value for {} has an unexpected shape: {}", label, e))
        })
    }

    async fn resolve(
        self: &Arc<Self>,
        key: CacheKey,
        options: CacheOptions,
        job: ComputeJob,
    ) -> ScoutResult<Value> {
        match self.lookup_memory(&key, &options) {
            Lookup::Fresh(value) => {
                Counters::bump(&self.counters.hits);
                return Ok(value);
            }
            Lookup::Stale(value) => {
                Counters::bump(&self.counters.hits);
                Counters::bump(&self.counters.stale_hits);
                self.revalidate(key, options, job);
                return Ok(value);
            }
            Lookup::Miss => {}
        }

        let running = self.flights.lock().get(&key);
        if let Some(outcome) = running {
            Counters::bump(&self.counters.misses);
            return outcome.await;
        }

        if self.persistence.is_persistent(&key.namespace) {
            let from_disk = match self.persistence.load(&key).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(key = %key, error = %e, "disk lookup failed, computing instead");
                    None
                }
            };

            if let Some(entry) = from_disk {
                match self.promote(entry, &options) {
                    Lookup::Fresh(value) => {
                        Counters::bump(&self.counters.hits);
                        return Ok(value);
                    }
                    Lookup::Stale(value) => {
                        Counters::bump(&self.counters.hits);
                        Counters::bump(&self.counters.stale_hits);
                        self.revalidate(key, options, job);
                        return Ok(value);
                    }
                    Lookup::Miss => {}
                }
            }
        }

        Counters::bump(&self.counters.misses);
        let outcome = self.join_or_start(key, options, job, FlightKind::Load);
        outcome.await
    }

    fn lookup_memory(&self, key: &CacheKey, options: &CacheOptions) -> Lookup {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let Some(state) = entries.peek(key).map(|entry| entry.state_at(now)) else {
            return Lookup::Miss;
        };

        match state {
            EntryState::Expired => {
                entries.pop(key);
                Counters::bump(&self.counters.expirations);
                self.persistence.record_delete(key);
                Lookup::Miss
            }
            EntryState::Stale if !options.stale_while_revalidate => Lookup::Miss,
            _ => match entries.get_mut(key) {
                Some(entry) => {
                    entry.mark_accessed();
                    if state == EntryState::Fresh {
                        Lookup::Fresh(entry.value.clone())
                    } else {
                        Lookup::Stale(entry.value.clone())
                    }
                }
                None => Lookup::Miss,
            },
        }
    }

    /// Move a disk entry into memory if it can still be served
    fn promote(&self, mut entry: CacheEntry, options: &CacheOptions) -> Lookup {
        let state = entry.state_at(Utc::now());
        if state == EntryState::Expired {
            Counters::bump(&self.counters.expirations);
            self.persistence.record_delete(&entry.key);
            return Lookup::Miss;
        }

        entry.mark_accessed();
        let value = entry.value.clone();
        {
            let mut entries = self.entries.lock();
            if !entries.contains(&entry.key) {
                entries.push(entry.key.clone(), entry);
                self.evict_overflow(&mut entries);
            }
        }
        debug!("promoted cache entry from disk");

        match state {
            EntryState::Fresh => Lookup::Fresh(value),
            _ if options.stale_while_revalidate => Lookup::Stale(value),
            _ => Lookup::Miss,
        }
    }

    fn revalidate(self: &Arc<Self>, key: CacheKey, options: CacheOptions, job: ComputeJob) {
        // The spawned task keeps running after the handle is dropped
        let _ = self.join_or_start(key, options, job, FlightKind::Revalidate);
    }

    fn join_or_start(
        self: &Arc<Self>,
        key: CacheKey,
        options: CacheOptions,
        job: ComputeJob,
        kind: FlightKind,
    ) -> FlightOutcome {
        let mut flights = self.flights.lock();
        if let Some(outcome) = flights.get(&key) {
            return outcome;
        }

        let id = flights.next_id();
        let cache = Arc::clone(self);
        let task_key = key.clone();
        let handle =
            tokio::spawn(async move { cache.run_flight(task_key, id, options, job, kind).await });

        let outcome = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(ScoutError::from(e)),
            }
        }
        .boxed()
        .shared();

        flights.insert(key, id, outcome.clone());
        outcome
    }

    async fn run_flight(
        self: Arc<Self>,
        key: CacheKey,
        id: u64,
        options: CacheOptions,
        job: ComputeJob,
        kind: FlightKind,
    ) -> ScoutResult<Value> {
        Counters::bump(&self.counters.computations);

        let computation = AssertUnwindSafe(job()).catch_unwind().map(|outcome| {
            outcome.unwrap_or_else(|_| Err(ScoutError::compute(&key.namespace, "computation panicked")))
        });
        let result = match options.compute_timeout {
            Some(limit) => match tokio::time::timeout(limit, computation).await {
                Ok(result) => result,
                Err(_) => Err(ScoutError::timeout_with_context(
                    limit.as_millis() as u64,
                    format!("computing {}", key),
                )),
            },
            None => computation.await,
        };
        let result = result.map_err(|e| into_compute_error(&key.namespace, e));

        {
            let mut flights = self.flights.lock();
            if flights.complete(&key, id) {
                if let Ok(value) = &result {
                    let ttl = options
                        .ttl
                        .unwrap_or_else(|| self.config.ttl_for(&key.namespace));
                    let entry = CacheEntry::new(
                        key.clone(),
                        value.clone(),
                        ttl,
                        options.effective_stale_time(ttl),
                    );
                    self.persistence.record_write(&entry);
                    let mut entries = self.entries.lock();
                    entries.push(key.clone(), entry);
                    self.evict_overflow(&mut entries);
                }
            } else {
                debug!(key = %key, "discarding result of detached computation");
            }
        }

        match (&result, kind) {
            (Ok(_), FlightKind::Revalidate) => {
                Counters::bump(&self.counters.revalidations);
                debug!(key = %key, "revalidated stale entry");
            }
            (Err(e), FlightKind::Revalidate) => {
                Counters::bump(&self.counters.revalidation_failures);
                warn!(key = %key, error = %e, "background revalidation failed, keeping stale value");
            }
            (Err(e), FlightKind::Load) => debug!(key = %key, error = %e, "computation failed"),
            (Ok(_), FlightKind::Load) => {}
        }

        result
    }

    /// Pop least recently used entries until the cache fits `max_size`.
    /// Returns the evicted keys.
    fn evict_overflow(&self, entries: &mut LruCache<CacheKey, CacheEntry>) -> Vec<CacheKey> {
        let mut evicted = Vec::new();
        while entries.len() > self.config.max_size {
            match entries.pop_lru() {
                Some((key, _)) => {
                    Counters::bump(&self.counters.evictions);
                    debug!(key = %key, "evicted least recently used entry");
                    evicted.push(key);
                }
                None => break,
            }
        }
        evicted
    }

    /// Read a servable value without computing or touching statistics
    pub fn peek(&self, namespace: &str, args: &Value) -> Option<Value> {
        let key = CacheKey::from_args(namespace, args);
        let now = Utc::now();
        self.entries
            .lock()
            .peek(&key)
            .filter(|entry| entry.state_at(now) != EntryState::Expired)
            .map(|entry| entry.value.clone())
    }

    /// Time left in a resident entry's fresh window
    pub fn remaining_ttl(&self, namespace: &str, args: &Value) -> Option<Duration> {
        let key = CacheKey::from_args(namespace, args);
        self.entries.lock().peek(&key).and_then(CacheEntry::remaining_ttl)
    }

    /// Remove one entry from memory and disk.
    ///
    /// A computation running for the key is detached: its waiters still get
    /// its result, but the result is not stored.
    pub async fn invalidate(&self, namespace: &str, args: &Value) -> ScoutResult<bool> {
        validate_component("namespace", namespace)?;
        let key = CacheKey::from_args(namespace, args);

        let detached = self.flights.lock().detach(&key);
        let removed = self.entries.lock().pop(&key).is_some();
        if self.persistence.is_persistent(namespace) {
            self.persistence.delete(&key).await?;
        }

        debug!(key = %key, removed, detached, "invalidated cache entry");
        Ok(removed || detached)
    }

    /// Remove every entry from memory and disk
    pub async fn clear(&self) -> ScoutResult<()> {
        self.flights.lock().clear();
        self.entries.lock().clear();
        self.persistence.clear().await?;
        info!("cache cleared");
        Ok(())
    }

    /// Write every resident entry of a persistent namespace, then flush
    /// queued writes. Returns the number of entries written.
    pub async fn persist_to_disk(&self) -> ScoutResult<usize> {
        let now = Utc::now();
        let snapshot: Vec<CacheEntry> = self
            .entries
            .lock()
            .iter()
            .filter(|(key, entry)| {
                self.persistence.is_persistent(&key.namespace)
                    && entry.state_at(now) != EntryState::Expired
            })
            .map(|(_, entry)| entry.clone())
            .collect();

        for entry in &snapshot {
            self.persistence.save(&entry.key, entry).await?;
        }
        self.persistence.flush_pending().await?;

        debug!(written = snapshot.len(), "persisted cache to disk");
        Ok(snapshot.len())
    }

    /// Load persisted entries into memory, deleting expired ones.
    /// Returns the number of loaded entries still resident once the cache
    /// is trimmed to `max_size`.
    pub async fn load_from_disk(&self) -> ScoutResult<usize> {
        let records = self.persistence.load_all().await?;
        let now = Utc::now();

        let (mut live, expired): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|entry| entry.state_at(now) != EntryState::Expired);
        for entry in &expired {
            self.persistence.record_delete(&entry.key);
        }

        live.sort_by_key(|entry| entry.last_accessed);
        let mut loaded = HashSet::new();
        let evicted = {
            let mut entries = self.entries.lock();
            for entry in live {
                if entries.contains(&entry.key) {
                    continue;
                }
                loaded.insert(entry.key.clone());
                entries.push(entry.key.clone(), entry);
            }
            self.evict_overflow(&mut entries)
        };
        let dropped = evicted.iter().filter(|key| loaded.remove(*key)).count();
        let loaded = loaded.len();

        debug!(loaded, dropped, expired = expired.len(), "loaded cache entries from disk");
        Ok(loaded)
    }

    /// Drop entries past their stale horizon from memory and disk.
    /// Returns the number of resident entries removed.
    pub async fn cleanup_expired(&self) -> ScoutResult<usize> {
        let now = Utc::now();
        let expired: Vec<CacheKey> = {
            let mut entries = self.entries.lock();
            let keys: Vec<CacheKey> = entries
                .iter()
                .filter(|(_, entry)| entry.state_at(now) == EntryState::Expired)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                entries.pop(key);
            }
            keys
        };

        for key in expired
            .iter()
            .filter(|key| self.persistence.is_persistent(&key.namespace))
        {
            if let Err(e) = self.persistence.delete(key).await {
                warn!(key = %key, error = %e, "failed to delete expired cache entry");
            }
        }
        self.counters
            .expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);

        let purged = self.persistence.purge_expired(now).await?;
        if !expired.is_empty() || purged > 0 {
            debug!(resident = expired.len(), on_disk = purged, "removed expired cache entries");
        }
        Ok(expired.len())
    }

    /// Snapshot of the cache counters
    pub fn get_stats(&self) -> CacheStatistics {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CacheStatistics {
            size: self.entries.lock().len(),
            max_size: self.config.max_size,
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            stale_hits: load(&self.counters.stale_hits),
            evictions: load(&self.counters.evictions),
            expirations: load(&self.counters.expirations),
            computations: load(&self.counters.computations),
            revalidations: load(&self.counters.revalidations),
            revalidation_failures: load(&self.counters.revalidation_failures),
            in_flight: self.flights.lock().len(),
            pending_writes: self.persistence.pending_len(),
        }
    }

    /// Stop background tasks and flush queued writes. Idempotent.
    pub async fn dispose(&self) -> ScoutResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "cache background task ended abnormally");
            }
        }

        let flushed = self.persistence.flush_pending().await?;
        info!(flushed, "cache disposed");
        Ok(())
    }
}

fn into_compute_error(namespace: &str, error: ScoutError) -> ScoutError {
    match error {
        ScoutError::Compute { .. } | ScoutError::Timeout { .. } => error,
        other => ScoutError::Compute {
            namespace: namespace.to_string(),
            message: other.to_string(),
            context: Some(other.error_code().to_string()),
        },
    }
}

fn spawn_sweeper(
    cache: Weak<PersistentCache>,
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

            let Some(cache) = cache.upgrade() else { break };
            if let Err(e) = cache.cleanup_expired().await {
                warn!(error = %e, "cache expiry sweep failed");
            }
        }
        debug!("cache sweeper stopped");
    })
}
