//! Process-wide service context
//!
//! Builds the cache and the event store once and hands out shared handles.
//! Collaborators receive the context (or the individual handles) explicitly.

use scout_core::config::ScoutConfig;
use scout_core::error::{ScoutError, ScoutResult};
use scout_core::{CachePersistenceManager, PersistentCache};
use scout_session::{EventPersistenceManager, PersistentEventStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

/// Outcome of [`ServiceContext::shutdown`]
#[derive(Debug)]
pub struct ShutdownReport {
    /// Final cache flush
    pub cache: ScoutResult<()>,
    /// Final event flush, with the number of events written
    pub events: ScoutResult<usize>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.cache.is_ok() && self.events.is_ok()
    }

    /// First failure, if any
    pub fn into_result(self) -> ScoutResult<usize> {
        self.cache?;
        self.events
    }
}

/// Owns the initialized stores for the lifetime of the process
pub struct ServiceContext {
    config: ScoutConfig,
    cache: Arc<PersistentCache>,
    events: Arc<PersistentEventStore>,
    shut_down: AtomicBool,
}

impl ServiceContext {
    /// Validate `config`, then open both stores.
    ///
    /// Returns once both persistence layers are ready and, with eager loading,
    /// once persisted state is resident.
    pub async fn initialize(config: ScoutConfig) -> ScoutResult<Self> {
        config.validate()?;

        let cache_persistence = Arc::new(CachePersistenceManager::new(
            config.cache_dir(),
            &config.cache,
        ));
        let cache = PersistentCache::open(&config, cache_persistence).await?;

        let events = match open_event_store(&config).await {
            Ok(events) => events,
            Err(e) => {
                if let Err(dispose_err) = cache.dispose().await {
                    error!(error = %dispose_err, "cache disposal after failed start");
                }
                return Err(e);
            }
        };

        info!(
            storage_path = %config.storage_path.display(),
            encrypted = config.encryption.enabled,
            "scout services initialized"
        );
        Ok(Self {
            config,
            cache,
            events,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ScoutConfig {
        &self.config
    }

    pub fn cache(&self) -> Arc<PersistentCache> {
        Arc::clone(&self.cache)
    }

    pub fn events(&self) -> Arc<PersistentEventStore> {
        Arc::clone(&self.events)
    }

    /// Flush and stop both stores. Calling it again returns a clean, empty
    /// report.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return ShutdownReport {
                cache: Ok(()),
                events: Ok(0),
            };
        }

        let cache = self.cache.dispose().await;

        let events = Arc::clone(&self.events);
        let events = tokio::task::spawn_blocking(move || events.dispose())
            .await
            .unwrap_or_else(|e| Err(ScoutError::other(format!("event flush task failed: {}", e))));

        let report = ShutdownReport { cache, events };
        match (&report.cache, &report.events) {
            (Ok(()), Ok(flushed)) => info!(events_flushed = flushed, "scout services stopped"),
            (cache, events) => {
                if let Err(e) = cache {
                    error!(error = %e, "cache shutdown failed");
                }
                if let Err(e) = events {
                    error!(error = %e, "event store shutdown failed");
                }
            }
        }
        report
    }
}

async fn open_event_store(config: &ScoutConfig) -> ScoutResult<Arc<PersistentEventStore>> {
    let persistence = Arc::new(EventPersistenceManager::from_config(config)?);
    PersistentEventStore::open(config, persistence).await
}
