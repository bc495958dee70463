//! Scout
//!
//! Durable request cache and resumable event log for processes that serve
//! tool calls to clients over long-lived sessions.
//!
//! ```no_run
//! use scout::{ScoutConfig, ServiceContext};
//! use serde_json::json;
//!
//! # async fn demo() -> scout::ScoutResult<()> {
//! let context = ServiceContext::initialize(ScoutConfig::default()).await?;
//! let events = context.events();
//! let first = events.store_event("session-1", json!({"text": "hello"})).await?;
//! events
//!     .replay_events_after(&first, |event| {
//!         println!("{}", event.event_id);
//!         Ok(())
//!     })
//!     .await?;
//! context.shutdown().await.into_result()?;
//! # Ok(())
//! # }
//! ```

mod context;

pub use context::{ServiceContext, ShutdownReport};
pub use scout_core::{
    CacheEntry, CacheKey, CacheOptions, CacheStatistics, EntryState, PersistentCache, ScoutConfig,
    ScoutError, ScoutResult, UnifiedError, load_config,
};
pub use scout_session::{
    EventId, EventStoreStats, MessageCipher, PersistentEventStore, ReplaySummary, ReplayedEvent,
    Sanitizer, StreamStats,
};

pub mod core {
    pub use scout_core::*;
}

pub mod session {
    pub use scout_session::*;
}
