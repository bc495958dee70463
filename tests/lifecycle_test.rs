//! Service lifecycle tests
//!
//! Exercise both stores through `ServiceContext` across process restarts.

use scout::{CacheOptions, ScoutConfig, ScoutError, ServiceContext};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

fn test_config(temp: &TempDir) -> ScoutConfig {
    let mut config = ScoutConfig::with_storage_path(temp.path());
    config.cache.persistence_interval = Duration::from_secs(3600);
    config.events.persistence_interval = Duration::from_secs(3600);
    config
}

async fn search(
    context: &ServiceContext,
    calls: &Arc<AtomicUsize>,
    query: &str,
    ttl: Duration,
) -> String {
    let calls = Arc::clone(calls);
    let query = query.to_string();
    context
        .cache()
        .get_or_compute(
            "search",
            &json!({"q": query.clone()}),
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ScoutError>(format!("results for {}", query))
            },
            CacheOptions::new().with_ttl(ttl),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let calls = Arc::new(AtomicUsize::new(0));

    let context = ServiceContext::initialize(config.clone()).await.unwrap();
    let first = search(&context, &calls, "rust", Duration::from_secs(60)).await;
    assert!(context.shutdown().await.is_clean());

    let context = ServiceContext::initialize(config).await.unwrap();
    let second = search(&context, &calls, "rust", Duration::from_secs(60)).await;
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = context.cache().get_stats();
    assert_eq!(stats.hits, 1);
    context.shutdown().await.into_result().unwrap();
}

#[tokio::test]
async fn test_expired_cache_entries_are_not_restored() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let calls = Arc::new(AtomicUsize::new(0));

    let context = ServiceContext::initialize(config.clone()).await.unwrap();
    search(&context, &calls, "short", Duration::from_millis(50)).await;
    context.shutdown().await.into_result().unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let context = ServiceContext::initialize(config).await.unwrap();
    search(&context, &calls, "short", Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    context.shutdown().await;
}

#[tokio::test]
async fn test_event_replay_across_restart() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);

    let context = ServiceContext::initialize(config.clone()).await.unwrap();
    let events = context.events();
    let e1 = events.store_event("session-1", json!("A")).await.unwrap();
    let e2 = events.store_event("session-1", json!("B")).await.unwrap();
    let report = context.shutdown().await;
    assert_eq!(report.events.as_ref().copied().unwrap(), 2);

    let context = ServiceContext::initialize(config).await.unwrap();
    let mut delivered = Vec::new();
    let summary = context
        .events()
        .replay_events_after(&e1, |event| {
            delivered.push((event.event_id, event.message.unwrap()));
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(summary.delivered, 1);
    assert_eq!(delivered, vec![(e2, json!("B"))]);
    context.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let context = ServiceContext::initialize(test_config(&temp)).await.unwrap();
    context.events().store_event("s1", json!(1)).await.unwrap();

    let first = context.shutdown().await;
    assert_eq!(first.into_result().unwrap(), 1);

    let second = context.shutdown().await;
    assert!(second.is_clean());
    assert_eq!(second.into_result().unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.events.max_events_per_stream = 0;

    let result = ServiceContext::initialize(config).await;
    assert!(matches!(result, Err(ScoutError::InvalidInput { .. })));
}

#[tokio::test]
async fn test_bad_encryption_key_fails_initialization() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.encryption.enabled = true;
    config.encryption.key = Some("not-base64!".to_string());

    assert!(ServiceContext::initialize(config).await.is_err());
}
