//! Tests for the persistent cache

use super::*;
use crate::config::ScoutConfig;
use crate::error::{ScoutError, ScoutResult};
use crate::persistence::CachePersistenceManager;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

fn test_config(temp: &TempDir) -> ScoutConfig {
    let mut config = ScoutConfig::with_storage_path(temp.path());
    config.cache.persistence_interval = Duration::from_secs(3600);
    config
}

async fn open_cache(config: &ScoutConfig) -> Arc<PersistentCache> {
    let persistence = Arc::new(CachePersistenceManager::new(config.cache_dir(), &config.cache));
    PersistentCache::open(config, persistence).await.unwrap()
}

/// Compute function that counts its invocations and returns `v<n>`
fn counting(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
) -> impl FnOnce() -> BoxFuture<'static, ScoutResult<String>> + Send + 'static {
    let calls = Arc::clone(calls);
    move || {
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(delay).await;
            Ok::<_, ScoutError>(format!("v{}", n))
        }
        .boxed()
    }
}

fn failing(calls: &Arc<AtomicUsize>) -> impl FnOnce() -> BoxFuture<'static, ScoutResult<String>> + Send + 'static {
    let calls = Arc::clone(calls);
    move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(ScoutError::compute("search", "upstream unavailable"))
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_repeat_call_within_ttl_served_from_cache() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"q": "x"});
    let options = CacheOptions::new().with_ttl(Duration::from_millis(1000));

    let compute = {
        let calls = Arc::clone(&calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ScoutError>("R1".to_string())
        }
    };
    let first: String = cache
        .get_or_compute("search", &args, compute.clone(), options.clone())
        .await
        .unwrap();
    let second: String = cache
        .get_or_compute("search", &args, compute, options)
        .await
        .unwrap();

    assert_eq!(first, "R1");
    assert_eq!(second, "R1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = cache.get_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.size, 1);
}

#[tokio::test]
async fn test_concurrent_calls_share_one_computation() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"q": "shared"});

    let (a, b, c) = tokio::join!(
        cache.get_or_compute::<String, _, _>(
            "search",
            &args,
            counting(&calls, Duration::from_millis(50)),
            CacheOptions::new()
        ),
        cache.get_or_compute::<String, _, _>(
            "search",
            &args,
            counting(&calls, Duration::from_millis(50)),
            CacheOptions::new()
        ),
        cache.get_or_compute::<String, _, _>(
            "search",
            &args,
            counting(&calls, Duration::from_millis(50)),
            CacheOptions::new()
        ),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.unwrap(), "v1");
    assert_eq!(b.unwrap(), "v1");
    assert_eq!(c.unwrap(), "v1");
    assert_eq!(cache.get_stats().in_flight, 0);
}

#[tokio::test]
async fn test_concurrent_failure_shared_and_not_cached() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"q": "broken"});

    let (a, b) = tokio::join!(
        cache.get_or_compute::<String, _, _>("search", &args, failing(&calls), CacheOptions::new()),
        cache.get_or_compute::<String, _, _>("search", &args, failing(&calls), CacheOptions::new()),
    );
    assert!(matches!(a, Err(ScoutError::Compute { .. })));
    assert!(matches!(b, Err(ScoutError::Compute { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.peek("search", &args).is_none());

    let recovered: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();
    assert_eq!(recovered, "v2");
}

#[tokio::test]
async fn test_non_compute_errors_are_wrapped() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;

    let err = cache
        .get_or_compute::<String, _, _>(
            "search",
            &json!({"q": "io"}),
            || async { Err::<String, _>(ScoutError::io("connection reset")) },
            CacheOptions::new(),
        )
        .await
        .unwrap_err();

    match err {
        ScoutError::Compute {
            namespace, context, ..
        } => {
            assert_eq!(namespace, "search");
            assert_eq!(context.as_deref(), Some("SCOUT_IO"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_fresh_then_stale_with_single_revalidation() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"q": "swr"});
    let options = CacheOptions::new()
        .with_ttl(Duration::from_millis(100))
        .with_stale_while_revalidate(Some(Duration::from_millis(1000)));

    let initial: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), options.clone())
        .await
        .unwrap();
    assert_eq!(initial, "v1");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let fresh: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), options.clone())
        .await
        .unwrap();
    assert_eq!(fresh, "v1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let slow = Duration::from_millis(30);
    let stale: String = cache
        .get_or_compute("search", &args, counting(&calls, slow), options.clone())
        .await
        .unwrap();
    let stale_again: String = cache
        .get_or_compute("search", &args, counting(&calls, slow), options.clone())
        .await
        .unwrap();
    assert_eq!(stale, "v1");
    assert_eq!(stale_again, "v1");

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.peek("search", &args), Some(json!("v2")));

    let stats = cache.get_stats();
    assert_eq!(stats.stale_hits, 2);
    assert_eq!(stats.revalidations, 1);
}

#[tokio::test]
async fn test_fully_expired_entry_awaits_recompute() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"q": "old"});
    let options = CacheOptions::new()
        .with_ttl(Duration::from_millis(100))
        .with_stale_while_revalidate(Some(Duration::from_millis(1000)));

    let _: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), options.clone())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let value: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), options)
        .await
        .unwrap();

    assert_eq!(value, "v2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.get_stats().expirations, 1);
}

#[tokio::test]
async fn test_failed_revalidation_keeps_stale_value() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"q": "flaky"});
    let options = CacheOptions::new()
        .with_ttl(Duration::from_millis(50))
        .with_stale_while_revalidate(Some(Duration::from_secs(10)));

    let _: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), options.clone())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    let stale: String = cache
        .get_or_compute("search", &args, failing(&calls), options)
        .await
        .unwrap();
    assert_eq!(stale, "v1");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.peek("search", &args), Some(json!("v1")));
    assert_eq!(cache.get_stats().revalidation_failures, 1);
}

#[tokio::test]
async fn test_compute_timeout_frees_the_slot() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"q": "slow"});

    let err = cache
        .get_or_compute::<String, _, _>(
            "search",
            &args,
            counting(&calls, Duration::from_secs(10)),
            CacheOptions::new().with_compute_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScoutError::Timeout { millis: 50, .. }));
    assert_eq!(cache.get_stats().in_flight, 0);

    let value: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();
    assert_eq!(value, "v2");
}

#[tokio::test]
async fn test_dropped_caller_does_not_cancel_computation() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"q": "abandoned"});

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        cache.get_or_compute::<String, _, _>(
            "search",
            &args,
            counting(&calls, Duration::from_millis(50)),
            CacheOptions::new(),
        ),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.peek("search", &args), Some(json!("v1")));
    assert_eq!(cache.get_stats().in_flight, 0);
}

#[tokio::test]
async fn test_invalidate_forces_recompute() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"q": "inv"});

    let _: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();
    cache.persist_to_disk().await.unwrap();

    assert!(cache.invalidate("search", &args).await.unwrap());
    assert!(cache.peek("search", &args).is_none());

    let value: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();
    assert_eq!(value, "v2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalidate_discards_inflight_result() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"q": "racing"});

    let waiter = {
        let cache = Arc::clone(&cache);
        let compute = counting(&calls, Duration::from_millis(100));
        let args = args.clone();
        tokio::spawn(async move {
            cache
                .get_or_compute::<String, _, _>("search", &args, compute, CacheOptions::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(cache.invalidate("search", &args).await.unwrap());

    assert_eq!(waiter.await.unwrap().unwrap(), "v1");
    assert!(cache.peek("search", &args).is_none());
}

#[tokio::test]
async fn test_equivalent_arguments_share_entry() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let _: String = cache
        .get_or_compute(
            "search",
            &json!({"q": "rust", "limit": 10, "cursor": null}),
            counting(&calls, Duration::ZERO),
            CacheOptions::new(),
        )
        .await
        .unwrap();
    let again: String = cache
        .get_or_compute(
            "search",
            &json!({"limit": 10.0, "q": "rust"}),
            counting(&calls, Duration::ZERO),
            CacheOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(again, "v1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lru_eviction_respects_max_size() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.cache.max_size = 2;
    config.cache.persistent_namespaces = Vec::new();
    let cache = open_cache(&config).await;
    let calls = Arc::new(AtomicUsize::new(0));

    for q in ["a", "b"] {
        let _: String = cache
            .get_or_compute("search", &json!({ "q": q }), counting(&calls, Duration::ZERO), CacheOptions::new())
            .await
            .unwrap();
    }
    // Touch "a" so "b" becomes the least recently used entry
    let _: String = cache
        .get_or_compute("search", &json!({"q": "a"}), counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();
    let _: String = cache
        .get_or_compute("search", &json!({"q": "c"}), counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();

    let stats = cache.get_stats();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.evictions, 1);
    assert!(cache.peek("search", &json!({"q": "a"})).is_some());
    assert!(cache.peek("search", &json!({"q": "b"})).is_none());
    assert!(cache.peek("search", &json!({"q": "c"})).is_some());
}

#[tokio::test]
async fn test_namespace_ttl_applies_without_explicit_ttl() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config
        .cache
        .namespace_ttls
        .insert("scrape".to_string(), Duration::from_millis(50).into());
    let cache = open_cache(&config).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"url": "https://example.com"});

    let _: String = cache
        .get_or_compute("scrape", &args, counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(cache.peek("scrape", &args).is_none());
}

#[tokio::test]
async fn test_entries_survive_restart() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let args = json!({"q": "durable"});
    let calls = Arc::new(AtomicUsize::new(0));

    {
        let cache = open_cache(&config).await;
        let _: String = cache
            .get_or_compute(
                "search",
                &args,
                counting(&calls, Duration::ZERO),
                CacheOptions::new().with_ttl(Duration::from_secs(60)),
            )
            .await
            .unwrap();
        assert_eq!(cache.persist_to_disk().await.unwrap(), 1);
        cache.dispose().await.unwrap();
    }

    let cache = open_cache(&config).await;
    assert_eq!(cache.get_stats().size, 1);
    assert_eq!(cache.peek("search", &args), Some(json!("v1")));
    let value: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();
    assert_eq!(value, "v1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_restored_entry_keeps_original_deadline() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let args = json!({"q": "deadline"});
    let calls = Arc::new(AtomicUsize::new(0));
    let options = CacheOptions::new().with_ttl(Duration::from_millis(300));

    {
        let cache = open_cache(&config).await;
        let _: String = cache
            .get_or_compute("search", &args, counting(&calls, Duration::ZERO), options.clone())
            .await
            .unwrap();
        cache.dispose().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    let cache = open_cache(&config).await;
    let value: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), options.clone())
        .await
        .unwrap();
    assert_eq!(value, "v1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let remaining = cache.remaining_ttl("search", &args).unwrap();
    assert!(remaining < Duration::from_millis(200), "ttl restarted: {:?}", remaining);

    tokio::time::sleep(remaining + Duration::from_millis(20)).await;
    assert!(cache.peek("search", &args).is_none());
    let value: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), options)
        .await
        .unwrap();
    assert_eq!(value, "v2");
}

#[tokio::test]
async fn test_load_count_excludes_entries_trimmed_to_max_size() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    let calls = Arc::new(AtomicUsize::new(0));

    {
        let cache = open_cache(&config).await;
        for q in ["a", "b", "c", "d"] {
            let _: String = cache
                .get_or_compute("search", &json!({ "q": q }), counting(&calls, Duration::ZERO), CacheOptions::new())
                .await
                .unwrap();
        }
        cache.dispose().await.unwrap();
    }

    config.cache.max_size = 2;
    config.eager_loading = false;
    let cache = open_cache(&config).await;

    assert_eq!(cache.load_from_disk().await.unwrap(), 2);
    let stats = cache.get_stats();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.evictions, 2);
    assert!(cache.peek("search", &json!({"q": "d"})).is_some());
}

#[tokio::test]
async fn test_lazy_loading_reads_disk_on_miss() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    let args = json!({"q": "lazy"});
    let calls = Arc::new(AtomicUsize::new(0));

    {
        let cache = open_cache(&config).await;
        let _: String = cache
            .get_or_compute("search", &args, counting(&calls, Duration::ZERO), CacheOptions::new())
            .await
            .unwrap();
        cache.dispose().await.unwrap();
    }

    config.eager_loading = false;
    let cache = open_cache(&config).await;
    assert_eq!(cache.get_stats().size, 0);

    let value: String = cache
        .get_or_compute("search", &args, counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();
    assert_eq!(value, "v1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get_stats().size, 1);
}

#[tokio::test]
async fn test_memory_only_namespace_never_written() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.cache.persistent_namespaces = vec!["search".to_string()];
    let cache = open_cache(&config).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let _: String = cache
        .get_or_compute("scrape", &json!({"url": "a"}), counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();
    let _: String = cache
        .get_or_compute("search", &json!({"q": "a"}), counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();

    assert_eq!(cache.persist_to_disk().await.unwrap(), 1);
    assert!(config.cache_dir().join("search").exists());
    assert!(!config.cache_dir().join("scrape").exists());
}

#[tokio::test]
async fn test_critical_namespace_flushed_without_waiting_for_interval() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.cache.critical_namespaces = vec!["patent".to_string()];
    let cache = open_cache(&config).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"id": "US123"});

    let _: String = cache
        .get_or_compute("patent", &args, counting(&calls, Duration::ZERO), CacheOptions::new())
        .await
        .unwrap();

    let path = config
        .cache_dir()
        .join("patent")
        .join(CacheKey::from_args("patent", &args).file_name());
    for _ in 0..50 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(path.exists());
}

#[tokio::test]
async fn test_cleanup_expired_removes_memory_and_disk() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let cache = open_cache(&config).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let args = json!({"q": "short"});

    let _: String = cache
        .get_or_compute(
            "search",
            &args,
            counting(&calls, Duration::ZERO),
            CacheOptions::new().with_ttl(Duration::from_millis(30)),
        )
        .await
        .unwrap();
    cache.persist_to_disk().await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.cleanup_expired().await.unwrap(), 1);
    assert_eq!(cache.get_stats().size, 0);

    let path = config
        .cache_dir()
        .join("search")
        .join(CacheKey::from_args("search", &args).file_name());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_clear_removes_everything() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));

    for q in ["a", "b", "c"] {
        let _: String = cache
            .get_or_compute("search", &json!({ "q": q }), counting(&calls, Duration::ZERO), CacheOptions::new())
            .await
            .unwrap();
    }
    cache.persist_to_disk().await.unwrap();
    cache.clear().await.unwrap();

    assert_eq!(cache.get_stats().size, 0);
    assert_eq!(cache.load_from_disk().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_namespace_rejected() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let err = cache
        .get_or_compute::<String, _, _>(
            "../etc",
            &json!({}),
            counting(&calls, Duration::ZERO),
            CacheOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScoutError::InvalidInput { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dispose_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(&test_config(&temp)).await;
    cache.dispose().await.unwrap();
    cache.dispose().await.unwrap();
}
