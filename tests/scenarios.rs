//! End-to-end scenarios against an in-memory stub handler, exercising the
//! cached resource handler, deduplication, and the batch processor the way
//! a real vault handler and upstream client would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use obsidian_mcp_server::batch::{BatchConfig, BatchProcessor};
use obsidian_mcp_server::cache::CacheConfig;
use obsidian_mcp_server::error::Error;
use obsidian_mcp_server::notify::{Event, EventKind, NotificationBus};
use obsidian_mcp_server::resources::{CachedResourceHandler, RawResourceHandler, ResourceRegistry};

/// A raw handler whose responses and latency are fully controlled by the
/// test, with a call counter the test asserts against.
struct CountingHandler {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    value: serde_json::Value,
}

#[async_trait]
impl RawResourceHandler for CountingHandler {
    async fn handle_request(
        &self,
        _uri: &str,
        _params: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.value.clone())
    }
}

fn build_handler(
    uri: &str,
    handler: Arc<dyn RawResourceHandler>,
    cache_config: CacheConfig,
) -> (Arc<CachedResourceHandler>, NotificationBus) {
    let mut registry = ResourceRegistry::new();
    registry.register_static(uri, handler);
    let bus = NotificationBus::new();
    let cached = CachedResourceHandler::new(registry, cache_config, &bus);
    (cached, bus)
}

/// S1: empty cache, TTL 300s, two back-to-back reads of `vault://tags`
/// produce one upstream call and identical results; stats show hits=1,
/// misses=1.
#[tokio::test]
async fn s1_repeated_read_hits_cache_after_first_miss() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(CountingHandler {
        calls: calls.clone(),
        delay: Duration::ZERO,
        value: json!({ "tags": [{ "name": "a", "count": 3 }] }),
    });
    let config = CacheConfig {
        default_ttl: Duration::from_secs(300),
        ..CacheConfig::default()
    };
    let (cached, _bus) = build_handler("vault://tags", handler, config);

    let first = cached.execute("vault://tags").await.unwrap();
    let second = cached.execute("vault://tags").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first_json = serde_json::to_value(&first).unwrap();
    let second_json = serde_json::to_value(&second).unwrap();
    assert_eq!(first_json, second_json);

    let stats = cached.stats().await;
    assert_eq!(stats.cache.hits, 1);
    assert_eq!(stats.cache.misses, 1);
}

/// S2: 5 concurrent reads of a slow note resource collapse into one
/// upstream call via single-flight deduplication.
#[tokio::test]
async fn s2_concurrent_reads_single_flight() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(CountingHandler {
        calls: calls.clone(),
        delay: Duration::from_millis(100),
        value: json!("# x"),
    });
    let (cached, _bus) = build_handler("vault://note/x.md", handler, CacheConfig::default());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let cached = cached.clone();
        handles.push(tokio::spawn(
            async move { cached.execute("vault://note/x.md").await },
        ));
    }

    for h in handles {
        let result = h.await.unwrap().unwrap();
        assert_eq!(serde_json::to_value(&result).unwrap()["contents"], json!("# x"));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = cached.stats().await;
    assert_eq!(stats.dedup.hits, 4);
    assert_eq!(stats.dedup.misses, 1);
}

/// S3: emitting `file:updated` invalidates the cached `vault://recent` page,
/// so the next read triggers the upstream handler again.
#[tokio::test]
async fn s3_file_updated_invalidates_recent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(CountingHandler {
        calls: calls.clone(),
        delay: Duration::ZERO,
        value: json!({ "recent": [] }),
    });
    let (cached, bus) = build_handler("vault://recent", handler, CacheConfig::default());

    let _ = cached.execute("vault://recent?offset=0&limit=10").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    bus.emit(Event::new(EventKind::FileUpdated).with_path("a.md"));

    let _ = cached.execute("vault://recent?offset=0&limit=10").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// S4: a batch of 10 items under bounded concurrency with no failures
/// completes all of them at attempts=1, with a final progress callback of
/// (10, 10).
#[tokio::test]
async fn s4_batch_doubles_with_no_failures() {
    let processor = BatchProcessor::new(BatchConfig {
        max_concurrency: 3,
        retry_attempts: 1,
        retry_delay: Duration::from_millis(1),
    })
    .unwrap();

    let progress = Arc::new(Mutex::new(Vec::new()));
    let progress2 = progress.clone();

    let results = processor
        .process_with_progress(
            (1..=10).collect(),
            |n: i32| async move { Ok::<_, String>(n * 2) },
            move |done, total| progress2.lock().unwrap().push((done, total)),
        )
        .await;

    assert_eq!(results.len(), 10);
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.item, (i + 1) as i32);
        assert_eq!(r.result, Some((i + 1) as i32 * 2));
        assert_eq!(r.attempts, 1);
    }
    assert_eq!(progress.lock().unwrap().last(), Some(&(10, 10)));
}

/// S5: items 2 and 4 fail once then succeed on retry; all five items
/// eventually succeed, with attempts reflecting the retries.
#[tokio::test]
async fn s5_per_item_retry_recovers_transient_failures() {
    let processor = BatchProcessor::new(BatchConfig {
        max_concurrency: 5,
        retry_attempts: 3,
        retry_delay: Duration::from_millis(1),
    })
    .unwrap();

    let tries: Arc<Mutex<HashMap<i32, u32>>> = Arc::new(Mutex::new(HashMap::new()));
    let tries2 = tries.clone();

    let results = processor
        .process(vec![1, 2, 3, 4, 5], move |n: i32| {
            let tries = tries2.clone();
            async move {
                let mut guard = tries.lock().unwrap();
                let count = guard.entry(n).or_insert(0);
                *count += 1;
                let this_try = *count;
                drop(guard);

                if (n == 2 || n == 4) && this_try < 2 {
                    Err::<i32, String>("transient".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

    for r in &results {
        assert!(r.error.is_none());
        if r.item == 2 || r.item == 4 {
            assert!(r.attempts >= 2);
        } else {
            assert_eq!(r.attempts, 1);
        }
    }
}

/// S6: `?page=2&limit=10` and `?offset=10&limit=10` against the same base
/// URI produce one upstream call and a cache hit on the second.
#[tokio::test]
async fn s6_pagination_equivalence_shares_one_cache_entry() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(CountingHandler {
        calls: calls.clone(),
        delay: Duration::ZERO,
        value: json!({ "entries": [] }),
    });
    let (cached, _bus) = build_handler("vault://recent", handler, CacheConfig::default());

    let _ = cached.execute("vault://recent?page=2&limit=10").await.unwrap();
    let _ = cached.execute("vault://recent?offset=10&limit=10").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = cached.stats().await;
    assert_eq!(stats.cache.hits, 1);
}
