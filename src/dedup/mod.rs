//! Single-flight request deduplication.
//!
//! Collapses concurrent identical in-flight operations behind one shared
//! future. Built on `futures::future::Shared`, which requires `Output:
//! Clone` — callers therefore produce `Result<Arc<T>, Arc<E>>` so that
//! neither success nor error payload needs its own `Clone` impl.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{FutureExt, Shared};
use tokio::sync::Mutex;

type SharedResult<T, E> = Result<Arc<T>, Arc<E>>;
type SharedFut<T, E> =
    Shared<std::pin::Pin<Box<dyn Future<Output = SharedResult<T, E>> + Send>>>;

struct InFlight<T, E> {
    future: SharedFut<T, E>,
    started_at: Instant,
}

/// Snapshot of deduplication effectiveness.
#[derive(Debug, Clone, Copy, Default)]
pub struct DedupStats {
    pub hits: u64,
    pub misses: u64,
    pub active_requests: usize,
    pub total_response_time: Duration,
    pub settled_count: u64,
}

impl DedupStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn average_response_time(&self) -> Duration {
        if self.settled_count == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.settled_count as u32
        }
    }
}

struct Inner<T, E> {
    table: HashMap<String, InFlight<T, E>>,
    hits: u64,
    misses: u64,
    total_response_time: Duration,
    settled_count: u64,
}

/// Coalesces concurrent `dedupe` calls for the same key into one in-flight
/// operation. Generic over a success type `T` and error type `E` — both
/// travel wrapped in `Arc` so every waiter can hold its own clone of the
/// settlement value.
pub struct RequestDeduplicator<T, E> {
    inner: Mutex<Inner<T, E>>,
    ttl: Duration,
}

impl<T, E> RequestDeduplicator<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                table: HashMap::new(),
                hits: 0,
                misses: 0,
                total_response_time: Duration::ZERO,
                settled_count: 0,
            }),
            ttl,
        }
    }

    /// Runs `produce` for `key`, or joins an existing in-flight call.
    ///
    /// `produce` is only invoked when this call wins the race to create a
    /// fresh entry — every other concurrent caller observes the same
    /// `SharedFut` and receives the same `Arc`-wrapped settlement.
    pub async fn dedupe<F, Fut>(&self, key: &str, produce: F) -> SharedResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let now = Instant::now();
        let mut guard = self.inner.lock().await;

        if let Some(entry) = guard.table.get(key) {
            if now.duration_since(entry.started_at) < self.ttl {
                guard.hits += 1;
                let fut = entry.future.clone();
                drop(guard);
                return fut.await;
            }
            guard.table.remove(key);
        }

        guard.misses += 1;
        let started_at = now;
        let boxed: std::pin::Pin<Box<dyn Future<Output = SharedResult<T, E>> + Send>> =
            Box::pin(async move {
                match produce().await {
                    Ok(v) => Ok(Arc::new(v)),
                    Err(e) => Err(Arc::new(e)),
                }
            });
        let shared = boxed.shared();
        guard.table.insert(
            key.to_string(),
            InFlight {
                future: shared.clone(),
                started_at,
            },
        );
        drop(guard);

        let result = shared.await;

        let mut guard = self.inner.lock().await;
        guard.table.remove(key);
        guard.total_response_time += started_at.elapsed();
        guard.settled_count += 1;
        result
    }

    pub async fn stats(&self) -> DedupStats {
        let guard = self.inner.lock().await;
        DedupStats {
            hits: guard.hits,
            misses: guard.misses,
            active_requests: guard.table.len(),
            total_response_time: guard.total_response_time,
            settled_count: guard.settled_count,
        }
    }
}
