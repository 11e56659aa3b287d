//! Bounded-concurrency batch fan-out with retry, backoff, and streaming.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};

use crate::error::BatchError;

/// Outcome of processing a single batch item.
#[derive(Debug, Clone)]
pub struct BatchItemResult<T, U, E> {
    pub item: T,
    pub result: Option<U>,
    pub error: Option<E>,
    pub attempts: u32,
}

/// Tuning knobs for [`BatchProcessor`].
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl From<crate::config::BatchConfig> for BatchConfig {
    fn from(c: crate::config::BatchConfig) -> Self {
        Self {
            max_concurrency: c.max_concurrency,
            retry_attempts: c.retry_attempts,
            retry_delay: c.retry_delay,
        }
    }
}

/// Bounded-concurrency fan-out over an input sequence, with per-item retry.
pub struct BatchProcessor {
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig) -> Result<Self, BatchError> {
        if config.max_concurrency == 0 {
            return Err(BatchError::InvalidConcurrency);
        }
        Ok(Self { config })
    }

    /// Runs `f` over every item in `items`, preserving input order in the
    /// result vector. Never materializes more than `max_concurrency`
    /// concurrently-running tasks.
    pub async fn process<T, U, E, F, Fut>(&self, items: Vec<T>, f: F) -> Vec<BatchItemResult<T, U, E>>
    where
        T: Clone + Send + 'static,
        U: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, E>> + Send,
    {
        let total = items.len();
        let mut results: Vec<Option<BatchItemResult<T, U, E>>> = (0..total).map(|_| None).collect();

        let mut stream = self.process_stream_indexed(items, f);
        while let Some((idx, item_result)) = stream.recv().await {
            results[idx] = Some(item_result);
        }

        results.into_iter().map(|r| r.expect("every index settles exactly once")).collect()
    }

    /// Streaming variant: yields results in completion order via an
    /// `mpsc::Receiver`, without ever holding more than `max_concurrency`
    /// tasks in flight.
    pub fn process_stream<T, U, E, F, Fut>(
        &self,
        items: Vec<T>,
        f: F,
    ) -> mpsc::Receiver<BatchItemResult<T, U, E>>
    where
        T: Clone + Send + 'static,
        U: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, E>> + Send,
    {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        let config = self.config;
        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
            let f = Arc::new(f);
            let mut handles = Vec::with_capacity(items.len());

            for item in items {
                if tx.is_closed() {
                    break;
                }
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                let f = f.clone();
                let tx = tx.clone();
                handles.push(tokio::spawn(run_with_retry(permit, item, f, config, tx)));
            }

            for h in handles {
                let _ = h.await;
            }
        });
        rx
    }

    /// Same as [`BatchProcessor::process_stream`] but tags each result with
    /// its original index, so [`BatchProcessor::process`] can restore input
    /// order without requiring `Fut::Output` to carry that information.
    fn process_stream_indexed<T, U, E, F, Fut>(
        &self,
        items: Vec<T>,
        f: F,
    ) -> mpsc::Receiver<(usize, BatchItemResult<T, U, E>)>
    where
        T: Clone + Send + 'static,
        U: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, E>> + Send,
    {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        let config = self.config;
        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
            let f = Arc::new(f);
            let mut handles = Vec::with_capacity(items.len());

            for (idx, item) in items.into_iter().enumerate() {
                if tx.is_closed() {
                    break;
                }
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore not closed");
                let f = f.clone();
                let tx = tx.clone();
                handles.push(tokio::spawn(run_with_retry_indexed(
                    permit, idx, item, f, config, tx,
                )));
            }

            for h in handles {
                let _ = h.await;
            }
        });
        rx
    }

    /// Runs `f` over `items` with an `on_progress(completed, total)`
    /// callback invoked after each task settles.
    pub async fn process_with_progress<T, U, E, F, Fut, P>(
        &self,
        items: Vec<T>,
        f: F,
        mut on_progress: P,
    ) -> Vec<BatchItemResult<T, U, E>>
    where
        T: Clone + Send + 'static,
        U: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, E>> + Send,
        P: FnMut(usize, usize),
    {
        let total = items.len();
        let mut results: Vec<Option<BatchItemResult<T, U, E>>> = (0..total).map(|_| None).collect();
        let mut completed = 0;

        let mut stream = self.process_stream_indexed(items, f);
        while let Some((idx, item_result)) = stream.recv().await {
            results[idx] = Some(item_result);
            completed += 1;
            on_progress(completed, total);
        }

        results.into_iter().map(|r| r.expect("every index settles exactly once")).collect()
    }
}

async fn run_with_retry<T, U, E, F, Fut>(
    permit: tokio::sync::OwnedSemaphorePermit,
    item: T,
    f: Arc<F>,
    config: BatchConfig,
    tx: mpsc::Sender<BatchItemResult<T, U, E>>,
) where
    T: Clone + Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, E>> + Send,
{
    let result = settle_with_retry(item, f, config).await;
    drop(permit);
    let _ = tx.send(result).await;
}

async fn run_with_retry_indexed<T, U, E, F, Fut>(
    permit: tokio::sync::OwnedSemaphorePermit,
    idx: usize,
    item: T,
    f: Arc<F>,
    config: BatchConfig,
    tx: mpsc::Sender<(usize, BatchItemResult<T, U, E>)>,
) where
    T: Clone + Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, E>> + Send,
{
    let result = settle_with_retry(item, f, config).await;
    drop(permit);
    let _ = tx.send((idx, result)).await;
}

async fn settle_with_retry<T, U, E, F, Fut>(
    item: T,
    f: Arc<F>,
    config: BatchConfig,
) -> BatchItemResult<T, U, E>
where
    T: Clone + Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, E>> + Send,
{
    let mut attempts = 0u32;
    let max_attempts = config.retry_attempts.max(1);

    loop {
        attempts += 1;
        match f(item.clone()).await {
            Ok(value) => {
                return BatchItemResult {
                    item,
                    result: Some(value),
                    error: None,
                    attempts,
                };
            }
            Err(err) => {
                if attempts >= max_attempts {
                    return BatchItemResult {
                        item,
                        result: None,
                        error: Some(err),
                        attempts,
                    };
                }
                tokio::time::sleep(config.retry_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(max_concurrency: usize, retry_attempts: u32) -> BatchConfig {
        BatchConfig {
            max_concurrency,
            retry_attempts,
            retry_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_result() {
        let processor = BatchProcessor::new(config(3, 1)).unwrap();
        let results: Vec<BatchItemResult<i32, i32, String>> = processor
            .process(vec![], |n: i32| async move { Ok::<_, String>(n * 2) })
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn results_preserve_input_order() {
        let processor = BatchProcessor::new(config(3, 1)).unwrap();
        let items: Vec<i32> = (1..=10).collect();
        let results = processor
            .process(items.clone(), |n: i32| async move { Ok::<_, String>(n * 2) })
            .await;

        assert_eq!(results.len(), 10);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.item, items[i]);
            assert_eq!(r.result, Some(items[i] * 2));
            assert_eq!(r.attempts, 1);
        }
    }

    #[tokio::test]
    async fn retries_happen_per_item_and_succeed() {
        let processor = BatchProcessor::new(config(3, 3)).unwrap();
        let tries = Arc::new(std::sync::Mutex::new(std::collections::HashMap::<i32, u32>::new()));

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
                        Ok(n * 10)
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

    #[tokio::test]
    async fn max_concurrency_is_respected() {
        let processor = BatchProcessor::new(config(3, 1)).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let active2 = active.clone();
        let max2 = max_observed.clone();
        let items: Vec<i32> = (0..20).collect();
        let _ = processor
            .process(items, move |n: i32| {
                let active = active2.clone();
                let max_observed = max2.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(n)
                }
            })
            .await;

        assert!(max_observed.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn progress_callback_reaches_total() {
        let processor = BatchProcessor::new(config(3, 1)).unwrap();
        let calls = Arc::new(std::sync::Mutex::new(Vec::<(usize, usize)>::new()));
        let calls2 = calls.clone();

        let _ = processor
            .process_with_progress(
                (1..=10).collect(),
                |n: i32| async move { Ok::<_, String>(n * 2) },
                move |done, total| calls2.lock().unwrap().push((done, total)),
            )
            .await;

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded.last(), Some(&(10, 10)));
    }

    #[tokio::test]
    async fn zero_concurrency_is_rejected() {
        let result = BatchProcessor::new(config(0, 1));
        assert!(matches!(result, Err(BatchError::InvalidConcurrency)));
    }

    #[tokio::test]
    async fn dropped_receiver_stops_issuing_new_tasks() {
        let processor = BatchProcessor::new(config(1, 1)).unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        let started2 = started.clone();

        let items: Vec<i32> = (0..50).collect();
        let rx = processor.process_stream(items, move |n: i32| {
            let started = started2.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, String>(n)
            }
        });

        // Receive exactly one result, then drop the receiver.
        let mut rx = rx;
        let _ = rx.recv().await;
        drop(rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(started.load(Ordering::SeqCst) < 50);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn batch_completeness(
            count in 0usize..40,
            max_concurrency in 1usize..8,
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let processor = BatchProcessor::new(BatchConfig {
                    max_concurrency,
                    retry_attempts: 1,
                    retry_delay: Duration::from_millis(1),
                })
                .unwrap();

                let items: Vec<i32> = (0..count as i32).collect();
                let results = processor
                    .process(items.clone(), |n: i32| async move { Ok::<_, String>(n * 2) })
                    .await;

                prop_assert_eq!(results.len(), items.len());
                for (i, r) in results.iter().enumerate() {
                    prop_assert_eq!(r.item, items[i]);
                    prop_assert_eq!(r.result, Some(items[i] * 2));
                }
                Ok(())
            })?;
        }
    }
}
