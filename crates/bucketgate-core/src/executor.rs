//! Bounded-concurrency fan-out over a batch of items

use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Default maximum number of workers in flight
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Why one item of a batch failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError<E> {
    /// The worker returned an error
    Failed(E),
    /// The worker panicked
    Panicked(String),
    /// The task was aborted before it reported back
    Aborted(String),
}

impl<E: fmt::Display> fmt::Display for TaskError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{}", e),
            Self::Panicked(msg) => write!(f, "worker panicked: {}", msg),
            Self::Aborted(msg) => write!(f, "worker aborted: {}", msg),
        }
    }
}

/// A failed item with its position in the input
#[derive(Debug)]
pub struct BatchFailure<I, E> {
    pub index: usize,
    pub item: I,
    pub error: TaskError<E>,
}

/// Aggregated results of a fan-out
#[derive(Debug)]
pub struct BatchReport<I, T, E> {
    /// Worker results in input order
    pub successes: Vec<T>,
    /// Failed items in input order
    pub failures: Vec<BatchFailure<I, E>>,
    /// Items never issued because cancellation fired first
    pub skipped: Vec<I>,
}

impl<I, T, E> BatchReport<I, T, E> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

type Joined<T, E> = (usize, Result<Result<T, E>, Box<dyn Any + Send>>);

/// Runs a worker over many items with at most `max_concurrency` in flight
#[derive(Clone, Debug)]
pub struct BoundedExecutor {
    max_concurrency: usize,
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

impl BoundedExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Apply `worker` to every item.
    ///
    /// A failing or panicking worker never affects its siblings. Once
    /// `cancel` fires no new worker starts; those in flight drain and the
    /// rest are returned as skipped.
    pub async fn map_concurrent<I, T, E, F, Fut>(
        &self,
        items: Vec<I>,
        worker: F,
        cancel: &CancellationToken,
    ) -> BatchReport<I, T, E>
    where
        I: Clone + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let worker = Arc::new(worker);
        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::new();
        let mut skipped = Vec::new();
        let mut pending = items.into_iter().enumerate();

        while let Some((index, item)) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                skipped.push(item);
                skipped.extend(pending.by_ref().map(|(_, item)| item));
                break;
            };

            let worker = worker.clone();
            let input = item.clone();
            in_flight.insert(index, item);
            tasks.spawn(async move {
                let _permit = permit;
                let result = AssertUnwindSafe(async move { worker(input).await })
                    .catch_unwind()
                    .await;
                (index, result)
            });
        }

        let mut finished = drain(tasks, in_flight).await;
        finished.sort_by_key(|(index, _, _)| *index);

        let mut successes = Vec::with_capacity(finished.len());
        let mut failures = Vec::new();
        for (index, item, result) in finished {
            match result {
                Ok(value) => successes.push(value),
                Err(error) => failures.push(BatchFailure { index, item, error }),
            }
        }

        debug!(
            total,
            succeeded = successes.len(),
            failed = failures.len(),
            skipped = skipped.len(),
            "Batch complete"
        );

        BatchReport {
            successes,
            failures,
            skipped,
        }
    }
}

/// Collect every task; an item whose task never reported back is a failure
async fn drain<I, T, E>(
    mut tasks: JoinSet<Joined<T, E>>,
    mut in_flight: HashMap<usize, I>,
) -> Vec<(usize, I, Result<T, TaskError<E>>)>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let mut finished = Vec::with_capacity(in_flight.len());
    let mut abort_reason = None;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => {
                let Some(item) = in_flight.remove(&index) else {
                    continue;
                };
                let result = match result {
                    Ok(result) => result.map_err(TaskError::Failed),
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        warn!(index, panic = %message, "Batch worker panicked");
                        Err(TaskError::Panicked(message))
                    }
                };
                finished.push((index, item, result));
            }
            Err(e) => {
                error!(error = %e, "Batch task aborted");
                abort_reason = Some(e.to_string());
            }
        }
    }

    let reason = abort_reason.unwrap_or_else(|| "task ended without a result".to_string());
    finished.extend(
        in_flight
            .into_iter()
            .map(|(index, item)| (index, item, Err(TaskError::Aborted(reason.clone())))),
    );
    finished
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_never_exceeds_max_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let executor = BoundedExecutor::new(4);

        let worker = {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            move |n: u64| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2 + n % 5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(n)
                }
            }
        };

        let report = executor
            .map_concurrent((0..40).collect(), worker, &CancellationToken::new())
            .await;

        assert!(report.is_complete());
        assert_eq!(report.successes.len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let executor = BoundedExecutor::new(8);
        // Later items finish first
        let report = executor
            .map_concurrent(
                (0..16u64).collect(),
                |n| async move {
                    tokio::time::sleep(Duration::from_millis(20 - n)).await;
                    Ok::<_, String>(format!("item-{}", n))
                },
                &CancellationToken::new(),
            )
            .await;

        let expected: Vec<String> = (0..16).map(|n| format!("item-{}", n)).collect();
        assert_eq!(report.successes, expected);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_cancel_siblings() {
        let executor = BoundedExecutor::default();
        let report = executor
            .map_concurrent(
                vec!["a", "b", "bad", "c", "d"],
                |key| async move {
                    if key == "bad" {
                        Err(format!("{} failed", key))
                    } else {
                        Ok(key.to_uppercase())
                    }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.successes, vec!["A", "B", "C", "D"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 2);
        assert_eq!(report.failures[0].item, "bad");
        assert_eq!(
            report.failures[0].error,
            TaskError::Failed("bad failed".to_string())
        );
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_failure() {
        let executor = BoundedExecutor::new(2);
        let report = executor
            .map_concurrent(
                vec![1u32, 2, 3],
                |n| async move {
                    if n == 2 {
                        panic!("boom");
                    }
                    Ok::<_, String>(n)
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.successes, vec![1, 3]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error, TaskError::Panicked("boom".to_string()));
    }

    #[tokio::test]
    async fn test_cancel_skips_unissued_items() {
        let executor = BoundedExecutor::new(1);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let report = executor
            .map_concurrent(
                (0..5u32).collect(),
                move |n| {
                    let trigger = trigger.clone();
                    async move {
                        if n == 1 {
                            trigger.cancel();
                        }
                        Ok::<_, String>(n)
                    }
                },
                &cancel,
            )
            .await;

        // Item 1 cancels while it is the only one in flight
        assert_eq!(report.successes, vec![0, 1]);
        assert_eq!(report.skipped, vec![2, 3, 4]);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = BoundedExecutor::default()
            .map_concurrent(
                Vec::<u32>::new(),
                |n| async move { Ok::<_, String>(n) },
                &CancellationToken::new(),
            )
            .await;
        assert!(report.successes.is_empty());
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_aborted_task_is_reported_as_failure() {
        let mut tasks: JoinSet<Joined<u32, String>> = JoinSet::new();
        let mut in_flight = HashMap::new();
        in_flight.insert(0, "done");
        in_flight.insert(1, "stuck");

        tasks.spawn(async { (0, Ok(Ok(7))) });
        let stuck = tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            (1, Ok(Ok(0)))
        });
        stuck.abort();

        let mut finished = drain(tasks, in_flight).await;
        finished.sort_by_key(|(index, _, _)| *index);

        assert_eq!(finished.len(), 2);
        assert!(matches!(finished[0], (0, "done", Ok(7))));
        assert!(matches!(finished[1], (1, "stuck", Err(TaskError::Aborted(_)))));
    }
}
