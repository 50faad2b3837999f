//! Batch conductor: fixed-size batches, one session each, bounded concurrency.

use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::report::{BatchOutcome, BatchReport, FailedItem, ItemResult};
use super::session::{BatchSession, SessionFactory};
use crate::config::BatchConfig;
use crate::error::ConfigError;
use crate::pool::partition::divide;
use crate::pool::retry::RetryPolicy;

type Item<F> = <<F as SessionFactory>::Session as BatchSession>::Item;
type Output<F> = <<F as SessionFactory>::Session as BatchSession>::Output;

/// Splits a large item list into batches and runs each batch through its own
/// session, never more than `max_workers` at a time.
pub struct BatchConductor<F: SessionFactory> {
    factory: Arc<F>,
    max_workers: NonZeroUsize,
    batch_size: NonZeroUsize,
    retry: RetryPolicy,
}

impl<F: SessionFactory> BatchConductor<F> {
    pub fn new(config: &BatchConfig, factory: F) -> Result<Self, ConfigError> {
        config.validate()?;
        let max_workers = NonZeroUsize::new(config.max_workers)
            .ok_or_else(|| ConfigError::invalid("max_workers", "must be greater than 0, got: 0"))?;
        let batch_size = NonZeroUsize::new(config.batch_size)
            .ok_or_else(|| ConfigError::invalid("batch_size", "must be greater than 0, got: 0"))?;

        Ok(Self {
            factory: Arc::new(factory),
            max_workers,
            batch_size,
            retry: RetryPolicy::new(config.max_retries, config.retry_delay),
        })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers.get()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// Split `items` into consecutive batches of at most `batch_size`.
    pub fn divide(&self, items: Vec<Item<F>>) -> Vec<Vec<Item<F>>> {
        let total = items.len();
        let batches = divide(items, self.batch_size);
        info!(
            items = total,
            batches = batches.len(),
            batch_size = self.batch_size.get(),
            "Divided items into batches"
        );
        batches
    }

    /// Process every item and merge the per-batch outcomes.
    ///
    /// Results are grouped by batch, in batch order.
    pub async fn run(&self, items: Vec<Item<F>>) -> BatchReport<Item<F>, Output<F>> {
        let run_id = Uuid::new_v4();
        let batches = self.divide(items);
        let batch_count = batches.len();

        if batches.is_empty() {
            info!(%run_id, "No items to process");
            return BatchReport::compile(run_id, 0, Vec::new(), std::time::Duration::ZERO);
        }

        info!(
            %run_id,
            batches = batch_count,
            max_workers = self.max_workers.get(),
            "Starting batch run"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers.get()));
        let start = Instant::now();

        let (kept, handles): (Vec<_>, Vec<_>) = batches
            .into_iter()
            .enumerate()
            .map(|(batch_id, batch)| {
                let kept = (batch_id, batch.clone());
                let factory = Arc::clone(&self.factory);
                let semaphore = Arc::clone(&semaphore);
                let retry = self.retry;
                let handle = tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            error!(batch_id, error = %e, "Could not acquire batch slot");
                            return BatchOutcome::all_failed(batch_id, batch, &e.to_string());
                        }
                    };
                    run_batch(factory.as_ref(), batch_id, batch, retry).await
                });
                (kept, handle)
            })
            .unzip();

        let joined = join_all(handles).await;
        let execution_time = start.elapsed();

        let outcomes: Vec<BatchOutcome<Item<F>, Output<F>>> = kept
            .into_iter()
            .zip(joined)
            .map(|((batch_id, batch), joined)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(batch_id, error = %e, "Batch task panicked");
                    BatchOutcome::all_failed(batch_id, batch, &format!("Batch panicked: {e}"))
                }
            })
            .collect();

        let report = BatchReport::compile(run_id, batch_count, outcomes, execution_time);
        info!(
            %run_id,
            total = report.total_items,
            successful = report.successful,
            failed = report.failed,
            elapsed_secs = execution_time.as_secs_f64(),
            "Batch run finished"
        );
        report
    }
}

/// Connect, authenticate, process and disconnect one batch.
async fn run_batch<F: SessionFactory>(
    factory: &F,
    batch_id: usize,
    items: Vec<Item<F>>,
    retry: RetryPolicy,
) -> BatchOutcome<Item<F>, Output<F>> {
    let mut session = factory.create(batch_id);

    if let Err(e) = session.connect().await {
        error!(batch_id, error = %e, "Batch session failed to connect");
        return BatchOutcome::all_failed(batch_id, items, &e.to_string());
    }

    // Kept for failing the batch if the session panics mid-way.
    let pending = items.clone();
    let stage = AssertUnwindSafe(authenticate_and_process(&mut session, batch_id, items, retry))
        .catch_unwind()
        .await;

    let outcome = match stage {
        Ok(outcome) => outcome,
        Err(payload) => {
            let reason = panic_reason(payload.as_ref());
            error!(batch_id, reason = %reason, "Batch session panicked");
            BatchOutcome::all_failed(batch_id, pending, &format!("Batch panicked: {reason}"))
        }
    };

    session.disconnect().await;
    debug!(
        batch_id,
        successful = outcome.results.len(),
        failed = outcome.failed.len(),
        "Batch session closed"
    );
    outcome
}

async fn authenticate_and_process<S: BatchSession>(
    session: &mut S,
    batch_id: usize,
    items: Vec<S::Item>,
    retry: RetryPolicy,
) -> BatchOutcome<S::Item, S::Output> {
    match session.authenticate().await {
        Ok(()) => {
            info!(batch_id, items = items.len(), "Batch authenticated");
            process_items(session, batch_id, items, retry).await
        }
        Err(e) => {
            error!(batch_id, error = %e, "Batch authentication failed");
            BatchOutcome::all_failed(batch_id, items, &e.to_string())
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn process_items<S: BatchSession>(
    session: &S,
    batch_id: usize,
    items: Vec<S::Item>,
    retry: RetryPolicy,
) -> BatchOutcome<S::Item, S::Output> {
    let mut outcome = BatchOutcome::new();
    let max_attempts = retry.max_attempts();

    for item in items {
        let attempted = retry
            .run(
                || session.process(&item),
                |attempt, e| {
                    warn!(batch_id, item = ?item, attempt, max_attempts, error = %e, "Item attempt failed");
                },
            )
            .await;

        match attempted.outcome {
            Ok(output) => outcome.results.push(ItemResult {
                batch_id,
                item,
                output,
                attempts: attempted.attempts,
                execution_time: attempted.elapsed,
            }),
            Err(e) => {
                warn!(batch_id, item = ?item, error = %e, "Item failed");
                outcome.failed.push(FailedItem {
                    batch_id,
                    item,
                    error: e.to_string(),
                });
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{SessionError, TaskError};

    #[derive(Default)]
    struct Counters {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        processed: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    struct StubSession {
        batch_id: usize,
        counters: Arc<Counters>,
        deny_auth: bool,
        refuse_connect: bool,
        work: Duration,
    }

    #[async_trait]
    impl BatchSession for StubSession {
        type Item = String;
        type Output = usize;

        async fn connect(&mut self) -> Result<(), SessionError> {
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse_connect {
                return Err(SessionError::Connect(format!("batch {}", self.batch_id)));
            }
            let now = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.peak.fetch_max(now, Ordering::SeqCst);
            Ok(())
        }

        async fn authenticate(&mut self) -> Result<(), SessionError> {
            if self.deny_auth {
                Err(SessionError::AuthFailed("token rejected".into()))
            } else {
                Ok(())
            }
        }

        async fn process(&self, item: &String) -> Result<usize, TaskError> {
            self.counters.processed.fetch_add(1, Ordering::SeqCst);
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            if item == "BOOM" {
                panic!("session crashed on {item}");
            }
            if item.ends_with('7') {
                return Err(TaskError::Failed(format!("no record for {item}")));
            }
            Ok(item.len())
        }

        async fn disconnect(&mut self) {
            self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
            self.counters.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct StubFactory {
        counters: Arc<Counters>,
        deny_auth: HashSet<usize>,
        refuse_connect: HashSet<usize>,
        work: Duration,
    }

    impl SessionFactory for StubFactory {
        type Session = StubSession;

        fn create(&self, batch_id: usize) -> StubSession {
            StubSession {
                batch_id,
                counters: Arc::clone(&self.counters),
                deny_auth: self.deny_auth.contains(&batch_id),
                refuse_connect: self.refuse_connect.contains(&batch_id),
                work: self.work,
            }
        }
    }

    fn config(max_workers: usize, batch_size: usize) -> BatchConfig {
        BatchConfig {
            max_workers,
            batch_size,
            ..BatchConfig::default()
        }
    }

    fn items(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("PRI{i:04}")).collect()
    }

    #[test]
    fn zero_limits_rejected() {
        assert!(BatchConductor::new(&config(0, 10), StubFactory::default()).is_err());
        assert!(BatchConductor::new(&config(2, 0), StubFactory::default()).is_err());
    }

    #[test]
    fn divide_uses_batch_size() {
        let conductor = BatchConductor::new(&config(5, 30), StubFactory::default()).unwrap();
        let sizes: Vec<usize> = conductor.divide(items(75)).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![30, 30, 15]);
    }

    #[tokio::test]
    async fn every_item_accounted_for() {
        let factory = StubFactory::default();
        let counters = Arc::clone(&factory.counters);
        let conductor = BatchConductor::new(&config(3, 4), factory).unwrap();

        let report = conductor.run(items(20)).await;

        assert_eq!(report.batch_count, 5);
        assert_eq!(report.total_items, 20);
        // PRI0007 and PRI0017 have no record.
        assert_eq!(report.failed, 2);
        assert_eq!(report.successful, 18);
        assert_eq!(counters.connects.load(Ordering::SeqCst), 5);
        assert_eq!(counters.disconnects.load(Ordering::SeqCst), 5);

        let batch_ids: Vec<usize> = report.results.iter().map(|r| r.batch_id).collect();
        let mut sorted = batch_ids.clone();
        sorted.sort_unstable();
        assert_eq!(batch_ids, sorted);
    }

    #[tokio::test]
    async fn auth_failure_fails_whole_batch_without_processing() {
        let factory = StubFactory {
            deny_auth: HashSet::from([1]),
            ..StubFactory::default()
        };
        let counters = Arc::clone(&factory.counters);
        let conductor = BatchConductor::new(&config(2, 3), factory).unwrap();

        let report = conductor.run(items(6)).await;

        assert_eq!(report.successful, 3);
        assert_eq!(report.failed, 3);
        assert!(report.failed_items.iter().all(|f| f.batch_id == 1));
        assert!(report.failed_items[0].error.starts_with("Authentication failed"));
        assert_eq!(counters.processed.load(Ordering::SeqCst), 3);
        assert_eq!(counters.disconnects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn connect_failure_skips_disconnect() {
        let factory = StubFactory {
            refuse_connect: HashSet::from([0]),
            ..StubFactory::default()
        };
        let counters = Arc::clone(&factory.counters);
        let conductor = BatchConductor::new(&config(2, 2), factory).unwrap();

        let report = conductor.run(items(4)).await;

        assert_eq!(report.failed, 2);
        assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
        assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrency_bounded_by_max_workers() {
        let factory = StubFactory {
            work: Duration::from_millis(10),
            ..StubFactory::default()
        };
        let counters = Arc::clone(&factory.counters);
        let conductor = BatchConductor::new(&config(2, 2), factory).unwrap();

        let report = conductor.run(items(12)).await;

        assert_eq!(report.batch_count, 6);
        let peak = counters.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency {peak} exceeded max_workers");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn retries_each_failing_item() {
        let factory = StubFactory::default();
        let counters = Arc::clone(&factory.counters);
        let conductor = BatchConductor::new(
            &BatchConfig {
                max_retries: 3,
                ..config(1, 10)
            },
            factory,
        )
        .unwrap();

        let report = conductor.run(items(7)).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_items[0].item, "PRI0007");
        // Six successes on the first try plus three attempts for PRI0007.
        assert_eq!(counters.processed.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn panicking_batch_fails_only_itself() {
        let factory = StubFactory::default();
        let counters = Arc::clone(&factory.counters);
        let conductor = BatchConductor::new(&config(2, 2), factory).unwrap();
        let input = vec![
            "PRI0001".to_string(),
            "BOOM".to_string(),
            "PRI0003".to_string(),
            "PRI0004".to_string(),
        ];

        let report = conductor.run(input).await;

        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 2);
        assert!(report
            .failed_items
            .iter()
            .all(|f| f.batch_id == 0 && f.error.starts_with("Batch panicked")));
        assert!(report.failed_items[0].error.contains("session crashed on BOOM"));
        // The panicking session is still disconnected.
        assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
        assert_eq!(counters.disconnects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_report() {
        let conductor = BatchConductor::new(&config(2, 2), StubFactory::default()).unwrap();
        let report = conductor.run(Vec::new()).await;
        assert_eq!(report.batch_count, 0);
        assert_eq!(report.total_items, 0);
        assert_eq!(report.success_rate, 0.0);
    }
}
