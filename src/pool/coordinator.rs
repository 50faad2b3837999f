//! Pool coordinator: partition, spawn, join, report.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::observer::{NoopObserver, PoolObserver};
use super::partition::partition_evenly;
use super::processor::TaskProcessor;
use super::progress::WorkerProgress;
use super::result::{AggregateReport, TaskResult};
use super::worker::Worker;
use crate::config::PoolConfig;
use crate::error::ConfigError;

/// Spreads a task list over a fixed number of concurrently running workers.
///
/// Each `execute` call splits the tasks evenly, runs one tokio task per
/// non-empty slice and waits for all of them. There is no cancellation: once
/// started, every worker runs its slice to the end.
pub struct WorkerPool<P: TaskProcessor> {
    num_workers: NonZeroUsize,
    processor: Arc<P>,
    max_retries: u32,
    retry_delay: Duration,
    observer: Arc<dyn PoolObserver>,
    /// Workers of the current or most recent run.
    workers: RwLock<Vec<Arc<Worker<P>>>>,
    running: AtomicBool,
}

impl<P: TaskProcessor> WorkerPool<P> {
    /// Create a pool from a validated configuration.
    pub fn new(config: &PoolConfig, processor: P) -> Result<Self, ConfigError> {
        config.validate()?;
        let num_workers = NonZeroUsize::new(config.num_workers).ok_or_else(|| {
            ConfigError::invalid("num_workers", "must be greater than 0, got: 0")
        })?;

        Ok(Self {
            num_workers,
            processor: Arc::new(processor),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            observer: Arc::new(NoopObserver),
            workers: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    /// Report run events to `observer`. Workers share the same observer.
    pub fn with_observer(mut self, observer: Arc<dyn PoolObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers.get()
    }

    /// Whether an `execute` call is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run every task and compile the results.
    ///
    /// Task failures never abort the run; they show up in the report.
    /// Dropping the returned future clears [`is_running`](Self::is_running),
    /// but workers already spawned still finish their slices in the
    /// background.
    pub async fn execute(&self, tasks: Vec<P::Task>) -> AggregateReport<P::Task, P::Output> {
        let _running = RunningGuard::set(&self.running);
        self.run(tasks).await
    }

    async fn run(&self, tasks: Vec<P::Task>) -> AggregateReport<P::Task, P::Output> {
        let run_id = Uuid::new_v4();
        let total = tasks.len();

        if tasks.is_empty() {
            self.workers.write().await.clear();
            self.observer.execution_started(0, 0);
            self.observer.execution_finished(0, 0, Duration::ZERO);
            return AggregateReport::compile(run_id, Vec::new(), Vec::new(), Duration::ZERO);
        }

        let assignments: Vec<(Arc<Worker<P>>, Vec<P::Task>)> =
            partition_evenly(tasks, self.num_workers)
                .into_iter()
                .enumerate()
                .filter(|(_, slice)| !slice.is_empty())
                .map(|(id, slice)| {
                    let worker = Worker::new(
                        id,
                        Arc::clone(&self.processor),
                        self.max_retries,
                        self.retry_delay,
                    )
                    .with_observer(Arc::clone(&self.observer));
                    (Arc::new(worker), slice)
                })
                .collect();

        *self.workers.write().await = assignments.iter().map(|(w, _)| Arc::clone(w)).collect();
        self.observer.execution_started(total, assignments.len());

        let collected: Arc<Mutex<Vec<TaskResult<P::Task, P::Output>>>> =
            Arc::new(Mutex::new(Vec::with_capacity(total)));

        let start = Instant::now();
        let (spawned, handles): (Vec<_>, Vec<_>) = assignments
            .into_iter()
            .map(|(worker, slice)| {
                let task_worker = Arc::clone(&worker);
                let sink = Arc::clone(&collected);
                let handle = tokio::spawn(async move {
                    let results = task_worker.process_all(slice).await;
                    // Held for the append only, never across task execution.
                    sink.lock().await.extend(results);
                });
                (worker, handle)
            })
            .unzip();

        let outcomes = join_all(handles).await;
        let execution_time = start.elapsed();

        for (worker, outcome) in spawned.iter().zip(outcomes) {
            if let Err(e) = outcome {
                let partial = worker.take_results().await;
                let salvaged = partial.len();
                collected.lock().await.extend(partial);
                self.observer
                    .worker_fault(worker.id(), &e.to_string(), salvaged);
            }
        }

        let results = std::mem::take(&mut *collected.lock().await);

        let mut worker_progress = Vec::with_capacity(spawned.len());
        for worker in &spawned {
            worker_progress.push(worker.progress().await);
        }

        let report = AggregateReport::compile(run_id, results, worker_progress, execution_time);
        self.observer
            .execution_finished(report.total_tasks, report.failed, execution_time);
        report
    }

    /// Snapshots of the workers of the current or most recent run.
    ///
    /// Safe to call while `execute` is running.
    pub async fn progress(&self) -> Vec<WorkerProgress> {
        let workers: Vec<Arc<Worker<P>>> = self.workers.read().await.clone();
        let mut snapshots = Vec::with_capacity(workers.len());
        for worker in workers {
            snapshots.push(worker.progress().await);
        }
        snapshots
    }
}

/// Holds the running flag for the lifetime of one `execute` call.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One-shot convenience: build a pool and run `tasks` through it.
pub async fn execute<P: TaskProcessor>(
    processor: P,
    tasks: Vec<P::Task>,
    num_workers: usize,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<AggregateReport<P::Task, P::Output>, ConfigError> {
    let config = PoolConfig {
        num_workers,
        max_retries,
        retry_delay,
        ..PoolConfig::default()
    };
    let pool = WorkerPool::new(&config, processor)?;
    Ok(pool.execute(tasks).await)
}
