//! A single worker: one slice of tasks, processed strictly in order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::observer::{NoopObserver, PoolObserver};
use super::processor::TaskProcessor;
use super::progress::{ProgressTracker, WorkerProgress};
use super::result::TaskResult;
use super::retry::RetryPolicy;
use super::state::WorkerState;

/// Runs an assigned slice of tasks sequentially, retrying each failed task.
///
/// The worker never gives up on its slice: a task that exhausts its attempts
/// is recorded as failed and the next task starts.
pub struct Worker<P: TaskProcessor> {
    id: usize,
    processor: Arc<P>,
    retry: RetryPolicy,
    progress: ProgressTracker,
    /// Results of the current run, appended as each task resolves.
    results: Mutex<Vec<TaskResult<P::Task, P::Output>>>,
    observer: Arc<dyn PoolObserver>,
}

impl<P: TaskProcessor> Worker<P> {
    /// Create an idle worker. `max_retries` is the total attempts per task.
    pub fn new(id: usize, processor: Arc<P>, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            id,
            processor,
            retry: RetryPolicy::new(max_retries, retry_delay),
            progress: ProgressTracker::new(id),
            results: Mutex::new(Vec::new()),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Report events to `observer` instead of discarding them.
    pub fn with_observer(mut self, observer: Arc<dyn PoolObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Process `tasks` in order and return one result per task.
    ///
    /// Each call starts a fresh run: progress counters are reset first.
    pub async fn process_all(
        &self,
        tasks: Vec<P::Task>,
    ) -> Vec<TaskResult<P::Task, P::Output>> {
        self.results.lock().await.clear();
        self.progress.begin().await;
        self.observer.worker_started(self.id, tasks.len());

        for task in tasks {
            let result = self.process_one(task).await;
            self.results.lock().await.push(result);
        }

        let finished = self
            .progress
            .update(|p| {
                // Active -> Completed; begin() guarantees the source state.
                let _ = p.transition_to(WorkerState::Completed);
                p.clone()
            })
            .await;
        self.observer.worker_completed(&finished);

        self.take_results().await
    }

    async fn process_one(&self, task: P::Task) -> TaskResult<P::Task, P::Output> {
        let label = format!("{task:?}");
        self.progress
            .update(|p| p.current_task = Some(label.clone()))
            .await;

        let max_attempts = self.retry.max_attempts();
        let attempted = self
            .retry
            .run(
                || self.processor.process(&task),
                |attempt, e| {
                    self.observer
                        .attempt_failed(self.id, attempt, max_attempts, &e.to_string())
                },
            )
            .await;

        match attempted.outcome {
            Ok(output) => {
                self.progress
                    .update(|p| {
                        p.tasks_completed += 1;
                        p.current_task = None;
                    })
                    .await;
                TaskResult::succeeded(
                    self.id,
                    task,
                    output,
                    attempted.attempts,
                    attempted.elapsed,
                )
            }
            Err(e) => {
                let message = e.to_string();
                self.progress
                    .update(|p| {
                        p.tasks_failed += 1;
                        p.current_task = None;
                        p.error_message = Some(message.clone());
                    })
                    .await;
                self.observer.task_failed(self.id, &label, &message);
                TaskResult::failed(
                    self.id,
                    task,
                    message,
                    attempted.attempts,
                    attempted.elapsed,
                )
            }
        }
    }

    /// Consistent copy of this worker's progress.
    pub async fn progress(&self) -> WorkerProgress {
        self.progress.snapshot().await
    }

    /// Drain the results recorded so far in the current run.
    pub async fn take_results(&self) -> Vec<TaskResult<P::Task, P::Output>> {
        std::mem::take(&mut *self.results.lock().await)
    }
}
