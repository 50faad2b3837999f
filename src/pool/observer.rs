//! Run-event observer injected into the pool and its workers.
//!
//! Workers and the coordinator report what happens to an observer instead
//! of logging directly. The default is [`NoopObserver`]; [`TracingObserver`]
//! forwards events to `tracing`.

use std::time::Duration;

use tracing::{error, info, warn};

use super::progress::WorkerProgress;

/// Receives pool lifecycle events. Every method defaults to doing nothing.
pub trait PoolObserver: Send + Sync {
    /// `execute` is about to spawn `workers` workers for `total_tasks` tasks.
    fn execution_started(&self, _total_tasks: usize, _workers: usize) {}

    /// A worker picked up its slice.
    fn worker_started(&self, _worker_id: usize, _task_count: usize) {}

    /// One attempt of a task failed. `attempt` is 1-based.
    fn attempt_failed(&self, _worker_id: usize, _attempt: u32, _max_attempts: u32, _error: &str) {}

    /// A task exhausted all of its attempts.
    fn task_failed(&self, _worker_id: usize, _task: &str, _error: &str) {}

    /// A worker finished its slice.
    fn worker_completed(&self, _progress: &WorkerProgress) {}

    /// A worker died outside its per-task error handling.
    fn worker_fault(&self, _worker_id: usize, _reason: &str, _salvaged: usize) {}

    /// Every spawned worker has been joined.
    fn execution_finished(&self, _total_tasks: usize, _failed: usize, _elapsed: Duration) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PoolObserver for NoopObserver {}

/// Logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PoolObserver for TracingObserver {
    fn execution_started(&self, total_tasks: usize, workers: usize) {
        info!(total_tasks, workers, "Starting execution");
    }

    fn worker_started(&self, worker_id: usize, task_count: usize) {
        info!(worker_id, task_count, "Worker starting");
    }

    fn attempt_failed(&self, worker_id: usize, attempt: u32, max_attempts: u32, error: &str) {
        warn!(
            worker_id,
            attempt,
            max_attempts,
            error = %error,
            "Task attempt failed"
        );
    }

    fn task_failed(&self, worker_id: usize, task: &str, error: &str) {
        warn!(worker_id, task = %task, error = %error, "Task failed after all attempts");
    }

    fn worker_completed(&self, progress: &WorkerProgress) {
        info!(
            worker_id = progress.worker_id,
            completed = progress.tasks_completed,
            failed = progress.tasks_failed,
            elapsed_ms = progress.elapsed().as_millis() as u64,
            "Worker completed"
        );
    }

    fn worker_fault(&self, worker_id: usize, reason: &str, salvaged: usize) {
        error!(
            worker_id,
            reason = %reason,
            salvaged_results = salvaged,
            "Worker encountered an error"
        );
    }

    fn execution_finished(&self, total_tasks: usize, failed: usize, elapsed: Duration) {
        info!(
            total_tasks,
            failed,
            elapsed_secs = elapsed.as_secs_f64(),
            "All tasks completed"
        );
    }
}
