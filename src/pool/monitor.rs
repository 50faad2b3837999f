//! Periodic progress polling for live monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::coordinator::WorkerPool;
use super::processor::TaskProcessor;
use super::progress::WorkerProgress;
use super::state::WorkerState;
use crate::error::ConfigError;

/// Poll `pool` every `interval` while it is running, handing each round of
/// snapshots to `callback`. Returns the number of polls made.
///
/// Returns immediately if the pool is idle when called, so start it
/// alongside `execute` (for example with `tokio::join!`).
pub async fn monitor<P, F>(
    pool: &WorkerPool<P>,
    interval: Duration,
    mut callback: F,
) -> Result<usize, ConfigError>
where
    P: TaskProcessor,
    F: FnMut(&[WorkerProgress]),
{
    if interval.is_zero() {
        return Err(ConfigError::invalid(
            "monitor_interval",
            "must be greater than 0",
        ));
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut polls = 0;
    loop {
        // First tick completes immediately.
        ticker.tick().await;
        if !pool.is_running() {
            return Ok(polls);
        }
        let progress = pool.progress().await;
        callback(&progress);
        polls += 1;
    }
}

/// Spawn [`monitor`] on its own task.
pub fn spawn_monitor<P, F>(
    pool: Arc<WorkerPool<P>>,
    interval: Duration,
    callback: F,
) -> JoinHandle<Result<usize, ConfigError>>
where
    P: TaskProcessor,
    F: FnMut(&[WorkerProgress]) + Send + 'static,
{
    tokio::spawn(async move { monitor(&pool, interval, callback).await })
}

/// Default callback: log every active worker.
pub fn log_active(progress: &[WorkerProgress]) {
    for p in progress.iter().filter(|p| p.state == WorkerState::Active) {
        info!(
            worker_id = p.worker_id,
            completed = p.tasks_completed,
            failed = p.tasks_failed,
            current = p.current_task.as_deref().unwrap_or("-"),
            "Worker progress"
        );
    }
}
