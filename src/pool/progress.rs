//! Per-worker progress state and its lock-protected tracker.
//!
//! A worker owns its `ProgressTracker` and is the only writer. Everyone else
//! reads through [`ProgressTracker::snapshot`], which clones the state while
//! holding the lock, so a reader never sees a half-applied update.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::RwLock;

use super::state::WorkerState;

/// Point-in-time view of a worker.
///
/// Serializes with an extra `elapsed_time` field in fractional seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkerProgress {
    pub worker_id: usize,
    pub state: WorkerState,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    /// Debug rendering of the task being processed, if any.
    pub current_task: Option<String>,
    /// Error of the most recent task that exhausted its attempts.
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkerProgress {
    /// Fresh, idle progress for a worker.
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            state: WorkerState::Idle,
            tasks_completed: 0,
            tasks_failed: 0,
            current_task: None,
            error_message: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Tasks resolved so far, successful or not.
    pub fn tasks_processed(&self) -> usize {
        self.tasks_completed + self.tasks_failed
    }

    /// Time since the worker started, frozen once it finished.
    pub fn elapsed(&self) -> Duration {
        let Some(start) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.finished_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(start)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Move to a new state, stamping start/finish times.
    pub fn transition_to(&mut self, new_state: WorkerState) -> Result<(), String> {
        if !self.state.can_transition_to(new_state) {
            return Err(format!(
                "Cannot transition worker {} from {} to {}",
                self.worker_id, self.state, new_state
            ));
        }

        self.state = new_state;
        match new_state {
            WorkerState::Active => {
                self.started_at = Some(Utc::now());
                self.finished_at = None;
            }
            WorkerState::Completed | WorkerState::Error => {
                self.finished_at = Some(Utc::now());
                self.current_task = None;
            }
            WorkerState::Idle => {}
        }
        Ok(())
    }
}

impl Serialize for WorkerProgress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("WorkerProgress", 9)?;
        state.serialize_field("worker_id", &self.worker_id)?;
        state.serialize_field("state", &self.state)?;
        state.serialize_field("tasks_completed", &self.tasks_completed)?;
        state.serialize_field("tasks_failed", &self.tasks_failed)?;
        state.serialize_field("current_task", &self.current_task)?;
        state.serialize_field("error_message", &self.error_message)?;
        state.serialize_field("started_at", &self.started_at)?;
        state.serialize_field("finished_at", &self.finished_at)?;
        state.serialize_field("elapsed_time", &self.elapsed().as_secs_f64())?;
        state.end()
    }
}

/// Owned progress state plus its lock.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    inner: RwLock<WorkerProgress>,
}

impl ProgressTracker {
    pub(crate) fn new(worker_id: usize) -> Self {
        Self {
            inner: RwLock::new(WorkerProgress::new(worker_id)),
        }
    }

    /// Copy of the current state.
    pub(crate) async fn snapshot(&self) -> WorkerProgress {
        self.inner.read().await.clone()
    }

    /// Apply a mutation under the write lock.
    pub(crate) async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut WorkerProgress) -> R,
    {
        let mut progress = self.inner.write().await;
        f(&mut progress)
    }

    /// Reset to a fresh run and mark it active.
    pub(crate) async fn begin(&self) {
        self.update(|p| {
            *p = WorkerProgress::new(p.worker_id);
            // Idle -> Active is always allowed on fresh progress.
            let _ = p.transition_to(WorkerState::Active);
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_progress_is_idle() {
        let progress = WorkerProgress::new(3);
        assert_eq!(progress.worker_id, 3);
        assert_eq!(progress.state, WorkerState::Idle);
        assert_eq!(progress.tasks_processed(), 0);
        assert_eq!(progress.elapsed(), Duration::ZERO);
    }

    #[test]
    fn transitions_stamp_times() {
        let mut progress = WorkerProgress::new(0);
        progress.transition_to(WorkerState::Active).unwrap();
        assert!(progress.started_at.is_some());
        assert!(progress.finished_at.is_none());

        progress.current_task = Some("7".to_string());
        progress.transition_to(WorkerState::Completed).unwrap();
        assert!(progress.finished_at.is_some());
        assert!(progress.current_task.is_none());
    }

    #[test]
    fn invalid_transition_rejected() {
        let mut progress = WorkerProgress::new(1);
        let err = progress.transition_to(WorkerState::Completed).unwrap_err();
        assert!(err.contains("idle"));
        assert_eq!(progress.state, WorkerState::Idle);
    }

    #[test]
    fn elapsed_frozen_after_finish() {
        let mut progress = WorkerProgress::new(0);
        let start = Utc::now();
        progress.started_at = Some(start);
        progress.finished_at = Some(start + chrono::Duration::milliseconds(1500));
        assert_eq!(progress.elapsed(), Duration::from_millis(1500));
    }

    #[test]
    fn progress_serializes_state_as_string() {
        let mut progress = WorkerProgress::new(2);
        progress.transition_to(WorkerState::Active).unwrap();
        progress.tasks_completed = 5;
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["worker_id"], 2);
        assert_eq!(json["state"], "active");
        assert_eq!(json["tasks_completed"], 5);
    }

    #[test]
    fn serialized_progress_carries_elapsed_time() {
        let mut progress = WorkerProgress::new(1);
        let start = Utc::now();
        progress.state = WorkerState::Completed;
        progress.started_at = Some(start);
        progress.finished_at = Some(start + chrono::Duration::milliseconds(2500));

        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["elapsed_time"], 2.5);
        assert_eq!(serde_json::to_value(WorkerProgress::new(0)).unwrap()["elapsed_time"], 0.0);

        let back: WorkerProgress = serde_json::from_value(json).unwrap();
        assert_eq!(back, progress);
    }

    #[tokio::test]
    async fn tracker_snapshot_is_detached_copy() {
        let tracker = ProgressTracker::new(4);
        tracker.begin().await;
        let before = tracker.snapshot().await;

        tracker.update(|p| p.tasks_completed += 1).await;

        assert_eq!(before.tasks_completed, 0);
        assert_eq!(tracker.snapshot().await.tasks_completed, 1);
        assert_eq!(before.state, WorkerState::Active);
    }

    #[tokio::test]
    async fn begin_resets_previous_run() {
        let tracker = ProgressTracker::new(0);
        tracker.begin().await;
        tracker
            .update(|p| {
                p.tasks_failed = 2;
                p.error_message = Some("boom".into());
                let _ = p.transition_to(WorkerState::Completed);
            })
            .await;

        tracker.begin().await;
        let progress = tracker.snapshot().await;
        assert_eq!(progress.state, WorkerState::Active);
        assert_eq!(progress.tasks_failed, 0);
        assert!(progress.error_message.is_none());
    }
}
