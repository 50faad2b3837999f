//! Task results and the aggregate report of a pool run.

use std::io::Write;
use std::time::Duration;

use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::progress::WorkerProgress;
use crate::error;

/// Serialize a `Duration` as fractional seconds.
pub(crate) fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Final outcome of one task, built once its attempts are resolved.
///
/// Carries the original task so consumers can restore submission order.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult<T, O> {
    worker_id: usize,
    task: T,
    success: bool,
    result: Option<O>,
    error: Option<String>,
    attempts: u32,
    #[serde(serialize_with = "as_secs")]
    execution_time: Duration,
}

impl<T, O> TaskResult<T, O> {
    pub(crate) fn succeeded(
        worker_id: usize,
        task: T,
        result: O,
        attempts: u32,
        execution_time: Duration,
    ) -> Self {
        Self {
            worker_id,
            task,
            success: true,
            result: Some(result),
            error: None,
            attempts,
            execution_time,
        }
    }

    pub(crate) fn failed(
        worker_id: usize,
        task: T,
        error: String,
        attempts: u32,
        execution_time: Duration,
    ) -> Self {
        Self {
            worker_id,
            task,
            success: false,
            result: None,
            error: Some(error),
            attempts,
            execution_time,
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Output of the successful attempt; `None` on failure.
    pub fn result(&self) -> Option<&O> {
        self.result.as_ref()
    }

    /// Error of the last attempt; `None` on success.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    /// Split into the task and its outcome.
    pub fn into_parts(self) -> (T, Result<O, String>) {
        let outcome = match (self.result, self.error) {
            (Some(value), _) => Ok(value),
            (None, error) => Err(error.unwrap_or_default()),
        };
        (self.task, outcome)
    }
}

/// Summary entry for a task that exhausted its attempts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedTask<T> {
    pub task: T,
    pub error: String,
    pub worker_id: usize,
}

/// Headline counts shared by pool and batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage of successful tasks; 0.0 when nothing ran.
    pub success_rate: f64,
}

impl Statistics {
    pub fn new(total: usize, successful: usize) -> Self {
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64 * 100.0
        };
        Self {
            total,
            successful,
            failed: total.saturating_sub(successful),
            success_rate,
        }
    }
}

/// Merged outcome of one [`WorkerPool::execute`](super::WorkerPool::execute) call.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport<T, O> {
    pub run_id: Uuid,
    pub total_tasks: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    /// From just before the first worker was spawned to the last join.
    #[serde(serialize_with = "as_secs")]
    pub execution_time: Duration,
    /// In the order workers finished, not submission order.
    pub results: Vec<TaskResult<T, O>>,
    /// Snapshots of the workers that were actually spawned.
    pub worker_progress: Vec<WorkerProgress>,
    pub failed_tasks: Vec<FailedTask<T>>,
}

impl<T: Clone, O> AggregateReport<T, O> {
    pub(crate) fn compile(
        run_id: Uuid,
        results: Vec<TaskResult<T, O>>,
        worker_progress: Vec<WorkerProgress>,
        execution_time: Duration,
    ) -> Self {
        let failed_tasks: Vec<FailedTask<T>> = results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| FailedTask {
                task: r.task.clone(),
                error: r.error.clone().unwrap_or_default(),
                worker_id: r.worker_id,
            })
            .collect();

        let stats = Statistics::new(results.len(), results.len() - failed_tasks.len());

        Self {
            run_id,
            total_tasks: stats.total,
            successful: stats.successful,
            failed: stats.failed,
            success_rate: stats.success_rate,
            execution_time,
            results,
            worker_progress,
            failed_tasks,
        }
    }
}

impl<T, O> AggregateReport<T, O> {
    pub fn statistics(&self) -> Statistics {
        Statistics::new(self.total_tasks, self.successful)
    }

    /// Results whose task exhausted every attempt.
    pub fn failures(&self) -> impl Iterator<Item = &TaskResult<T, O>> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

impl<T: Serialize, O> AggregateReport<T, O> {
    /// Write the headline summary as pretty JSON followed by a newline.
    ///
    /// Per-task results are left out; failed tasks and worker progress are
    /// included.
    pub fn write_summary<W: Write>(&self, mut out: W) -> error::Result<()> {
        let summary = serde_json::json!({
            "run_id": self.run_id,
            "total_tasks": self.total_tasks,
            "successful": self.successful,
            "failed": self.failed,
            "success_rate": self.success_rate,
            "execution_time": self.execution_time.as_secs_f64(),
            "worker_progress": self.worker_progress,
            "failed_tasks": self.failed_tasks,
        });
        serde_json::to_writer_pretty(&mut out, &summary)?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_result_has_value_not_error() {
        let result: TaskResult<&str, &str> =
            TaskResult::succeeded(1, "test_task", "processed", 1, Duration::from_millis(500));
        assert!(result.is_success());
        assert_eq!(result.result(), Some(&"processed"));
        assert!(result.error().is_none());
    }

    #[test]
    fn failed_result_has_error_not_value() {
        let result: TaskResult<&str, &str> =
            TaskResult::failed(1, "test_task", "Test error".into(), 3, Duration::ZERO);
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Test error"));
        assert!(result.result().is_none());
        assert_eq!(result.into_parts(), ("test_task", Err("Test error".to_string())));
    }

    #[test]
    fn statistics_zero_total_is_zero_rate() {
        let stats = Statistics::new(0, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn compile_counts_and_failed_summaries() {
        let results = vec![
            TaskResult::succeeded(0, 1u32, 2u32, 1, Duration::ZERO),
            TaskResult::failed(0, 5u32, "divisible by five".into(), 1, Duration::ZERO),
            TaskResult::succeeded(1, 3u32, 6u32, 1, Duration::ZERO),
            TaskResult::succeeded(1, 4u32, 8u32, 2, Duration::ZERO),
        ];
        let report = AggregateReport::compile(Uuid::new_v4(), results, vec![], Duration::ZERO);

        assert_eq!(report.total_tasks, 4);
        assert_eq!(report.successful, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.success_rate, 75.0);
        assert_eq!(
            report.failed_tasks,
            vec![FailedTask {
                task: 5,
                error: "divisible by five".into(),
                worker_id: 0,
            }]
        );
        assert_eq!(report.failures().count(), 1);
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn summary_omits_results_and_keeps_failures() {
        let report = AggregateReport::compile(
            Uuid::nil(),
            vec![
                TaskResult::succeeded(0, 1u32, 2u32, 1, Duration::ZERO),
                TaskResult::failed(1, 5u32, "rejected".into(), 2, Duration::ZERO),
            ],
            vec![WorkerProgress::new(0)],
            Duration::from_millis(500),
        );

        let mut out = Vec::new();
        report.write_summary(&mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(json["total_tasks"], 2);
        assert_eq!(json["execution_time"], 0.5);
        assert_eq!(json["failed_tasks"][0]["task"], 5);
        assert_eq!(json["worker_progress"][0]["worker_id"], 0);
        assert!(json.get("results").is_none());
        assert!(out.ends_with(b"\n"));
    }

    #[test]
    fn summary_write_failure_surfaces_as_error() {
        let report: AggregateReport<u32, u32> =
            AggregateReport::compile(Uuid::nil(), Vec::new(), Vec::new(), Duration::ZERO);
        let err = report.write_summary(ClosedPipe).unwrap_err();
        assert!(matches!(err, error::Error::Json(_)));
    }

    #[test]
    fn report_serializes_durations_as_seconds() {
        let report: AggregateReport<u32, u32> = AggregateReport::compile(
            Uuid::nil(),
            vec![TaskResult::succeeded(0, 1, 2, 1, Duration::from_millis(250))],
            vec![],
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["execution_time"], 1.5);
        assert_eq!(json["results"][0]["execution_time"], 0.25);
        assert_eq!(json["results"][0]["result"], 2);
    }
}
