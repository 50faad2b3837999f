//! Worker pool: concurrent execution of independent tasks with retry.
//!
//! Core components:
//! - `partition` - even split across workers, fixed-size batching
//! - `processor` - the caller-supplied task processor seam
//! - `retry` - bounded attempts with a fixed delay
//! - `state` / `progress` - worker state machine and snapshots
//! - `worker` - sequential processing of one slice
//! - `coordinator` - spawning, joining and report compilation
//! - `monitor` - periodic progress polling
//! - `observer` - injected run-event sink

pub mod coordinator;
pub mod monitor;
pub mod observer;
pub mod partition;
pub mod processor;
pub mod progress;
pub mod result;
pub mod retry;
pub mod state;
pub mod worker;

pub use coordinator::{WorkerPool, execute};
pub use monitor::{log_active, monitor, spawn_monitor};
pub use observer::{NoopObserver, PoolObserver, TracingObserver};
pub use partition::{divide, partition_evenly};
pub use processor::{FnProcessor, TaskProcessor, processor_fn};
pub use progress::WorkerProgress;
pub use result::{AggregateReport, FailedTask, Statistics, TaskResult};
pub use retry::{Attempted, RetryPolicy};
pub use state::WorkerState;
pub use worker::Worker;
