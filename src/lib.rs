//! Bot Pool: concurrent worker pool with per-task retry, live progress and a
//! session-based batch pipeline.

pub mod batch;
pub mod config;
pub mod error;
pub mod pool;
