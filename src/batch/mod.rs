//! Batch pipeline: split a large item list into fixed-size batches and run
//! each batch through its own short-lived session.
//!
//! - `session` - connect / authenticate / process / disconnect seam
//! - `conductor` - batching, bounded concurrency, merging
//! - `report` - merged outcome and completeness check

pub mod conductor;
pub mod report;
pub mod session;

pub use conductor::BatchConductor;
pub use report::{BatchReport, Completeness, FailedItem, ItemResult};
pub use session::{BatchSession, SessionFactory};
