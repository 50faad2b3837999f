//! Session lifecycle for batch-oriented dispatch.
//!
//! A session is short-lived and owns one batch: it connects, authenticates
//! once, processes each item and disconnects. Remote query and login logic
//! live entirely behind this trait.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::{SessionError, TaskError};

/// One connection's worth of work.
#[async_trait]
pub trait BatchSession: Send + Sync {
    /// Input item. Echoed back in the report.
    type Item: Clone + Debug + Send + Sync + 'static;
    /// Value produced for a successfully processed item.
    type Output: Send + 'static;

    /// Open the underlying connection.
    async fn connect(&mut self) -> Result<(), SessionError>;

    /// Obtain credentials for this session. A failure fails the whole batch.
    async fn authenticate(&mut self) -> Result<(), SessionError>;

    /// Process one item. Called only after a successful `authenticate`.
    async fn process(&self, item: &Self::Item) -> Result<Self::Output, TaskError>;

    /// Release resources. Always called after a successful `connect`.
    async fn disconnect(&mut self);
}

/// Creates a fresh session for every batch.
pub trait SessionFactory: Send + Sync + 'static {
    type Session: BatchSession + 'static;

    fn create(&self, batch_id: usize) -> Self::Session;
}
