//! The task processor seam.
//!
//! The pool knows nothing about what a task does. Callers plug in a
//! `TaskProcessor`, which is invoked concurrently from every worker and
//! repeatedly for retries, so implementations must be `Send + Sync` and
//! tolerate re-execution of the same task.

use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;

/// Processes one task at a time.
#[async_trait]
pub trait TaskProcessor: Send + Sync + 'static {
    /// Input handed to every attempt. Echoed back in the result.
    type Task: Clone + Debug + Send + Sync + 'static;
    /// Value produced by a successful attempt.
    type Output: Send + 'static;

    /// Run a single attempt.
    async fn process(&self, task: &Self::Task) -> Result<Self::Output, TaskError>;
}

#[async_trait]
impl<P: TaskProcessor> TaskProcessor for Arc<P> {
    type Task = P::Task;
    type Output = P::Output;

    async fn process(&self, task: &Self::Task) -> Result<Self::Output, TaskError> {
        (**self).process(task).await
    }
}

/// Adapts an async closure into a [`TaskProcessor`].
///
/// The closure receives its own clone of the task so the returned future
/// can be `'static`.
pub struct FnProcessor<T, F> {
    f: F,
    _task: PhantomData<fn(T)>,
}

/// Wrap `f` as a processor.
pub fn processor_fn<T, F>(f: F) -> FnProcessor<T, F> {
    FnProcessor {
        f,
        _task: PhantomData,
    }
}

#[async_trait]
impl<T, O, F, Fut> TaskProcessor for FnProcessor<T, F>
where
    T: Clone + Debug + Send + Sync + 'static,
    O: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, TaskError>> + Send + 'static,
{
    type Task = T;
    type Output = O;

    async fn process(&self, task: &T) -> Result<O, TaskError> {
        (self.f)(task.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    #[async_trait]
    impl TaskProcessor for Doubler {
        type Task = u32;
        type Output = u32;

        async fn process(&self, task: &u32) -> Result<u32, TaskError> {
            Ok(task * 2)
        }
    }

    #[tokio::test]
    async fn trait_impl_processes() {
        assert_eq!(Doubler.process(&21).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn arc_forwards_to_inner() {
        let shared = Arc::new(Doubler);
        assert_eq!(shared.process(&4).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn closure_processor() {
        let processor = processor_fn(|task: String| async move {
            if task.is_empty() {
                Err(TaskError::failed("empty task"))
            } else {
                Ok(task.len())
            }
        });

        assert_eq!(processor.process(&"abc".to_string()).await.unwrap(), 3);
        let err = processor.process(&String::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "empty task");
    }
}
