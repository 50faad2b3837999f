//! Bounded retry with a fixed delay between attempts.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::TaskError;

/// How many times to try a task and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

/// Outcome of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct Attempted<O> {
    /// Value of the first successful attempt, or the error of the last one.
    pub outcome: Result<O, TaskError>,
    /// Attempts actually made.
    pub attempts: u32,
    /// Wall clock from the first attempt to resolution, delays included.
    pub elapsed: Duration,
}

impl RetryPolicy {
    /// `max_retries` is the total number of attempts; zero still makes one.
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_retries.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or attempts run out.
    ///
    /// `on_failure` sees every failed attempt (1-based) before the backoff.
    pub async fn run<O, F, Fut, E>(&self, mut op: F, mut on_failure: E) -> Attempted<O>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<O, TaskError>>,
        E: FnMut(u32, &TaskError),
    {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    return Attempted {
                        outcome: Ok(value),
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    };
                }
                Err(e) => {
                    on_failure(attempt, &e);
                    if attempt >= self.max_attempts {
                        return Attempted {
                            outcome: Err(e),
                            attempts: attempt,
                            elapsed: start.elapsed(),
                        };
                    }
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }
    }
}
