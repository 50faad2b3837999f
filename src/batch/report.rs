//! Outcome of a batch conductor run.

use std::collections::HashSet;
use std::hash::Hash;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::pool::result::{Statistics, as_secs};

/// An item that was processed successfully.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResult<I, O> {
    pub batch_id: usize,
    pub item: I,
    pub output: O,
    pub attempts: u32,
    #[serde(serialize_with = "as_secs")]
    pub execution_time: Duration,
}

/// An item that failed, including items of batches that never authenticated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedItem<I> {
    pub batch_id: usize,
    pub item: I,
    pub error: String,
}

/// Everything one batch produced.
#[derive(Debug)]
pub(crate) struct BatchOutcome<I, O> {
    pub(crate) results: Vec<ItemResult<I, O>>,
    pub(crate) failed: Vec<FailedItem<I>>,
}

impl<I, O> BatchOutcome<I, O> {
    pub(crate) fn new() -> Self {
        Self {
            results: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Every item failed with the same reason, none attempted.
    pub(crate) fn all_failed(batch_id: usize, items: Vec<I>, error: &str) -> Self {
        Self {
            results: Vec::new(),
            failed: items
                .into_iter()
                .map(|item| FailedItem {
                    batch_id,
                    item,
                    error: error.to_string(),
                })
                .collect(),
        }
    }
}

/// Which expected items have no successful result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completeness<I> {
    pub expected_count: usize,
    pub actual_count: usize,
    /// Expected items without a successful result, in expected order.
    pub missing: Vec<I>,
    /// Successful items that were not expected.
    pub unexpected: Vec<I>,
    pub complete: bool,
}

/// Merged outcome of [`BatchConductor::run`](super::BatchConductor::run).
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<I, O> {
    pub run_id: Uuid,
    pub total_items: usize,
    pub batch_count: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    #[serde(serialize_with = "as_secs")]
    pub execution_time: Duration,
    pub results: Vec<ItemResult<I, O>>,
    pub failed_items: Vec<FailedItem<I>>,
}

impl<I, O> BatchReport<I, O> {
    pub(crate) fn compile(
        run_id: Uuid,
        batch_count: usize,
        outcomes: Vec<BatchOutcome<I, O>>,
        execution_time: Duration,
    ) -> Self {
        let mut results = Vec::new();
        let mut failed_items = Vec::new();
        for outcome in outcomes {
            results.extend(outcome.results);
            failed_items.extend(outcome.failed);
        }

        let stats = Statistics::new(results.len() + failed_items.len(), results.len());
        Self {
            run_id,
            total_items: stats.total,
            batch_count,
            successful: stats.successful,
            failed: stats.failed,
            success_rate: stats.success_rate,
            execution_time,
            results,
            failed_items,
        }
    }

    pub fn statistics(&self) -> Statistics {
        Statistics::new(self.total_items, self.successful)
    }
}

impl<I: Clone + Eq + Hash, O> BatchReport<I, O> {
    /// Compare successful items against the items the caller expected.
    pub fn completeness(&self, expected: &[I]) -> Completeness<I> {
        let actual: HashSet<&I> = self.results.iter().map(|r| &r.item).collect();
        let expected_set: HashSet<&I> = expected.iter().collect();

        let mut seen = HashSet::new();
        let missing: Vec<I> = expected
            .iter()
            .filter(|item| !actual.contains(item) && seen.insert(*item))
            .cloned()
            .collect();

        let mut seen = HashSet::new();
        let unexpected: Vec<I> = self
            .results
            .iter()
            .map(|r| &r.item)
            .filter(|item| !expected_set.contains(item) && seen.insert(*item))
            .cloned()
            .collect();

        Completeness {
            expected_count: expected_set.len(),
            actual_count: actual.len(),
            complete: missing.is_empty(),
            missing,
            unexpected,
        }
    }
}
