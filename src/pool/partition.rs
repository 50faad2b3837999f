//! Splitting task lists into per-worker slices and fixed-size batches.

use std::num::NonZeroUsize;

/// Split `tasks` into exactly `workers` contiguous slices.
///
/// With `N` tasks, the first `N % workers` slices get `N / workers + 1`
/// tasks and the rest get `N / workers`. Order is preserved and every task
/// lands in exactly one slice. Empty input yields `workers` empty slices.
pub fn partition_evenly<T>(tasks: Vec<T>, workers: NonZeroUsize) -> Vec<Vec<T>> {
    let workers = workers.get();
    let base = tasks.len() / workers;
    let remainder = tasks.len() % workers;

    let mut remaining = tasks.into_iter();
    let slices: Vec<Vec<T>> = (0..workers)
        .map(|i| {
            let size = base + usize::from(i < remainder);
            remaining.by_ref().take(size).collect::<Vec<T>>()
        })
        .collect();

    slices
}

/// Split `items` into consecutive chunks of at most `batch_size`.
///
/// Only the last chunk may be short. Empty input yields no chunks at all.
pub fn divide<T>(items: Vec<T>, batch_size: NonZeroUsize) -> Vec<Vec<T>> {
    let batch_size = batch_size.get();
    let mut batches: Vec<Vec<T>> = Vec::with_capacity(items.len().div_ceil(batch_size));
    let mut remaining = items.into_iter().peekable();
    while remaining.peek().is_some() {
        batches.push(remaining.by_ref().take(batch_size).collect::<Vec<T>>());
    }
    batches
}
