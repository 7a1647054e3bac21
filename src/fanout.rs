//! Bounded concurrent map over a slice.
//!
//! A fixed number of workers share one index cursor. Each worker claims the
//! next unclaimed index, runs the operation on that item and keeps the
//! result tagged with its index, until the cursor runs past the end. All
//! workers are driven inside the caller's task, so "concurrent" means
//! overlapping waits rather than parallel threads.

use futures_util::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// The batch was cancelled before an item could start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("batch cancelled")]
pub struct Cancelled;

struct WorkerOutcome<R, E> {
    done: Vec<(usize, R)>,
    /// First failure this worker hit, with its global completion sequence.
    failure: Option<(usize, E)>,
}

/// Apply `op` to every item with at most `limit` operations outstanding.
///
/// `output[i]` is the result for `items[i]` whatever order operations finish
/// in. The first failure to complete wins: once it happens no new items are
/// started, operations already running are awaited, and that failure is
/// returned. A `limit` of 0 is treated as 1.
pub async fn map_bounded<'a, T, R, E, F, Fut>(items: &'a [T], limit: usize, op: F) -> Result<Vec<R>, E>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let workers = limit.max(1).min(items.len());
    let cursor = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let halted = AtomicBool::new(false);

    debug!(items = items.len(), workers, "starting bounded fan-out");

    let (cursor, completed, halted, op) = (&cursor, &completed, &halted, &op);
    let worker = move |worker_id: usize| async move {
        let mut outcome = WorkerOutcome {
            done: Vec::new(),
            failure: None,
        };
        while !halted.load(Ordering::SeqCst) {
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            if index >= items.len() {
                break;
            }
            let result = op(&items[index]).await;
            let seq = completed.fetch_add(1, Ordering::SeqCst);
            match result {
                Ok(value) => outcome.done.push((index, value)),
                Err(err) => {
                    trace!(worker_id, index, seq, "fan-out item failed, halting");
                    halted.store(true, Ordering::SeqCst);
                    outcome.failure = Some((seq, err));
                    break;
                }
            }
        }
        trace!(worker_id, processed = outcome.done.len(), "fan-out worker finished");
        outcome
    };

    let outcomes = join_all((0..workers).map(worker)).await;

    let mut slots: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
    let mut first_failure: Option<(usize, E)> = None;
    for outcome in outcomes {
        for (index, value) in outcome.done {
            slots[index] = Some(value);
        }
        if let Some((seq, err)) = outcome.failure {
            let earlier = first_failure.as_ref().map(|(s, _)| seq < *s).unwrap_or(true);
            if earlier {
                first_failure = Some((seq, err));
            }
        }
    }

    if let Some((_, err)) = first_failure {
        return Err(err);
    }

    // Without a failure every index was claimed and completed.
    let results: Vec<R> = slots.into_iter().flatten().collect();
    debug_assert_eq!(results.len(), items.len());
    Ok(results)
}

/// [`map_bounded`] with a cancellation token handed to every operation.
///
/// Items that have not started when the token fires fail with
/// [`Cancelled`], which halts the batch like any other failure. Operations
/// already running see the token and decide for themselves.
pub async fn map_bounded_cancellable<'a, T, R, E, F, Fut>(
    items: &'a [T],
    limit: usize,
    cancel: &CancellationToken,
    op: F,
) -> Result<Vec<R>, E>
where
    F: Fn(&'a T, CancellationToken) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: From<Cancelled>,
{
    let op = &op;
    map_bounded(items, limit, |item| async move {
        if cancel.is_cancelled() {
            return Err(E::from(Cancelled));
        }
        op(item, cancel.clone()).await
    })
    .await
}
