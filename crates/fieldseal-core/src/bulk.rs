//! Fan-out helper for bulk encrypt and decrypt.
//!
//! Items are pushed through a bounded channel to a pool of at most
//! [`MAX_BULK_WORKERS`] scoped threads. One failed item never aborts the
//! batch; every input ID comes back in either `successes` or `failures`.

use std::collections::HashMap;

use crossbeam_channel::bounded;

use crate::cancel::CancelToken;
use crate::error::EncryptionError;

/// Upper bound on worker threads for a single bulk call. Batches smaller
/// than this get one thread per item.
pub const MAX_BULK_WORKERS: usize = 10;

/// Outcome of a bulk operation, keyed by the caller-supplied item IDs.
#[derive(Debug)]
pub struct BulkResult<T> {
    pub successes: HashMap<String, T>,
    pub failures: HashMap<String, EncryptionError>,
}

impl<T> Default for BulkResult<T> {
    fn default() -> Self {
        BulkResult {
            successes: HashMap::new(),
            failures: HashMap::new(),
        }
    }
}

impl<T> BulkResult<T> {
    /// Total number of items accounted for.
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs `job` over `items` on a bounded worker pool.
///
/// The token is re-checked as each item is dequeued, so cancelling
/// mid-batch fails the remaining items with SERVICE_UNAVAILABLE while
/// items already processed keep their results.
pub(crate) fn run_parallel<I, T, F>(
    ctx: &CancelToken,
    op: &'static str,
    items: Vec<(String, I)>,
    job: F,
) -> BulkResult<T>
where
    I: Send,
    T: Send,
    F: Fn(&CancelToken, &str, I) -> Result<T, EncryptionError> + Sync,
{
    let mut result = BulkResult::default();
    if items.is_empty() {
        return result;
    }

    let total = items.len();
    let workers = total.min(MAX_BULK_WORKERS);
    // Capacity covers the whole batch, so neither side ever blocks on a
    // full channel.
    let (item_tx, item_rx) = bounded::<(String, I)>(total);
    let (out_tx, out_rx) = bounded::<(String, Result<T, EncryptionError>)>(total);

    for item in items {
        // Cannot fail: the receiver is alive and capacity is `total`.
        let _ = item_tx.send(item);
    }
    drop(item_tx);

    std::thread::scope(|scope| {
        let job = &job;
        for _ in 0..workers {
            let item_rx = item_rx.clone();
            let out_tx = out_tx.clone();
            scope.spawn(move || {
                while let Ok((id, item)) = item_rx.recv() {
                    let outcome = ctx.check(op).and_then(|()| job(ctx, &id, item));
                    if out_tx.send((id, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(out_tx);
        drop(item_rx);

        for (id, outcome) in out_rx {
            match outcome {
                Ok(value) => {
                    result.successes.insert(id, value);
                }
                Err(err) => {
                    result.failures.insert(id, err);
                }
            }
        }
    });

    tracing::debug!(
        op,
        total,
        workers,
        succeeded = result.successes.len(),
        failed = result.failures.len(),
        "bulk operation finished"
    );
    result
}
