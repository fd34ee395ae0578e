//! Bounded-concurrency batch processing.
//!
//! Items are partitioned into batches and each batch is processed with at most `max_concurrency`
//! items in flight. A failing item is logged and dropped; it never aborts its batch. After each
//! batch one progress update reports how many items have been processed. If the operation is
//! marked failed between batches, no further batch is started.

use super::progress_tracker::{LogLevel, ProgressTracker};
use super::types::SyncError;
use crate::config::BatchConfig;
use futures_util::StreamExt;
use futures_util::stream;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Where batch progress is reported
#[derive(Debug, Clone, Copy)]
pub struct ProgressContext<'a> {
    pub operation_id: &'a str,
    /// Step reported with every batch update
    pub step: u32,
    /// Prefix of the progress message, e.g. "Reconciling wrestlers"
    pub description: &'a str,
}

/// An item that could not be processed
#[derive(Debug)]
pub struct ItemFailure {
    /// Position of the item in the input
    pub index: usize,
    pub error: SyncError,
}

#[derive(Debug)]
pub struct BatchOutcome<R> {
    /// Results of the items that succeeded, in completion order
    pub results: Vec<R>,
    pub failures: Vec<ItemFailure>,
    pub total: usize,
}

pub struct BatchProcessor {
    tracker: Arc<ProgressTracker>,
    max_concurrency: usize,
    inter_batch_delay: Duration,
}

impl BatchProcessor {
    pub fn new(tracker: Arc<ProgressTracker>, config: &BatchConfig) -> Self {
        Self {
            tracker,
            max_concurrency: config.max_concurrency.max(1),
            inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
        }
    }

    /// Apply `convert` to every item.
    ///
    /// # Errors
    /// `SyncError::Cancelled` when the operation was cancelled before a batch started. Item
    /// failures are reported in the outcome instead.
    pub async fn process<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        convert: F,
        batch_size: usize,
        progress: ProgressContext<'_>,
    ) -> Result<BatchOutcome<R>, SyncError>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, SyncError>>,
    {
        let total = items.len();
        let batch_size = batch_size.max(1);
        let mut outcome = BatchOutcome {
            results: Vec::with_capacity(total),
            failures: Vec::new(),
            total,
        };
        let mut pending = items.into_iter().enumerate().peekable();
        let mut processed = 0;

        while pending.peek().is_some() {
            if self.tracker.is_cancelled(progress.operation_id) {
                warn!(
                    "Operation {} cancelled after {}/{} items",
                    progress.operation_id, processed, total
                );
                return Err(SyncError::Cancelled(format!(
                    "{} stopped after {}/{} items",
                    progress.description, processed, total
                )));
            }

            let batch: Vec<(usize, T)> = pending.by_ref().take(batch_size).collect();
            let batch_len = batch.len();

            let completed: Vec<(usize, Result<R, SyncError>)> = stream::iter(batch)
                .map(|(index, item)| {
                    let fut = convert(item);
                    async move { (index, fut.await) }
                })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;

            for (index, result) in completed {
                match result {
                    Ok(value) => outcome.results.push(value),
                    Err(error) => {
                        warn!("{}: item {} skipped: {}", progress.description, index, error);
                        self.tracker.log_message(
                            progress.operation_id,
                            LogLevel::Warn,
                            &format!("Item {} skipped: {}", index, error),
                        );
                        outcome.failures.push(ItemFailure { index, error });
                    }
                }
            }

            processed += batch_len;
            let percent = processed as f64 * 100.0 / total as f64;
            self.tracker.update_progress(
                progress.operation_id,
                progress.step,
                &format!(
                    "{} processed {}/{} items ({:.1}%)",
                    progress.description, processed, total, percent
                ),
            );
            debug!("{}: batch of {} done", progress.description, batch_len);

            if pending.peek().is_some() && !self.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.inter_batch_delay).await;
            }
        }

        Ok(outcome)
    }
}
