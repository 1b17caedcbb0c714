//! Batch runner
//!
//! Processes many entities against third-party sources without tripping their quotas:
//! - items are split into batches of `batch_size`, processed one batch at a time
//! - inside a batch up to `max_concurrent` items run in parallel
//! - a fixed delay separates batches (never individual requests)
//!
//! Cancelling the token drops the in-flight items of the current batch (which
//! abandons their adapter calls) and skips the remaining batches. Results that
//! completed before cancellation are kept. An `Err` from one item is recorded against
//! that item only.

use crate::config::OrchestratorConfig;
use crate::error::EngineResult;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One item whose evaluation failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub index: usize,
    pub error: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    /// (input index, result), sorted by index
    pub completed: Vec<(usize, T)>,
    pub failed: Vec<ItemFailure>,
    /// Items never finished because the run was cancelled
    pub skipped: usize,
    pub cancelled: bool,
    pub batches_run: usize,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
            skipped: 0,
            cancelled: false,
            batches_run: 0,
        }
    }
}

/// Sequential batches with bounded parallelism inside each batch
#[derive(Debug, Clone)]
pub struct BatchRunner {
    batch_size: usize,
    inter_batch_delay: Duration,
    max_concurrent: usize,
}

impl BatchRunner {
    pub fn new(batch_size: usize, inter_batch_delay: Duration, max_concurrent: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            inter_batch_delay,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            config.batch_size,
            config.inter_batch_delay(),
            config.max_concurrent_entities,
        )
    }

    /// Run `work` over every item
    pub async fn run<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        cancel: &CancellationToken,
        work: F,
    ) -> BatchReport<T>
    where
        F: Fn(usize, I) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let total = items.len();
        let mut report = BatchReport::default();
        let mut pending = items.into_iter().enumerate().peekable();

        info!(
            items = total,
            batch_size = self.batch_size,
            max_concurrent = self.max_concurrent,
            "Batch run starting"
        );

        while pending.peek().is_some() {
            if report.batches_run > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.inter_batch_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let batch: Vec<(usize, I)> = pending.by_ref().take(self.batch_size).collect();
            report.batches_run += 1;
            debug!(batch = report.batches_run, size = batch.len(), "Batch starting");

            let results = stream::iter(batch)
                .map(|(index, item)| {
                    let fut = work(index, item);
                    async move { (index, fut.await) }
                })
                .buffer_unordered(self.max_concurrent)
                .take_until(cancel.cancelled());
            tokio::pin!(results);

            while let Some((index, result)) = results.next().await {
                match result {
                    Ok(value) => report.completed.push((index, value)),
                    Err(e) => {
                        warn!(index, error = %e, "Item failed (per-item error isolation)");
                        report.failed.push(ItemFailure {
                            index,
                            error: e.to_string(),
                        });
                    }
                }
            }

            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
        }

        report.completed.sort_by_key(|(index, _)| *index);
        report.failed.sort_by_key(|f| f.index);
        report.skipped = total - report.completed.len() - report.failed.len();

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            skipped = report.skipped,
            cancelled = report.cancelled,
            batches = report.batches_run,
            "Batch run finished"
        );
        report
    }
}
