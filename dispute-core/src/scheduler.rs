//! Bounded, order-preserving fan-out for enrichment calls.

use std::future::Future;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Runs one future per input with at most `max_workers` in flight.
///
/// Output `i` always belongs to input `i`: results are gathered by position
/// through `join_all`, never by completion order. The scheduler adds no
/// failure handling of its own, so the per-task future must already be
/// infallible (see `NarrativeEnricher`).
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentScheduler {
    max_workers: usize,
}

impl EnrichmentScheduler {
    /// A bound of 0 is treated as 1.
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Apply `f` to every `(index, task)` and return outputs in input order.
    ///
    /// `operation` names the fan-out in the per-task `enrich` span.
    pub async fn run<T, O, F, Fut>(&self, operation: &'static str, tasks: Vec<T>, f: F) -> Vec<O>
    where
        F: Fn(usize, T) -> Fut,
        Fut: Future<Output = O>,
    {
        if tasks.is_empty() {
            return Vec::new();
        }

        let semaphore = Semaphore::new(self.max_workers);
        let semaphore = &semaphore;
        let f = &f;

        let units = tasks.into_iter().enumerate().map(|(row, task)| {
            async move {
                // The semaphore is never closed, so acquire cannot fail.
                let _permit = semaphore.acquire().await.ok();
                f(row, task).await
            }
            .instrument(tracing::info_span!("enrich", operation, row))
        });

        join_all(units).await
    }
}

impl Default for EnrichmentScheduler {
    fn default() -> Self {
        Self::new(10)
    }
}
