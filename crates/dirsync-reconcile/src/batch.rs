//! Bounded batch dispatch.
//!
//! Items are split into chunks no larger than the batch size and sent one chunk
//! at a time. A fixed delay separates consecutive dispatches. Failed items are
//! recorded and never retried here.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::GatewayResult;
use crate::gateway::BatchOutcome;

/// Chunking and pacing for batched remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub delay: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 20,
            delay: Duration::from_millis(500),
        }
    }
}

impl BatchPolicy {
    pub fn new(batch_size: usize, delay: Duration) -> Self {
        Self { batch_size, delay }
    }

    /// Caps the batch size at the gateway limit. Never returns zero.
    #[must_use]
    pub fn capped_at(self, limit: usize) -> Self {
        Self {
            batch_size: self.batch_size.min(limit).max(1),
            delay: self.delay,
        }
    }
}

/// Sends `items` through `call` in sequential chunks.
///
/// Each chunk fully resolves before the next one is sent. If `call` fails for a
/// whole chunk, every item of that chunk is recorded as failed with the batch
/// error and dispatch continues with the next chunk.
pub async fn dispatch_batches<I, O, F, Fut>(
    phase: &str,
    items: Vec<I>,
    policy: BatchPolicy,
    mut call: F,
) -> BatchOutcome<I, O>
where
    I: Clone,
    F: FnMut(Vec<I>) -> Fut,
    Fut: Future<Output = GatewayResult<BatchOutcome<I, O>>>,
{
    let mut outcome = BatchOutcome::default();
    if items.is_empty() {
        return outcome;
    }

    let size = policy.batch_size.max(1);
    let total_batches = items.len().div_ceil(size);

    for (index, chunk) in items.chunks(size).enumerate() {
        if index > 0 && !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }

        debug!(
            phase,
            batch = index + 1,
            of = total_batches,
            items = chunk.len(),
            "Dispatching batch"
        );

        match call(chunk.to_vec()).await {
            Ok(result) => {
                for failed in &result.failed {
                    warn!(phase, error = %failed.error, "Batch item failed");
                }
                outcome.merge(result);
            }
            Err(e) => {
                error!(
                    phase,
                    batch = index + 1,
                    items = chunk.len(),
                    error = %e,
                    "Batch request rejected"
                );
                let message = e.to_string();
                for item in chunk {
                    outcome.add_failure(item.clone(), message.clone());
                }
            }
        }
    }

    outcome
}
