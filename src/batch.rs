// src/batch.rs
//
// Bulk mutation batcher: partitions a key set into backend-size-limited
// chunks and applies one bulk call per chunk, in order. Not transactional:
// a failing chunk surfaces immediately and earlier chunks stay applied.

use std::future::Future;

use tracing::debug;

use crate::error::{Result, StorageError};

/// Apply `op` to consecutive chunks of at most `batch_limit` items. On
/// failure, reports which batch failed and how many items were already
/// applied by the preceding batches.
pub async fn apply_batched<T, F, Fut>(items: &[T], batch_limit: usize, mut op: F) -> Result<()>
where
    T: Clone,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if items.is_empty() {
        return Ok(());
    }
    let limit = batch_limit.max(1);
    let mut applied = 0usize;

    for (batch, chunk) in items.chunks(limit).enumerate() {
        debug!(batch, size = chunk.len(), "applying mutation batch");
        op(chunk.to_vec())
            .await
            .map_err(|e| StorageError::BatchMutation {
                batch,
                applied,
                source: anyhow::Error::new(e),
            })?;
        applied += chunk.len();
    }
    Ok(())
}
