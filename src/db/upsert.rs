//! Chunking and retry policy shared by every table's upsert sink.
//!
//! Grounded on `internal/utils/postgres.go`'s `chunkRecords` (1000-row
//! chunks) and `PostgresAdapter.Write`'s per-chunk transaction with a
//! bounded retry loop.

use std::time::Duration;

use tracing::warn;

use crate::error::{IndexerError, Result};

/// Rows per transaction. Keeps a single upsert statement's parameter
/// count (one array per column) well under Postgres's protocol limit
/// while still amortizing round-trips across a ledger's worth of changes.
pub const CHUNK_SIZE: usize = 1000;

const MAX_ATTEMPTS: u32 = 5;

/// Run `op` against one chunk, retrying on a transient database error
/// with linear backoff (`5s * attempt`). Gives up after
/// [`MAX_ATTEMPTS`] and surfaces the final error as
/// [`IndexerError::UpsertFatal`].
pub async fn with_retry<F, Fut>(table: &'static str, mut op: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(err) if attempt >= MAX_ATTEMPTS => {
                return Err(IndexerError::UpsertFatal {
                    table,
                    cause: err.to_string(),
                });
            }
            Err(err) => {
                warn!(
                    table,
                    attempt, error = %err, "upsert chunk failed, retrying"
                );
                tokio::time::sleep(Duration::from_secs(5 * attempt as u64)).await;
                attempt += 1;
            }
        }
    }
}

pub fn chunks<T: Clone>(rows: &[T]) -> impl Iterator<Item = Vec<T>> + '_ {
    rows.chunks(CHUNK_SIZE).map(|c| c.to_vec())
}
