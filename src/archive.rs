//! The upstream archive: an external collaborator this crate depends on
//! but does not implement. In production this is the history archive /
//! buffered-storage reader the Go sibling wires up via
//! `ingest.PublisherConfig` (`BufferedStorageConfig`, `RetryLimit: 20`,
//! `RetryWait: 3`) -- out of scope here per the Non-goals; this module
//! only defines the seam the rest of the pipeline programs against.

use async_trait::async_trait;

use crate::changes::Change;
use crate::error::{IndexerError, Result};

/// One ledger's worth of already-decoded changes, as the archive would
/// hand them to a consumer after diffing a `LedgerCloseMeta`.
#[derive(Debug, Clone)]
pub struct LedgerPayload {
    pub ledger_sequence: u32,
    pub changes: Vec<Change>,
}

/// A source of ledger payloads bounded to a contiguous range. Implementations
/// own retry/backoff against the underlying object store; callers only see
/// a payload or a terminal error.
#[async_trait]
pub trait Archive: Send + Sync {
    /// The highest ledger sequence currently available from the archive.
    async fn latest_ledger_sequence(&self) -> Result<u32>;

    /// Stream payloads for `start..=end` in ascending order. `end ==
    /// u32::MAX` means "stream indefinitely, following archive head".
    async fn stream(
        &self,
        start: u32,
        end: u32,
    ) -> Result<Box<dyn LedgerStream>>;
}

/// An open stream of ledger payloads. Mirrors the shape of
/// `ingest.LedgerChangeReader` without committing to its API.
#[async_trait]
pub trait LedgerStream: Send {
    /// Returns the next payload, or `None` once the stream (bounded
    /// ranges only) is exhausted.
    async fn next_payload(&mut self) -> Result<Option<LedgerPayload>>;
}

/// Placeholder archive used only to keep the crate self-contained without
/// a live network dependency; never constructed outside tests. Real
/// deployments wire in the history-archive-backed implementation, which
/// is out of this crate's scope (see Non-goals).
pub struct UnavailableArchive;

#[async_trait]
impl Archive for UnavailableArchive {
    async fn latest_ledger_sequence(&self) -> Result<u32> {
        Err(IndexerError::ArchiveUnavailable(
            "no archive backend configured".into(),
        ))
    }

    async fn stream(&self, _start: u32, _end: u32) -> Result<Box<dyn LedgerStream>> {
        Err(IndexerError::ArchiveUnavailable(
            "no archive backend configured".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_archive_reports_itself() {
        let archive = UnavailableArchive;
        assert!(archive.latest_ledger_sequence().await.is_err());
        assert!(archive.stream(0, 10).await.is_err());
    }
}
