//! Sink dispatch: ordered fan-out of one payload of rows to every
//! configured adapter.
//!
//! Grounded on `internal/utils/processor.go`'s `BaseProcessor.SendInfo`,
//! which loops over `OutboundAdapters` and calls `Write` for each -- with
//! one deliberate departure: the Go version logs and continues on a
//! per-adapter write error, but this pipeline aborts the whole payload and
//! propagates the error, since a half-written payload must not be treated
//! as committed.

use async_trait::async_trait;

use crate::error::Result;

/// A destination for rows of type `R`. `write` accepts either a single
/// record or a batch -- callers choose based on what they have in hand,
/// matching the dual shape `PostgresAdapter.Write` exposes for a single
/// `interface{}` vs a `[]interface{}`.
#[async_trait]
pub trait Sink<R>: Send + Sync {
    async fn write_one(&self, row: R) -> Result<()>;
    async fn write_many(&self, rows: Vec<R>) -> Result<()>;

    /// Flush any buffered state to durable storage.
    async fn close(&self) -> Result<()>;

    /// The highest ledger sequence this sink has durably committed, used
    /// by the range planner to resume. `None` if the sink has no rows yet.
    async fn max_indexed_sequence(&self) -> Result<Option<u32>>;
}

/// Dispatches one payload to every adapter in order, aborting on the
/// first error. An adapter set with zero members is legal and a no-op --
/// useful for dry runs.
pub struct Dispatcher<R> {
    adapters: Vec<Box<dyn Sink<R>>>,
}

impl<R> Dispatcher<R> {
    pub fn new(adapters: Vec<Box<dyn Sink<R>>>) -> Self {
        Self { adapters }
    }

    pub async fn dispatch(&self, rows: Vec<R>) -> Result<()>
    where
        R: Clone,
    {
        for adapter in &self.adapters {
            adapter.write_many(rows.clone()).await?;
        }
        Ok(())
    }

    pub async fn close_all(&self) -> Result<()> {
        for adapter in &self.adapters {
            adapter.close().await?;
        }
        Ok(())
    }

    /// The minimum of every adapter's max indexed sequence -- resuming
    /// must never skip ledgers an adapter hasn't actually committed yet.
    pub async fn max_indexed_sequence(&self) -> Result<Option<u32>> {
        let mut min: Option<u32> = None;
        for adapter in &self.adapters {
            if let Some(seq) = adapter.max_indexed_sequence().await? {
                min = Some(min.map_or(seq, |m: u32| m.min(seq)));
            }
        }
        Ok(min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct RecordingSink {
        received: Mutex<Vec<u32>>,
        fail: bool,
        max_seq: AtomicU32,
    }

    #[async_trait]
    impl Sink<u32> for RecordingSink {
        async fn write_one(&self, row: u32) -> Result<()> {
            self.write_many(vec![row]).await
        }

        async fn write_many(&self, rows: Vec<u32>) -> Result<()> {
            if self.fail {
                return Err(crate::error::IndexerError::UpsertFatal {
                    table: "test",
                    cause: "induced failure".into(),
                });
            }
            if let Some(max) = rows.iter().max() {
                self.max_seq.fetch_max(*max, Ordering::SeqCst);
            }
            self.received.lock().unwrap().extend(rows);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        async fn max_indexed_sequence(&self) -> Result<Option<u32>> {
            let v = self.max_seq.load(Ordering::SeqCst);
            Ok(if v == 0 { None } else { Some(v) })
        }
    }

    #[tokio::test]
    async fn dispatch_fans_out_to_every_adapter() {
        let a = Box::new(RecordingSink {
            received: Mutex::new(vec![]),
            fail: false,
            max_seq: AtomicU32::new(0),
        });
        let b = Box::new(RecordingSink {
            received: Mutex::new(vec![]),
            fail: false,
            max_seq: AtomicU32::new(0),
        });
        let dispatcher = Dispatcher::new(vec![a, b]);
        dispatcher.dispatch(vec![1, 2, 3]).await.unwrap();
        assert_eq!(dispatcher.max_indexed_sequence().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn dispatch_aborts_on_first_adapter_error() {
        let ok = Box::new(RecordingSink {
            received: Mutex::new(vec![]),
            fail: false,
            max_seq: AtomicU32::new(0),
        });
        let bad = Box::new(RecordingSink {
            received: Mutex::new(vec![]),
            fail: true,
            max_seq: AtomicU32::new(0),
        });
        let dispatcher = Dispatcher::new(vec![ok, bad]);
        let result = dispatcher.dispatch(vec![1]).await;
        assert!(result.is_err());
    }
}
