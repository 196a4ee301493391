//! The driver: resolves a range per dataset, streams it from the
//! archive, extracts rows, and dispatches them to storage.
//!
//! Grounded on `internal/main.go`'s `IndexData` and
//! `internal/input/ledgerMetaDataReader.go`'s `LedgerMetadataReader.Run`:
//! one reader per run, planning the range up front and then walking the
//! archive ledger by ledger until the range (or cancellation) ends.

use std::sync::Arc;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::archive::{Archive, UnavailableArchive};
use crate::args::{Args, Dataset as CliDataset};
use crate::changes::{Change, ContractDataRow, TtlRow};
use crate::db::contract_data::ContractDataSink;
use crate::db::ttl::TtlSink;
use crate::error::{IndexerError, Result};
use crate::extract::{self, ExtractError};
use crate::metrics::Metrics;
use crate::range::{self, Plan, PlanInputs};
use crate::sink::Dispatcher;

/// A planned `Plan` reduced to the bounds that actually matter to the
/// single combined stream: `None` means this dataset needs nothing from
/// this run.
fn plan_bounds(plan: Plan) -> Option<(u32, u32)> {
    match plan {
        Plan::Skip => None,
        Plan::Bounded { start, end } => Some((start, end)),
        Plan::Unbounded { start } => Some((start, u32::MAX)),
    }
}

fn in_range(range: Option<(u32, u32)>, sequence: u32) -> bool {
    matches!(range, Some((start, end)) if sequence >= start && sequence <= end)
}

pub struct Driver {
    pool: PgPool,
    metrics: Metrics,
    cancel: CancellationToken,
    archive: Arc<dyn Archive>,
}

impl Driver {
    pub fn new(pool: PgPool, metrics: Metrics, cancel: CancellationToken) -> Self {
        // Fetching and decoding raw ledger close metadata is an explicit
        // Non-goal; this crate depends on an external archive client for
        // it. `UnavailableArchive` keeps the driver runnable end to end
        // in tests without pulling in a real network dependency -- swap
        // it for a concrete implementation at the deployment boundary.
        Self::with_archive(pool, metrics, cancel, Arc::new(UnavailableArchive))
    }

    pub fn with_archive(
        pool: PgPool,
        metrics: Metrics,
        cancel: CancellationToken,
        archive: Arc<dyn Archive>,
    ) -> Self {
        Self {
            pool,
            metrics,
            cancel,
            archive,
        }
    }

    pub async fn run(&self, args: &Args) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(IndexerError::Cancelled);
        }
        match args.dataset {
            Some(CliDataset::ContractData) => self.run_contract_data(args).await,
            Some(CliDataset::Ttl) => self.run_ttl(args).await,
            // Contract-data before TTL, per ledger, in a single pass over
            // the archive -- a TTL row's `key_hash` should resolve against
            // a storage slot that already exists.
            None => self.run_combined(args).await,
        }
    }

    async fn run_contract_data(&self, args: &Args) -> Result<()> {
        let dispatcher: Dispatcher<ContractDataRow> =
            Dispatcher::new(vec![Box::new(ContractDataSink::new(self.pool.clone()))]);
        self.run_dataset(
            extract::Dataset::ContractData.table_name(),
            args,
            &dispatcher,
            extract::extract_contract_data,
        )
        .await
    }

    async fn run_ttl(&self, args: &Args) -> Result<()> {
        let dispatcher: Dispatcher<TtlRow> =
            Dispatcher::new(vec![Box::new(TtlSink::new(self.pool.clone()))]);
        self.run_dataset(
            extract::Dataset::Ttl.table_name(),
            args,
            &dispatcher,
            extract::extract_ttl,
        )
        .await
    }

    /// Single-dataset path: used when `--dataset` pins the run to exactly
    /// one table, so there is only ever one stream over the archive.
    async fn run_dataset<R, F>(
        &self,
        table: &'static str,
        args: &Args,
        dispatcher: &Dispatcher<R>,
        extract: F,
    ) -> Result<()>
    where
        R: Clone,
        F: Fn(&[Change]) -> std::result::Result<Vec<R>, ExtractError>,
    {
        let latest = self.archive.latest_ledger_sequence().await?;
        self.metrics.set_max_in_archive(latest);

        let max_indexed = dispatcher.max_indexed_sequence().await?.unwrap_or(0);
        self.metrics.set_backfill_enabled(table, args.backfill);

        let inputs = PlanInputs {
            start_req: args.start,
            end_req: args.end,
            latest_in_archive: latest,
            max_indexed,
            backfill: args.backfill,
        };

        let (start, end) = match range::plan(inputs)? {
            Plan::Skip => {
                tracing::info!(table, "requested range already indexed, nothing to do");
                return Ok(());
            }
            Plan::Bounded { start, end } => (start, end),
            Plan::Unbounded { start } => (start, u32::MAX),
        };
        self.metrics.set_range(table, start, end.min(latest));
        tracing::info!(table, start, end, "streaming range from archive");

        let mut stream = self.archive.stream(start, end).await?;
        while let Some(payload) = stream.next_payload().await? {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    table,
                    next_ledger = payload.ledger_sequence,
                    "cancellation requested, stopping before this ledger"
                );
                return Err(IndexerError::Cancelled);
            }

            self.metrics.set_processing(payload.ledger_sequence);
            let rows = extract(&payload.changes).map_err(|cause| IndexerError::Extraction {
                ledger: payload.ledger_sequence,
                cause: cause.to_string(),
            })?;
            let count = rows.len() as u64;
            dispatcher.dispatch(rows).await?;
            self.metrics.record_upsert(table, count);
            self.metrics.set_max_indexed(table, payload.ledger_sequence);
        }

        dispatcher.close_all().await?;
        Ok(())
    }

    /// Both datasets, one pass over the archive: a single stream wide
    /// enough to cover whichever dataset still has ledgers to catch up
    /// on, with each extractor applied per payload and gated to its own
    /// planned range. A dataset that has already caught up to a given
    /// ledger is a per-ledger no-op rather than a second full pass.
    async fn run_combined(&self, args: &Args) -> Result<()> {
        let contract_dispatcher: Dispatcher<ContractDataRow> =
            Dispatcher::new(vec![Box::new(ContractDataSink::new(self.pool.clone()))]);
        let ttl_dispatcher: Dispatcher<TtlRow> =
            Dispatcher::new(vec![Box::new(TtlSink::new(self.pool.clone()))]);
        self.run_combined_with(args, &contract_dispatcher, &ttl_dispatcher)
            .await
    }

    /// The actual single-stream, both-datasets loop, parameterized over
    /// the dispatchers so it can be exercised in tests without a real
    /// Postgres pool behind them.
    async fn run_combined_with(
        &self,
        args: &Args,
        contract_dispatcher: &Dispatcher<ContractDataRow>,
        ttl_dispatcher: &Dispatcher<TtlRow>,
    ) -> Result<()> {
        let cd_table = extract::Dataset::ContractData.table_name();
        let ttl_table = extract::Dataset::Ttl.table_name();

        let latest = self.archive.latest_ledger_sequence().await?;
        self.metrics.set_max_in_archive(latest);
        self.metrics.set_backfill_enabled(cd_table, args.backfill);
        self.metrics.set_backfill_enabled(ttl_table, args.backfill);

        let cd_max_indexed = contract_dispatcher.max_indexed_sequence().await?.unwrap_or(0);
        let ttl_max_indexed = ttl_dispatcher.max_indexed_sequence().await?.unwrap_or(0);

        let cd_range = plan_bounds(range::plan(PlanInputs {
            start_req: args.start,
            end_req: args.end,
            latest_in_archive: latest,
            max_indexed: cd_max_indexed,
            backfill: args.backfill,
        })?);
        let ttl_range = plan_bounds(range::plan(PlanInputs {
            start_req: args.start,
            end_req: args.end,
            latest_in_archive: latest,
            max_indexed: ttl_max_indexed,
            backfill: args.backfill,
        })?);

        let (start, end) = match (cd_range, ttl_range) {
            (None, None) => {
                tracing::info!("requested range already indexed for both datasets, nothing to do");
                return Ok(());
            }
            (Some((s, e)), None) | (None, Some((s, e))) => (s, e),
            (Some((s1, e1)), Some((s2, e2))) => (s1.min(s2), e1.max(e2)),
        };

        if let Some((s, e)) = cd_range {
            self.metrics.set_range(cd_table, s, e.min(latest));
        }
        if let Some((s, e)) = ttl_range {
            self.metrics.set_range(ttl_table, s, e.min(latest));
        }
        tracing::info!(start, end, "streaming range from archive for both datasets");

        let mut stream = self.archive.stream(start, end).await?;
        while let Some(payload) = stream.next_payload().await? {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    next_ledger = payload.ledger_sequence,
                    "cancellation requested, stopping before this ledger"
                );
                return Err(IndexerError::Cancelled);
            }

            self.metrics.set_processing(payload.ledger_sequence);

            if in_range(cd_range, payload.ledger_sequence) {
                let rows = extract::extract_contract_data(&payload.changes).map_err(|cause| {
                    IndexerError::Extraction {
                        ledger: payload.ledger_sequence,
                        cause: cause.to_string(),
                    }
                })?;
                let count = rows.len() as u64;
                contract_dispatcher.dispatch(rows).await?;
                self.metrics.record_upsert(cd_table, count);
                self.metrics.set_max_indexed(cd_table, payload.ledger_sequence);
            }

            if in_range(ttl_range, payload.ledger_sequence) {
                let rows = extract::extract_ttl(&payload.changes).map_err(|cause| {
                    IndexerError::Extraction {
                        ledger: payload.ledger_sequence,
                        cause: cause.to_string(),
                    }
                })?;
                let count = rows.len() as u64;
                ttl_dispatcher.dispatch(rows).await?;
                self.metrics.record_upsert(ttl_table, count);
                self.metrics.set_max_indexed(ttl_table, payload.ledger_sequence);
            }
        }

        contract_dispatcher.close_all().await?;
        ttl_dispatcher.close_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::LedgerPayload;
    use crate::sink::Sink;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedArchive {
        latest: u32,
        payloads: Mutex<Vec<LedgerPayload>>,
    }

    struct FixedStream {
        payloads: std::vec::IntoIter<LedgerPayload>,
    }

    #[async_trait]
    impl crate::archive::LedgerStream for FixedStream {
        async fn next_payload(&mut self) -> Result<Option<LedgerPayload>> {
            Ok(self.payloads.next())
        }
    }

    #[async_trait]
    impl Archive for FixedArchive {
        async fn latest_ledger_sequence(&self) -> Result<u32> {
            Ok(self.latest)
        }

        async fn stream(
            &self,
            _start: u32,
            _end: u32,
        ) -> Result<Box<dyn crate::archive::LedgerStream>> {
            let payloads = self.payloads.lock().unwrap().clone();
            Ok(Box::new(FixedStream {
                payloads: payloads.into_iter(),
            }))
        }
    }

    struct InMemorySink<R> {
        rows: Arc<Mutex<Vec<R>>>,
    }

    impl<R> InMemorySink<R> {
        fn new() -> Self {
            Self {
                rows: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn handle(&self) -> Arc<Mutex<Vec<R>>> {
            self.rows.clone()
        }
    }

    #[async_trait]
    impl<R: crate::changes::HasLedgerSequence + Clone + Send + Sync> Sink<R> for InMemorySink<R> {
        async fn write_one(&self, row: R) -> Result<()> {
            self.rows.lock().unwrap().push(row);
            Ok(())
        }

        async fn write_many(&self, mut rows: Vec<R>) -> Result<()> {
            self.rows.lock().unwrap().append(&mut rows);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        async fn max_indexed_sequence(&self) -> Result<Option<u32>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.ledger_sequence())
                .max())
        }
    }

    fn empty_payload(ledger_sequence: u32) -> LedgerPayload {
        LedgerPayload {
            ledger_sequence,
            changes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn run_dataset_streams_until_archive_is_exhausted() {
        let archive: Arc<dyn Archive> = Arc::new(FixedArchive {
            latest: 12,
            payloads: Mutex::new(vec![empty_payload(10), empty_payload(11), empty_payload(12)]),
        });
        let driver = Driver::with_archive(
            sqlx_test_pool(),
            Metrics::new(),
            CancellationToken::new(),
            archive,
        );
        let sink: InMemorySink<ContractDataRow> = InMemorySink::new();
        let rows = sink.handle();
        let dispatcher = Dispatcher::new(vec![Box::new(sink) as Box<dyn Sink<ContractDataRow>>]);
        driver
            .run_dataset(
                "contract_data",
                &sample_args(10, 12),
                &dispatcher,
                extract::extract_contract_data,
            )
            .await
            .unwrap();
        assert_eq!(rows.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn run_dataset_stops_when_cancelled() {
        let archive: Arc<dyn Archive> = Arc::new(FixedArchive {
            latest: 12,
            payloads: Mutex::new(vec![empty_payload(10), empty_payload(11), empty_payload(12)]),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let driver = Driver::with_archive(sqlx_test_pool(), Metrics::new(), cancel, archive);
        let sink: InMemorySink<TtlRow> = InMemorySink::new();
        let dispatcher = Dispatcher::new(vec![Box::new(sink) as Box<dyn Sink<TtlRow>>]);
        let result = driver
            .run_dataset("ttl", &sample_args(10, 12), &dispatcher, extract::extract_ttl)
            .await;
        assert!(matches!(result, Err(IndexerError::Cancelled)));
    }

    /// Archive that records how many times `stream` is called, so the
    /// combined run can be checked to open exactly one stream rather than
    /// one per dataset.
    struct CountingArchive {
        latest: u32,
        payloads: Mutex<Vec<LedgerPayload>>,
        stream_calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl Archive for CountingArchive {
        async fn latest_ledger_sequence(&self) -> Result<u32> {
            Ok(self.latest)
        }

        async fn stream(
            &self,
            _start: u32,
            _end: u32,
        ) -> Result<Box<dyn crate::archive::LedgerStream>> {
            self.stream_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let payloads = self.payloads.lock().unwrap().clone();
            Ok(Box::new(FixedStream {
                payloads: payloads.into_iter(),
            }))
        }
    }

    #[tokio::test]
    async fn run_combined_opens_exactly_one_stream() {
        let archive = Arc::new(CountingArchive {
            latest: 12,
            payloads: Mutex::new(vec![empty_payload(10), empty_payload(11), empty_payload(12)]),
            stream_calls: std::sync::atomic::AtomicU32::new(0),
        });
        let driver = Driver::with_archive(
            sqlx_test_pool(),
            Metrics::new(),
            CancellationToken::new(),
            archive.clone() as std::sync::Arc<dyn Archive>,
        );
        let cd_sink: InMemorySink<ContractDataRow> = InMemorySink::new();
        let ttl_sink: InMemorySink<TtlRow> = InMemorySink::new();
        let contract_dispatcher =
            Dispatcher::new(vec![Box::new(cd_sink) as Box<dyn Sink<ContractDataRow>>]);
        let ttl_dispatcher = Dispatcher::new(vec![Box::new(ttl_sink) as Box<dyn Sink<TtlRow>>]);
        driver
            .run_combined_with(&sample_args(10, 12), &contract_dispatcher, &ttl_dispatcher)
            .await
            .unwrap();
        assert_eq!(archive.stream_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    fn sample_args(start: u32, end: u32) -> Args {
        Args {
            start,
            end,
            config_file: "config.toml".into(),
            dataset: None,
            backfill: false,
            postgres_conn_string: None,
            global: crate::args::GlobalArgs {
                log_level: "info".into(),
                log_dir: None,
                metrics_addr: None,
            },
        }
    }

    /// `PgPool` is never dereferenced by `run_dataset` in these tests --
    /// the sink under test is the in-memory double above, not the real
    /// Postgres-backed one -- so an unconnected pool handle is enough to
    /// satisfy `Driver`'s constructor.
    fn sqlx_test_pool() -> PgPool {
        PgPool::connect_lazy("postgres://localhost/unused").expect("lazy pool never connects eagerly")
    }

    #[test]
    fn dataset_selection_defaults_to_contract_data_before_ttl() {
        let args = Args {
            start: 0,
            end: 0,
            config_file: "config.toml".into(),
            dataset: None,
            backfill: false,
            postgres_conn_string: None,
            global: crate::args::GlobalArgs {
                log_level: "info".into(),
                log_dir: None,
                metrics_addr: None,
            },
        };
        let datasets = match args.dataset {
            Some(CliDataset::ContractData) => vec![CliDataset::ContractData],
            Some(CliDataset::Ttl) => vec![CliDataset::Ttl],
            None => vec![CliDataset::ContractData, CliDataset::Ttl],
        };
        assert_eq!(datasets, vec![CliDataset::ContractData, CliDataset::Ttl]);
    }
}
