//! Process metrics, exposed over HTTP in Prometheus text format.
//!
//! Grounded on the UBL messenger's `metrics.rs`, re-architected per this
//! system's ambient-stack requirements: no `lazy_static`, no
//! module-level global state. `Metrics` is an explicit, cloneable handle
//! constructed once in `cli::run` and threaded through the driver like
//! any other dependency.

use std::net::SocketAddr;
use std::sync::Arc;

use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::sync::oneshot;
use warp::Filter;

struct Inner {
    registry: Registry,
    upsert_count: IntCounterVec,
    ledger_sequence_processing: IntGauge,
    max_ledger_sequence_indexed: IntGaugeVec,
    max_ledger_sequence_in_archive: IntGauge,
    ledger_range_start: IntGaugeVec,
    ledger_range_end: IntGaugeVec,
    ledger_backfill_enabled: IntGaugeVec,
}

#[derive(Clone)]
pub struct Metrics(Arc<Inner>);

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let upsert_count = IntCounterVec::new(
            Opts::new("upsert_count", "rows upserted, by table"),
            &["table"],
        )
        .expect("metric definition is valid");
        let ledger_sequence_processing = IntGauge::new(
            "ledger_sequence_processing",
            "ledger sequence currently being processed",
        )
        .expect("metric definition is valid");
        let max_ledger_sequence_indexed = IntGaugeVec::new(
            Opts::new(
                "max_ledger_sequence_indexed",
                "highest ledger sequence durably committed, by table",
            ),
            &["table"],
        )
        .expect("metric definition is valid");
        let max_ledger_sequence_in_archive = IntGauge::new(
            "max_ledger_sequence_in_archive",
            "highest ledger sequence available from the archive",
        )
        .expect("metric definition is valid");
        let ledger_range_start = IntGaugeVec::new(
            Opts::new("ledger_range_start", "planned range start, by table"),
            &["table"],
        )
        .expect("metric definition is valid");
        let ledger_range_end = IntGaugeVec::new(
            Opts::new("ledger_range_end", "planned range end, by table"),
            &["table"],
        )
        .expect("metric definition is valid");
        let ledger_backfill_enabled = IntGaugeVec::new(
            Opts::new("ledger_backfill_enabled", "1 if --backfill was set, by table"),
            &["table"],
        )
        .expect("metric definition is valid");

        for collector in [
            Box::new(upsert_count.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(ledger_sequence_processing.clone()),
            Box::new(max_ledger_sequence_indexed.clone()),
            Box::new(max_ledger_sequence_in_archive.clone()),
            Box::new(ledger_range_start.clone()),
            Box::new(ledger_range_end.clone()),
            Box::new(ledger_backfill_enabled.clone()),
        ] {
            registry
                .register(collector)
                .expect("metric names are unique");
        }

        Self(Arc::new(Inner {
            registry,
            upsert_count,
            ledger_sequence_processing,
            max_ledger_sequence_indexed,
            max_ledger_sequence_in_archive,
            ledger_range_start,
            ledger_range_end,
            ledger_backfill_enabled,
        }))
    }

    pub fn record_upsert(&self, table: &str, rows: u64) {
        self.0.upsert_count.with_label_values(&[table]).inc_by(rows);
    }

    pub fn set_processing(&self, sequence: u32) {
        self.0.ledger_sequence_processing.set(sequence as i64);
    }

    pub fn set_max_indexed(&self, table: &str, sequence: u32) {
        self.0
            .max_ledger_sequence_indexed
            .with_label_values(&[table])
            .set(sequence as i64);
    }

    pub fn set_max_in_archive(&self, sequence: u32) {
        self.0.max_ledger_sequence_in_archive.set(sequence as i64);
    }

    pub fn set_range(&self, table: &str, start: u32, end: u32) {
        self.0
            .ledger_range_start
            .with_label_values(&[table])
            .set(start as i64);
        self.0
            .ledger_range_end
            .with_label_values(&[table])
            .set(end as i64);
    }

    pub fn set_backfill_enabled(&self, table: &str, enabled: bool) {
        self.0
            .ledger_backfill_enabled
            .with_label_values(&[table])
            .set(enabled as i64);
    }

    fn render(&self) -> String {
        let families = self.0.registry.gather();
        TextEncoder::new()
            .encode_to_string(&families)
            .unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A running `/metrics` server. Dropping this without calling
/// [`ServerHandle::shutdown`] leaves the server running until the process
/// exits; `shutdown` waits up to five seconds for in-flight scrapes to
/// finish before returning.
pub struct ServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), self.join).await;
    }
}

/// Serves `metrics.render()` at `GET /metrics` on `addr`.
pub fn serve(metrics: Metrics, addr: SocketAddr) -> ServerHandle {
    let route = warp::path("metrics").map(move || metrics.render());
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (_, server) = warp::serve(route).bind_with_graceful_shutdown(addr, async {
        let _ = shutdown_rx.await;
    });
    let join = tokio::spawn(server);
    ServerHandle {
        shutdown_tx: Some(shutdown_tx),
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_names() {
        let metrics = Metrics::new();
        metrics.record_upsert("contract_data", 5);
        metrics.set_max_indexed("contract_data", 1000);
        let rendered = metrics.render();
        assert!(rendered.contains("upsert_count"));
        assert!(rendered.contains("max_ledger_sequence_indexed"));
    }
}
