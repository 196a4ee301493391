//! Process entry point: parse arguments, wire up logging, run the driver.

use tracing_subscriber::EnvFilter;

use crate::args::Args;
use crate::error::Result;

/// Installs a `tracing` subscriber reading its filter from `--log-level`
/// (falling back to `RUST_LOG`), writing to stderr and, if
/// `--log-dir` is set, to a daily-rotating file as well.
pub fn init_tracing(global: &crate::args::GlobalArgs) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_new(&global.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(dir) = &global.log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, "stellar-ledger-indexer.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    }
}

/// Parses CLI arguments and environment variables into [`Args`].
pub fn parse_args() -> Args {
    use clap::Parser;
    Args::parse()
}

/// Runs the whole process: parse args, load config, drive the pipeline to
/// completion or cancellation. Returns the process exit code.
pub async fn run() -> Result<()> {
    let args = parse_args();
    let _guard = init_tracing(&args.global);

    let config = crate::config::Config::load(&args.config_file)?;
    let conn_string = config
        .postgres
        .connection_string(args.postgres_conn_string.as_deref());

    let pool = crate::db::connect(&conn_string).await?;
    let metrics = crate::metrics::Metrics::new();
    let metrics_server = args
        .global
        .metrics_addr
        .map(|addr| crate::metrics::serve(metrics.clone(), addr));

    let cancel = crate::cancel::from_ctrl_c();

    let outcome = crate::pipeline::Driver::new(pool, metrics, cancel.clone())
        .run(&args)
        .await;

    if let Some(handle) = metrics_server {
        handle.shutdown().await;
    }

    outcome
}
