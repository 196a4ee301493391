//! Command-line arguments.
//!
//! Grounded on `cmd/root.go`'s flag set and the teacher's
//! `commands::global::Args` for the logging flags, with env var fallbacks
//! for every flag (`--config-file` / `STELLAR_LEDGER_INDEXER_CONFIG_FILE`,
//! and so on) the way `clap`'s `env` feature and the Go CLI's
//! `strutils.KebabToConstantCase` both provide.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Dataset {
    ContractData,
    Ttl,
}

#[derive(Debug, Parser)]
#[command(name = "stellar-ledger-indexer", version)]
pub struct Args {
    /// First ledger to index. Unset or `1` means "resume from where the
    /// last run left off, or the archive head if this is the first run."
    #[arg(short = 's', long, env = "STELLAR_LEDGER_INDEXER_START", default_value_t = 0)]
    pub start: u32,

    /// Last ledger to index, inclusive. Unset or `1` means "run forever,
    /// following the archive head."
    #[arg(short = 'e', long, env = "STELLAR_LEDGER_INDEXER_END", default_value_t = 0)]
    pub end: u32,

    #[arg(
        long,
        env = "STELLAR_LEDGER_INDEXER_CONFIG_FILE",
        default_value = "config.toml"
    )]
    pub config_file: PathBuf,

    /// Restrict this run to one dataset. Absent: both datasets run in
    /// sequence, contract-data before TTL.
    #[arg(long, env = "STELLAR_LEDGER_INDEXER_DATASET", value_enum)]
    pub dataset: Option<Dataset>,

    /// Ignore already-indexed state and re-run the requested range from
    /// scratch.
    #[arg(long, env = "STELLAR_LEDGER_INDEXER_BACKFILL")]
    pub backfill: bool,

    /// Overrides the Postgres connection string from the config file.
    #[arg(long, env = "POSTGRES_CONN_STRING")]
    pub postgres_conn_string: Option<String>,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct GlobalArgs {
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Directory for rotating file logs. Unset means stderr only.
    #[arg(long, env = "STELLAR_LEDGER_INDEXER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Bind address for the `/metrics` endpoint. Unset disables it.
    #[arg(long, env = "STELLAR_LEDGER_INDEXER_METRICS_ADDR")]
    pub metrics_addr: Option<std::net::SocketAddr>,
}
