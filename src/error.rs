use std::path::PathBuf;

/// Top-level error taxonomy for the indexer, propagated from the driver to
/// the process exit code.
#[derive(thiserror::Error, Debug)]
pub enum IndexerError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("reading config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("ledger range rejected: {0}")]
    RangeRejected(#[from] crate::range::RangeRejected),

    #[error("archive unavailable: {0}")]
    ArchiveUnavailable(String),

    #[error("failed to extract changes from ledger {ledger}: {cause}")]
    Extraction { ledger: u32, cause: String },

    #[error("upsert into {table} failed after exhausting retries: {cause}")]
    UpsertFatal { table: &'static str, cause: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, IndexerError>;
