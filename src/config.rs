//! TOML configuration file handling.
//!
//! Grounded on `cmd/config.go`: a `network` preset and a set of direct
//! overrides are mutually exclusive inputs for reaching the archive --
//! exactly one of the two must be supplied.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{IndexerError, Result};

/// A named network preset. Resolving one fills in
/// `network_passphrase`/`history_archive_urls` from well-known values;
/// this crate treats resolution as the archive client's job and only
/// carries the raw name through.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StellarCoreConfig {
    pub network: Option<String>,
    pub network_passphrase: Option<String>,
    pub history_archive_urls: Option<Vec<String>>,
    pub captive_core_toml_path: Option<PathBuf>,
}

impl StellarCoreConfig {
    fn validate(&self) -> Result<()> {
        let has_network = self.network.is_some();
        let has_overrides = self.network_passphrase.is_some()
            || self.history_archive_urls.is_some()
            || self.captive_core_toml_path.is_some();

        if has_network == has_overrides {
            return Err(IndexerError::ConfigInvalid(
                "exactly one of `network` or the direct overrides (network_passphrase, \
                 history_archive_urls, captive_core_toml_path) must be set"
                    .into(),
            ));
        }

        if has_overrides
            && (self.network_passphrase.is_none()
                || self.history_archive_urls.is_none()
                || self.captive_core_toml_path.is_none())
        {
            return Err(IndexerError::ConfigInvalid(
                "when `network` is unset, network_passphrase, history_archive_urls, and \
                 captive_core_toml_path are all required"
                    .into(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
}

fn default_postgres_port() -> u16 {
    5432
}

impl PostgresConfig {
    /// `POSTGRES_CONN_STRING` is the only legitimate source of
    /// credentials -- the config file never carries a password, so
    /// without the env var this produces a DSN with no credentials at
    /// all, leaving auth to the driver's usual fallbacks (e.g. `PGPASSWORD`,
    /// `.pgpass`).
    pub fn connection_string(&self, env_override: Option<&str>) -> String {
        if let Some(conn) = env_override {
            return conn.to_string();
        }
        format!(
            "postgres://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

/// Settings for the buffered-storage reader the archive collaborator
/// owns. This crate only carries these through to whatever concrete
/// `Archive` implementation is wired in at the deployment boundary --
/// see the Non-goals around fetching raw ledger close metadata.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DatastoreConfig {
    pub bucket_path: String,
    #[serde(default = "default_ledgers_per_file")]
    pub ledgers_per_file: u32,
    #[serde(default = "default_num_workers")]
    pub num_workers: u32,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_retry_wait_seconds")]
    pub retry_wait_seconds: u32,
}

fn default_ledgers_per_file() -> u32 {
    1
}

fn default_num_workers() -> u32 {
    5
}

fn default_retry_limit() -> u32 {
    20
}

fn default_retry_wait_seconds() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub datastore: DatastoreConfig,
    pub stellar_core: StellarCoreConfig,
    pub postgres: PostgresConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| IndexerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&raw).map_err(|source| IndexerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.stellar_core.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml(core: &str) -> String {
        format!(
            "[datastore]\nbucket_path = \"stellar-ledgers/testnet\"\n\
             {core}\n[postgres]\nhost = \"localhost\"\ndatabase = \"stellar\"\nuser = \"stellar\"\n"
        )
    }

    #[test]
    fn network_preset_alone_is_valid() {
        let toml = base_toml("[stellar_core]\nnetwork = \"testnet\"\n");
        let config: Config = toml::from_str(&toml).unwrap();
        assert!(config.stellar_core.validate().is_ok());
    }

    #[test]
    fn full_direct_overrides_are_valid() {
        let toml = base_toml(
            "[stellar_core]\n\
             network_passphrase = \"Test SDF Network ; September 2015\"\n\
             history_archive_urls = [\"https://history.example.org\"]\n\
             captive_core_toml_path = \"/etc/stellar/captive-core.toml\"\n",
        );
        let config: Config = toml::from_str(&toml).unwrap();
        assert!(config.stellar_core.validate().is_ok());
    }

    #[test]
    fn network_and_overrides_together_is_rejected() {
        let toml = base_toml(
            "[stellar_core]\n\
             network = \"testnet\"\n\
             network_passphrase = \"Test SDF Network ; September 2015\"\n",
        );
        let config: Config = toml::from_str(&toml).unwrap();
        assert!(config.stellar_core.validate().is_err());
    }

    #[test]
    fn neither_network_nor_overrides_is_rejected() {
        let toml = base_toml("[stellar_core]\n");
        let config: Config = toml::from_str(&toml).unwrap();
        assert!(config.stellar_core.validate().is_err());
    }

    #[test]
    fn partial_overrides_are_rejected() {
        let toml = base_toml(
            "[stellar_core]\nnetwork_passphrase = \"Test SDF Network ; September 2015\"\n",
        );
        let config: Config = toml::from_str(&toml).unwrap();
        assert!(config.stellar_core.validate().is_err());
    }

    #[test]
    fn env_override_wins_over_file_fields() {
        let config = PostgresConfig {
            host: "localhost".into(),
            port: 5432,
            database: "stellar".into(),
            user: "stellar".into(),
        };
        let conn = config.connection_string(Some("postgres://override/db"));
        assert_eq!(conn, "postgres://override/db");
    }

    #[test]
    fn connection_string_never_carries_a_password() {
        let config = PostgresConfig {
            host: "localhost".into(),
            port: 5433,
            database: "stellar".into(),
            user: "stellar".into(),
        };
        assert_eq!(
            config.connection_string(None),
            "postgres://stellar@localhost:5433/stellar"
        );
    }
}
