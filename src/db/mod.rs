//! Postgres storage layer: schema management, the generic upsert builder,
//! and one concrete sink per dataset.

pub mod contract_data;
pub mod schema;
pub mod sql;
pub mod ttl;
pub mod upsert;

use crate::error::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Opens a pool against `conn_string` and runs pending migrations. The
/// single entry point the driver uses to stand up storage.
pub async fn connect(conn_string: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(conn_string)
        .await?;
    schema::run_migrations(&pool).await?;
    Ok(pool)
}
