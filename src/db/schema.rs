//! Embedded schema migrations for `contract_data` and `ttl`.

use sqlx::PgPool;

use crate::error::Result;

/// Runs every migration under `migrations/` that hasn't already been
/// applied to this database, in order. Safe to call on every startup.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
