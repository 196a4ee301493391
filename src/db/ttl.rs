//! Postgres sink for the standalone `ttl` table.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::changes::TtlRow;
use crate::db::sql::{build_unnest_upsert, Operator, UpsertCondition, UpsertField};
use crate::db::upsert::{chunks, with_retry};
use crate::error::Result;
use crate::sink::Sink;

const TABLE: &str = "ttl";

const FIELDS: &[UpsertField] = &[
    UpsertField {
        name: "key_hash",
        pg_array_type: "text[]",
    },
    UpsertField {
        name: "live_until_ledger_sequence",
        pg_array_type: "bigint[]",
    },
    UpsertField {
        name: "ledger_sequence",
        pg_array_type: "bigint[]",
    },
    UpsertField {
        name: "closed_at",
        pg_array_type: "timestamptz[]",
    },
];

fn upsert_sql() -> String {
    build_unnest_upsert(
        TABLE,
        &["key_hash"],
        FIELDS,
        &[UpsertCondition {
            column: "ledger_sequence",
            operator: Operator::Gt,
        }],
    )
}

pub struct TtlSink {
    pool: PgPool,
}

impl TtlSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn write_chunk(&self, rows: &[TtlRow]) -> Result<()> {
        let sql = upsert_sql();
        let key_hashes: Vec<&str> = rows.iter().map(|r| r.key_hash.as_str()).collect();
        let live_untils: Vec<i64> = rows
            .iter()
            .map(|r| r.live_until_ledger_sequence as i64)
            .collect();
        let sequences: Vec<i64> = rows.iter().map(|r| r.ledger_sequence as i64).collect();
        let closed_ats: Vec<_> = rows.iter().map(|r| r.closed_at).collect();

        let mut tx = self.pool.begin().await?;
        sqlx::query(&sql)
            .bind(&key_hashes)
            .bind(&live_untils)
            .bind(&sequences)
            .bind(&closed_ats)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Sink<TtlRow> for TtlSink {
    async fn write_one(&self, row: TtlRow) -> Result<()> {
        self.write_many(vec![row]).await
    }

    async fn write_many(&self, rows: Vec<TtlRow>) -> Result<()> {
        for chunk in chunks(&rows) {
            with_retry(TABLE, || self.write_chunk(&chunk)).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn max_indexed_sequence(&self) -> Result<Option<u32>> {
        let row: Option<(Option<i64>,)> =
            sqlx::query_as(&format!("SELECT max(ledger_sequence) FROM {TABLE}"))
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(v,)| v).map(|v| v as u32))
    }
}
