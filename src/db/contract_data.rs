//! Postgres sink for the `contract_data` table.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::changes::ContractDataRow;
use crate::db::sql::{build_unnest_upsert, Operator, UpsertCondition, UpsertField};
use crate::db::upsert::{chunks, with_retry};
use crate::error::Result;
use crate::sink::Sink;

const TABLE: &str = "contract_data";

const FIELDS: &[UpsertField] = &[
    UpsertField {
        name: "contract_id",
        pg_array_type: "text[]",
    },
    UpsertField {
        name: "key_hash",
        pg_array_type: "text[]",
    },
    UpsertField {
        name: "ledger_sequence",
        pg_array_type: "bigint[]",
    },
    UpsertField {
        name: "durability",
        pg_array_type: "text[]",
    },
    UpsertField {
        name: "key_symbol",
        pg_array_type: "text[]",
    },
    UpsertField {
        name: "key",
        pg_array_type: "bytea[]",
    },
    UpsertField {
        name: "val",
        pg_array_type: "bytea[]",
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

pub struct ContractDataSink {
    pool: PgPool,
}

impl ContractDataSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn write_chunk(&self, rows: &[ContractDataRow]) -> Result<()> {
        let sql = upsert_sql();
        let contract_ids: Vec<&str> = rows.iter().map(|r| r.contract_id.as_str()).collect();
        let key_hashes: Vec<&str> = rows.iter().map(|r| r.key_hash.as_str()).collect();
        let sequences: Vec<i64> = rows.iter().map(|r| r.ledger_sequence as i64).collect();
        let durabilities: Vec<&str> = rows.iter().map(|r| r.durability.as_str()).collect();
        let symbols: Vec<&str> = rows.iter().map(|r| r.key_symbol.as_str()).collect();
        let keys: Vec<&[u8]> = rows.iter().map(|r| r.key.as_slice()).collect();
        let vals: Vec<&[u8]> = rows.iter().map(|r| r.val.as_slice()).collect();
        let closed_ats: Vec<_> = rows.iter().map(|r| r.closed_at).collect();

        let mut tx = self.pool.begin().await?;
        sqlx::query(&sql)
            .bind(&contract_ids)
            .bind(&key_hashes)
            .bind(&sequences)
            .bind(&durabilities)
            .bind(&symbols)
            .bind(&keys)
            .bind(&vals)
            .bind(&closed_ats)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Sink<ContractDataRow> for ContractDataSink {
    async fn write_one(&self, row: ContractDataRow) -> Result<()> {
        self.write_many(vec![row]).await
    }

    async fn write_many(&self, rows: Vec<ContractDataRow>) -> Result<()> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_sql_uses_key_hash_conflict_target() {
        let sql = upsert_sql();
        assert!(sql.contains("ON CONFLICT (key_hash)"));
        assert!(sql.contains("EXCLUDED.ledger_sequence > contract_data.ledger_sequence"));
    }
}
