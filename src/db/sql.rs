//! Builds the `unnest`-based set-upsert SQL used by every adapter.
//!
//! Grounded on `internal/db/ttl.go` and `internal/db/schema.go`'s
//! `UpsertField` / `UpsertCondition` abstraction: a batch is bound as
//! parallel arrays and unnested into rows, then `ON CONFLICT` falls back
//! to an `UPDATE` gated by a predicate comparing the incoming row against
//! the one already stored. The predicate's operator is restricted to a
//! closed set -- there is no code path that interpolates an arbitrary
//! comparison token into SQL.

use std::fmt;

/// The only comparison operators a conflict predicate may use. Anything
/// else is rejected by [`Operator::parse`] before it ever reaches a query
/// string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Operator {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            "=" => Some(Operator::Eq),
            ">=" => Some(Operator::Ge),
            ">" => Some(Operator::Gt),
            _ => None,
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "=",
            Operator::Ge => ">=",
            Operator::Gt => ">",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One gate on the post-conflict `UPDATE`: compare the row already in the
/// table against the incoming row on `column`.
#[derive(Debug, Clone, Copy)]
pub struct UpsertCondition {
    pub column: &'static str,
    pub operator: Operator,
}

/// A column participating in the batch, with the Postgres array type used
/// to unnest it. `name` must be a fixed identifier known at compile time
/// by every caller -- never derived from user input.
#[derive(Debug, Clone, Copy)]
pub struct UpsertField {
    pub name: &'static str,
    pub pg_array_type: &'static str,
}

/// Build the `INSERT ... SELECT FROM unnest(...) ON CONFLICT ... DO
/// UPDATE ... WHERE <conditions>` statement for one chunk. Parameters are
/// bound positionally in the order of `fields`, one array per field.
pub fn build_unnest_upsert(
    table: &str,
    conflict_columns: &[&str],
    fields: &[UpsertField],
    conditions: &[UpsertCondition],
) -> String {
    let columns = fields
        .iter()
        .map(|f| f.name)
        .collect::<Vec<_>>()
        .join(", ");

    let unnest_args = fields
        .iter()
        .enumerate()
        .map(|(i, f)| format!("${}::{}", i + 1, f.pg_array_type))
        .collect::<Vec<_>>()
        .join(", ");

    let conflict = conflict_columns.join(", ");

    let updates = fields
        .iter()
        .filter(|f| !conflict_columns.contains(&f.name))
        .map(|f| format!("{0} = EXCLUDED.{0}", f.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {table} ({columns}) \
         SELECT * FROM unnest({unnest_args}) AS t({columns}) \
         ON CONFLICT ({conflict}) DO UPDATE SET {updates}"
    );

    if !conditions.is_empty() {
        let predicate = conditions
            .iter()
            .map(|c| format!("EXCLUDED.{0} {1} {table}.{0}", c.column, c.operator))
            .collect::<Vec<_>>()
            .join(" AND ");
        sql.push_str(" WHERE ");
        sql.push_str(&predicate);
    }

    sql
}
