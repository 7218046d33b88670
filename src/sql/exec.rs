//! Statement execution: bind a `QueryBuf`, log it, decode rows.

use super::{row_to_json, PgBindValue, QueryBuf};
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use sqlx::{Executor, Row};

fn bind(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

pub async fn fetch_all<'e, E>(executor: E, q: &QueryBuf) -> Result<Vec<Map<String, Value>>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let rows = bind(q).fetch_all(executor).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

pub async fn fetch_optional<'e, E>(executor: E, q: &QueryBuf) -> Result<Option<Map<String, Value>>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let row = bind(q).fetch_optional(executor).await?;
    Ok(row.as_ref().map(row_to_json))
}

/// Run a statement without result rows; returns rows affected.
pub async fn execute<'e, E>(executor: E, q: &QueryBuf) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
    let done = bind(q).execute(executor).await?;
    Ok(done.rows_affected())
}

/// Run a `SELECT COUNT(*) AS "count"` statement.
pub async fn fetch_count<'e, E>(executor: E, q: &QueryBuf) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "count");
    let row = bind(q).fetch_one(executor).await?;
    row.try_get::<i64, _>("count")
}
