//! PostgreSQL query source
//!
//! The main query runs behind a server-side cursor inside a transaction so
//! rows arrive in windows of `fetch_size` instead of all at once.
//!
//! Results arrive in the binary format. Column types without a decoding
//! below are rejected with the column named; cast them to `text` in a
//! custom query to load them.

use super::{QueryExecutor, RowCursor};
use crate::error::LoadError;
use crate::etl::Extractor;
use crate::row::{Row, Value};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, PgValueFormat};
use sqlx::types::BigDecimal;
use sqlx::{Column, Postgres, Row as _, Transaction, TypeInfo, ValueRef};

const CURSOR_NAME: &str = "sqlload_cursor";

const PRIMARY_KEY_SQL: &str = r#"
SELECT kcu.column_name::text
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_name = kcu.constraint_name
 AND tc.table_schema = kcu.table_schema
 AND tc.table_name = kcu.table_name
WHERE tc.constraint_type = 'PRIMARY KEY'
  AND lower(tc.table_schema) = lower($1)
  AND lower(tc.table_name) = lower($2)
ORDER BY kcu.ordinal_position
"#;

/// [`QueryExecutor`] backed by a PostgreSQL connection pool
#[derive(Clone, Debug)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    /// Connect to `database_url`
    ///
    /// # Errors
    /// Returns [`LoadError::Connect`] if the database cannot be reached.
    pub async fn connect(database_url: &str) -> Result<Self, LoadError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await
            .map_err(|e| LoadError::Connect(e.to_string()))?;
        log::debug!("Connected to source database");
        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>, LoadError> {
        sqlx::query_scalar::<_, String>(PRIMARY_KEY_SQL)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LoadError::KeyLookup(e.to_string()))
    }

    async fn open(&self, sql: &str, fetch_size: usize) -> Result<RowCursor, LoadError> {
        let mut tx = self.pool.begin().await?;
        let declare = format!("DECLARE {} NO SCROLL CURSOR FOR {}", CURSOR_NAME, sql);
        sqlx::query(&declare)
            .persistent(false)
            .execute(&mut *tx)
            .await?;
        log::debug!("Opened cursor for: {}", sql);

        Ok(Box::new(PgCursor {
            tx: Some(tx),
            fetch: format!("FETCH FORWARD {} FROM {}", fetch_size.max(1), CURSOR_NAME),
        }))
    }
}

struct PgCursor {
    tx: Option<Transaction<'static, Postgres>>,
    fetch: String,
}

#[async_trait]
impl Extractor for PgCursor {
    type Item = Row;

    async fn extract(&mut self) -> Result<Vec<Self::Item>, LoadError> {
        let Some(tx) = self.tx.as_mut() else {
            return Ok(Vec::new());
        };

        // The cursor is redeclared per job, so the FETCH is not cached.
        let rows = sqlx::query(&self.fetch)
            .persistent(false)
            .fetch_all(&mut **tx)
            .await?;
        if rows.is_empty() {
            if let Some(tx) = self.tx.take() {
                tx.commit().await?;
            }
            return Ok(Vec::new());
        }

        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &PgRow) -> Result<Row, LoadError> {
    let mut decoded = Row::new();
    for column in row.columns() {
        let value = decode_value(row, column.ordinal(), column.type_info().name())
            .map_err(|e| match e {
                LoadError::Query(message) => {
                    LoadError::Query(format!("column {}: {}", column.name(), message))
                }
                other => other,
            })?;
        decoded.push(column.name(), value);
    }
    Ok(decoded)
}

fn decode_value(row: &PgRow, index: usize, type_name: &str) -> Result<Value, LoadError> {
    let value: Value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.into(),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(i64::from).into(),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(i64::from).into(),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.into(),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(f64::from).into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.into(),
        "NUMERIC" => row
            .try_get::<Option<BigDecimal>, _>(index)?
            .map(|d| Value::Decimal(d.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row.try_get::<Option<NaiveDateTime>, _>(index)?.into(),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(Value::TimestampTz)
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(Value::Date)
            .unwrap_or(Value::Null),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)?
            .map(Value::Uuid)
            .unwrap_or(Value::Null),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(index)?
            .map(|t| Value::Text(t.to_string()))
            .into(),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" | "CITEXT" => {
            row.try_get_unchecked::<Option<String>, _>(index)?.into()
        }
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(|v| Value::Text(v.to_string()))
            .into(),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)?
            .map(|b| base64::engine::general_purpose::STANDARD.encode(b))
            .into(),
        other => decode_text(row, index, other)?,
    };
    Ok(value)
}

/// Fallback for values the server happened to send as text
fn decode_text(row: &PgRow, index: usize, type_name: &str) -> Result<Value, LoadError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    match raw.format() {
        PgValueFormat::Text => raw
            .as_str()
            .map(|s| Value::Text(s.to_string()))
            .map_err(|e| LoadError::Query(e.to_string())),
        PgValueFormat::Binary => Err(LoadError::Query(format!(
            "unsupported type {}; cast it to text in the query",
            type_name
        ))),
    }
}
