//! Relational data sources
//!
//! A [`QueryExecutor`] runs the main extraction query as a windowed cursor
//! and looks up a table's primary key columns.

mod memory;
mod postgres;

pub use memory::{MemorySource, MemoryTable};
pub use postgres::PgExecutor;

use crate::error::LoadError;
use crate::etl::Extractor;
use crate::row::Row;
use async_trait::async_trait;

/// A forward-only cursor yielding windows of rows
pub type RowCursor = Box<dyn Extractor<Item = Row>>;

/// Runs queries against a relational source
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Primary key column names of `schema.table`, in key order
    ///
    /// An empty result means the table declares no primary key.
    async fn primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>, LoadError>;

    /// Execute `sql` and return a cursor fetching `fetch_size` rows at a time
    async fn open(&self, sql: &str, fetch_size: usize) -> Result<RowCursor, LoadError>;
}

/// The full-table extraction query
pub fn table_query(schema: &str, table: &str) -> String {
    format!("SELECT * FROM {}.{}", schema, table)
}

/// Read every row of a query into memory, stopping after `limit` rows
pub async fn fetch_rows(
    source: &dyn QueryExecutor,
    sql: &str,
    fetch_size: usize,
    limit: Option<usize>,
) -> Result<Vec<Row>, LoadError> {
    let mut cursor = source.open(sql, fetch_size).await?;
    let mut rows = Vec::new();
    loop {
        let window = cursor.extract().await?;
        if window.is_empty() {
            break;
        }
        rows.extend(window);
        if let Some(limit) = limit
            && rows.len() >= limit
        {
            rows.truncate(limit);
            break;
        }
    }
    Ok(rows)
}
