//! In-memory query source

use super::{QueryExecutor, RowCursor, table_query};
use crate::error::LoadError;
use crate::etl::Extractor;
use crate::row::Row;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};

/// Rows and key metadata for one in-memory table
#[derive(Clone, Debug, Default)]
pub struct MemoryTable {
    rows: Vec<Row>,
    primary_keys: Vec<String>,
    fail_after: Option<usize>,
}

impl MemoryTable {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn with_primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Make the cursor fail once `rows` rows have been fetched
    pub fn with_failure_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }
}

/// A [`QueryExecutor`] over tables and query results held in memory
///
/// Tables registered with [`MemorySource::with_table`] answer the
/// `SELECT * FROM schema.table` query; arbitrary SQL text can be mapped to
/// rows with [`MemorySource::with_query`].
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    tables: HashMap<String, MemoryTable>,
    queries: HashMap<String, MemoryTable>,
    key_lookup_error: Option<LoadError>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, schema: &str, table: &str, data: MemoryTable) -> Self {
        self.tables.insert(table_key(schema, table), data.clone());
        self.queries.insert(table_query(schema, table), data);
        self
    }

    pub fn with_query(mut self, sql: impl Into<String>, rows: Vec<Row>) -> Self {
        self.queries.insert(sql.into(), MemoryTable::new(rows));
        self
    }

    /// Make every primary key lookup fail with `message`
    pub fn with_key_lookup_error(mut self, message: impl Into<String>) -> Self {
        self.key_lookup_error = Some(LoadError::KeyLookup(message.into()));
        self
    }

    /// Make every primary key lookup fail with `error`
    pub fn with_key_lookup_failure(mut self, error: LoadError) -> Self {
        self.key_lookup_error = Some(error);
        self
    }
}

fn table_key(schema: &str, table: &str) -> String {
    format!("{}.{}", schema.to_lowercase(), table.to_lowercase())
}

#[async_trait]
impl QueryExecutor for MemorySource {
    async fn primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>, LoadError> {
        if let Some(error) = &self.key_lookup_error {
            return Err(error.clone());
        }
        Ok(self
            .tables
            .get(&table_key(schema, table))
            .map(|t| t.primary_keys.clone())
            .unwrap_or_default())
    }

    async fn open(&self, sql: &str, fetch_size: usize) -> Result<RowCursor, LoadError> {
        let table = self
            .queries
            .get(sql)
            .ok_or_else(|| LoadError::Query(format!("relation for query '{}' does not exist", sql)))?;
        Ok(Box::new(MemoryCursor {
            rows: table.rows.iter().cloned().collect(),
            fetch_size: fetch_size.max(1),
            fetched: 0,
            fail_after: table.fail_after,
        }))
    }
}

struct MemoryCursor {
    rows: VecDeque<Row>,
    fetch_size: usize,
    fetched: usize,
    fail_after: Option<usize>,
}

#[async_trait]
impl Extractor for MemoryCursor {
    type Item = Row;

    async fn extract(&mut self) -> Result<Vec<Self::Item>, LoadError> {
        if let Some(limit) = self.fail_after
            && self.fetched >= limit
            && !self.rows.is_empty()
        {
            return Err(LoadError::Query(format!(
                "cursor failed after {} row(s)",
                self.fetched
            )));
        }

        let mut take = self.fetch_size.min(self.rows.len());
        if let Some(limit) = self.fail_after {
            take = take.min(limit - self.fetched);
        }
        self.fetched += take;
        Ok(self.rows.drain(..take).collect())
    }
}
