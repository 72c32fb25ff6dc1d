//! Load job orchestration
//!
//! A [`LoadJob`] moves through
//! `Initializing → ResolvingKeys → Streaming → Draining → Terminated`.
//! Source failures before or during streaming are fatal and end the job
//! with errors after whatever was already submitted has been drained.
//! Failed batches are recorded but never stop the job.

use crate::batch::{BatchOutcome, BatchStats, BatchWriter, DocumentSink, WriteTask};
use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::etl::Transformer;
use crate::row::Row;
use crate::source::{QueryExecutor, RowCursor, table_query};
use crate::transform::{Clock, DocumentFormat, RowTransformer, SystemClock, column_element};
use crate::uri::{IdentifierResolver, KeySpec, UriBuilder};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// How a terminated job ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Ok,
    WithErrors,
}

/// Lifecycle of a load job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Initializing,
    ResolvingKeys,
    Streaming,
    Draining,
    Terminated(JobStatus),
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::ResolvingKeys => write!(f, "resolving keys"),
            Self::Streaming => write!(f, "streaming"),
            Self::Draining => write!(f, "draining"),
            Self::Terminated(JobStatus::Ok) => write!(f, "terminated"),
            Self::Terminated(JobStatus::WithErrors) => write!(f, "terminated with errors"),
        }
    }
}

/// A batch the sink did not fully accept
#[derive(Clone, Debug, Serialize)]
pub struct FailedBatch {
    pub sequence: u64,
    pub size: usize,
    /// Documents of the batch that were written anyway
    pub written: usize,
    pub first_uri: Option<String>,
    pub error: String,
}

/// Summary of a finished job
#[derive(Clone, Debug, Serialize)]
pub struct JobReport {
    pub table: String,
    pub status: JobStatus,
    pub key_columns: Vec<String>,
    pub rows_read: u64,
    pub documents_submitted: u64,
    pub batches: BatchStats,
    pub failed_batches: Vec<FailedBatch>,
    /// Cause of a fatal error, if one ended the job
    pub fatal_error: Option<String>,
    pub elapsed_ms: u64,
}

impl JobReport {
    fn new(table: String) -> Self {
        Self {
            table,
            status: JobStatus::Ok,
            key_columns: Vec::new(),
            rows_read: 0,
            documents_submitted: 0,
            batches: BatchStats::default(),
            failed_batches: Vec::new(),
            fatal_error: None,
            elapsed_ms: 0,
        }
    }

    /// A fatal error ended the job or at least one batch failed
    pub fn has_failures(&self) -> bool {
        self.status == JobStatus::WithErrors || self.batches.has_failures()
    }

    fn record_outcomes(&mut self, outcomes: Vec<BatchOutcome>) {
        self.failed_batches
            .extend(outcomes.into_iter().filter_map(|o| {
                let error = o.failure?;
                Some(FailedBatch {
                    sequence: o.sequence,
                    size: o.size,
                    written: o.written,
                    first_uri: o.first_uri,
                    error,
                })
            }));
    }
}

/// Loads one table (or query result) into a document sink
///
/// # Example
/// ```no_run
/// use sql_document_loader::config::LoaderConfig;
/// use sql_document_loader::job::LoadJob;
/// use sql_document_loader::source::{MemorySource, MemoryTable};
/// use sql_document_loader::storage::MemorySink;
/// use sql_document_loader::row::Row;
/// use std::sync::Arc;
///
/// # async fn example() {
/// let config = LoaderConfig::new("erp", "hr", "emp");
/// let source = MemorySource::new()
///     .with_table("hr", "emp", MemoryTable::new(vec![Row::new().with("ID", 1)]));
/// let report = LoadJob::new(&config, &source, Arc::new(MemorySink::new()))
///     .run()
///     .await;
/// assert_eq!(report.documents_submitted, 1);
/// # }
/// ```
pub struct LoadJob<'a> {
    config: &'a LoaderConfig,
    source: &'a dyn QueryExecutor,
    sink: DocumentSink,
    clock: Arc<dyn Clock>,
    state: JobState,
}

impl<'a> LoadJob<'a> {
    pub fn new(config: &'a LoaderConfig, source: &'a dyn QueryExecutor, sink: DocumentSink) -> Self {
        Self {
            config,
            source,
            sink,
            clock: Arc::new(SystemClock),
            state: JobState::Initializing,
        }
    }

    /// Use `clock` for envelope ingest timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Run the job to completion
    ///
    /// Never returns early with an error: fatal failures are logged and
    /// reported through [`JobReport::fatal_error`].
    pub async fn run(mut self) -> JobReport {
        let started = Instant::now();
        let config = self.config;
        let mut report = JobReport::new(format!("{}.{}", config.schema, config.table));

        log::info!(
            "--------------- Loading data for table: {} ---------------",
            report.table
        );

        self.transition(JobState::Initializing);
        let mut writer = BatchWriter::new(config.writer_config(), self.sink.clone());

        let cursor = match self.initialize().await {
            Ok(cursor) => Some(cursor),
            Err(e) => {
                log::error!("Failed to open source for {}: {}", report.table, e);
                report.fatal_error = Some(e.to_string());
                None
            }
        };

        if let Some(cursor) = cursor {
            self.transition(JobState::ResolvingKeys);
            match self.resolve_keys().await {
                Ok(keys) => {
                    report.key_columns = keys.columns().to_vec();

                    self.transition(JobState::Streaming);
                    if let Err(e) = self.stream(cursor, keys, &mut writer, &mut report).await {
                        log::error!("Streaming {} stopped: {}", report.table, e);
                        report.fatal_error = Some(e.to_string());
                    }
                }
                Err(e) => {
                    log::error!("Failed to resolve keys for {}: {}", report.table, e);
                    report.fatal_error = Some(e.to_string());
                }
            }
        }

        self.transition(JobState::Draining);
        writer.flush_and_wait().await;
        report.record_outcomes(writer.drain_outcomes());
        report.batches = writer.stats();

        match writer.stop().await {
            Ok(stats) => report.batches = stats,
            Err(e) => {
                log::error!("Failed to stop document sink: {:#}", e);
                report.fatal_error.get_or_insert_with(|| format!("{:#}", e));
            }
        }

        report.status = if report.fatal_error.is_some() {
            JobStatus::WithErrors
        } else {
            JobStatus::Ok
        };
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        self.transition(JobState::Terminated(report.status));

        log::info!(
            "Finished {}: {} row(s) read, {} document(s) submitted, {} batch(es), {} failed",
            report.table,
            report.rows_read,
            report.documents_submitted,
            report.batches.batches_dispatched,
            report.batches.batches_failed
        );
        report
    }

    fn transition(&mut self, state: JobState) {
        log::debug!("Job state: {} -> {}", self.state, state);
        self.state = state;
    }

    async fn initialize(&self) -> Result<RowCursor, LoadError> {
        self.config.validate()?;
        let sql = self
            .config
            .query
            .clone()
            .unwrap_or_else(|| table_query(&self.config.schema, &self.config.table));
        self.source.open(&sql, self.config.fetch_size).await
    }

    /// Configured key columns, else the table's primary key, else none
    ///
    /// Only errors that are not recoverable by generating ids are returned.
    async fn resolve_keys(&self) -> Result<KeySpec, LoadError> {
        if let Some(keys) = &self.config.primary_key {
            log::info!("Using configured column(s) {} for unique URI value", keys);
            return Ok(keys.clone());
        }

        match self
            .source
            .primary_keys(&self.config.schema, &self.config.table)
            .await
        {
            Ok(columns) if columns.is_empty() => {
                log::info!("Using a randomly generated UUID for unique URI value");
                Ok(KeySpec::empty())
            }
            Ok(columns) => {
                for column in &columns {
                    log::info!("Using value in column: {} for unique URI value", column);
                }
                Ok(KeySpec::new(columns))
            }
            Err(e) if !e.is_fatal() => {
                log::info!("{}; using a randomly generated UUID for unique URI value", e);
                Ok(KeySpec::empty())
            }
            Err(e) => Err(e),
        }
    }

    async fn stream(
        &self,
        mut cursor: RowCursor,
        keys: KeySpec,
        writer: &mut BatchWriter,
        report: &mut JobReport,
    ) -> Result<(), LoadError> {
        let config = self.config;
        let uris = UriBuilder::new(config.namespace()).with_leading_slash(config.leading_slash);
        let transformer = RowTransformer::with_clock(
            config.format,
            config.metadata.clone(),
            config.escape_values,
            self.clock.clone(),
        );
        let extension = transformer.format().extension();
        let collections: Arc<[String]> = Arc::from(config.collections.clone());
        let mut first_row = true;
        let resolver = IdentifierResolver::new(keys);

        loop {
            let window = cursor.extract().await?;
            if window.is_empty() {
                break;
            }

            for row in window {
                report.rows_read += 1;
                if first_row {
                    resolver.keys().validate(&row).map_err(|e| {
                        LoadError::Config(format!("{} in {}", e, report.table))
                    })?;
                    if transformer.format() == DocumentFormat::Xml {
                        warn_renamed_columns(&row);
                    }
                    first_row = false;
                }

                let id = resolver.resolve(&row)?;
                let uri = uris.uri(&id, extension);
                let document = transformer
                    .transform(row)
                    .map_err(|e| LoadError::Transform(format!("{:#}", e)))?;

                writer
                    .add(WriteTask::new(uri, collections.clone(), document))
                    .await;
                report.documents_submitted += 1;
            }

            report.record_outcomes(writer.drain_outcomes());
        }
        Ok(())
    }
}

fn warn_renamed_columns(row: &Row) {
    for column in row.column_names() {
        let element = column_element(column);
        if element != column.trim().to_lowercase() {
            log::warn!("Column '{}' is written as element <{}>", column, element);
        }
    }
}
