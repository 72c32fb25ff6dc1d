//! SQL Document Loader
//!
//! Streams rows out of a relational table, turns each row into an XML
//! envelope or flat JSON document addressed by a stable URI, and writes the
//! documents to a store in bounded, concurrent batches.

pub mod batch;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod etl;
pub mod job;
pub mod row;
pub mod source;
pub mod storage;
pub mod transform;
pub mod uri;

// Re-exports for convenience
pub use batch::{BatchWriter, BatchWriterConfig, WriteTask};
pub use client::{Auth, AuthType, DocumentStore};
pub use config::LoaderConfig;
pub use error::LoadError;
pub use etl::{Extractor, Loader, Transformer};
pub use job::{JobReport, JobStatus, LoadJob};
pub use row::{Row, Value};
pub use source::{MemorySource, PgExecutor, QueryExecutor};
pub use storage::{DirectorySink, MemorySink};
pub use transform::{Document, DocumentFormat, RowTransformer};
pub use uri::{IdentifierResolver, KeySpec, UriBuilder};
