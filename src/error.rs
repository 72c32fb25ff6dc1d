//! Error taxonomy for the loading pipeline
//!
//! Fatal and recoverable failures are kept apart so the job can decide
//! explicitly whether to keep streaming, drain, or stop.

use thiserror::Error;

/// Errors raised by the loading pipeline
#[derive(Clone, Debug, Error)]
pub enum LoadError {
    /// Missing or invalid static configuration (fatal at job start)
    #[error("configuration error: {0}")]
    Config(String),

    /// The source database could not be reached
    #[error("failed to connect to source: {0}")]
    Connect(String),

    /// Opening or reading the main query cursor failed
    #[error("query failed: {0}")]
    Query(String),

    /// The primary key lookup failed; callers fall back to generated ids
    #[error("primary key lookup failed: {0}")]
    KeyLookup(String),

    /// A declared key column is absent from a row
    #[error("key column '{0}' not present in row")]
    MissingKeyColumn(String),

    /// A row could not be converted into a document
    #[error("failed to transform row: {0}")]
    Transform(String),

    /// The document sink did not accept the whole batch
    ///
    /// `written` counts the documents it did accept before or after the
    /// failures.
    #[error("sink error: {message}")]
    Sink { written: usize, message: String },
}

impl LoadError {
    /// Whether this error must abort the job rather than be logged and skipped
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::KeyLookup(_) | Self::Sink { .. })
    }
}

impl From<sqlx::Error> for LoadError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => Self::Config(e.to_string()),
            sqlx::Error::Io(e) => Self::Connect(e.to_string()),
            sqlx::Error::Tls(e) => Self::Connect(e.to_string()),
            sqlx::Error::PoolTimedOut => Self::Connect("connection pool timed out".to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}
