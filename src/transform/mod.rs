//! Row-to-document transformers
//!
//! Converts cursor rows into the documents written to the store: an XML
//! envelope (headers, reserved triples region, instance body) or a flat
//! JSON object keyed by lower-cased column name.

mod envelope;
mod json;
mod metadata;
mod results;

pub use envelope::{EnvelopeTransformer, column_element, element_name, is_element_name};
pub use json::JsonTransformer;
pub use metadata::HeaderMetadata;
pub use results::{rows_to_json_array, rows_to_xml_list};

use crate::etl::Transformer;
use crate::row::Row;
use chrono::NaiveDateTime;
use clap::ValueEnum;
use eyre::Result;
use std::str::FromStr;
use std::sync::Arc;

/// Serialization used for the documents of a load
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DocumentFormat {
    #[default]
    Xml,
    Json,
}

impl DocumentFormat {
    /// File extension used as the URI suffix
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Xml => "application/xml",
            Self::Json => "application/json",
        }
    }
}

impl FromStr for DocumentFormat {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xml" => Ok(Self::Xml),
            "json" => Ok(Self::Json),
            other => Err(format!("unsupported document format '{}'", other)),
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// A serialized document, immutable once built
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    format: DocumentFormat,
    content: String,
}

impl Document {
    pub fn new(format: DocumentFormat, content: impl Into<String>) -> Self {
        Self {
            format,
            content: content.into(),
        }
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.content.into_bytes()
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Source of the ingest timestamp stamped into envelope headers
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Always returns the same instant
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// The transformer selected for a load, by format
pub enum RowTransformer {
    Envelope(EnvelopeTransformer),
    Json(JsonTransformer),
}

impl RowTransformer {
    pub fn new(format: DocumentFormat, metadata: HeaderMetadata, escape_values: bool) -> Self {
        Self::with_clock(format, metadata, escape_values, Arc::new(SystemClock))
    }

    pub fn with_clock(
        format: DocumentFormat,
        metadata: HeaderMetadata,
        escape_values: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        match format {
            DocumentFormat::Xml => Self::Envelope(
                EnvelopeTransformer::new(metadata)
                    .with_escaping(escape_values)
                    .with_clock(clock),
            ),
            DocumentFormat::Json => Self::Json(JsonTransformer),
        }
    }

    pub fn format(&self) -> DocumentFormat {
        match self {
            Self::Envelope(_) => DocumentFormat::Xml,
            Self::Json(_) => DocumentFormat::Json,
        }
    }
}

impl Transformer for RowTransformer {
    type Input = Row;
    type Output = Document;

    fn transform(&self, input: Self::Input) -> Result<Self::Output> {
        match self {
            Self::Envelope(t) => t.transform(input),
            Self::Json(t) => t.transform(input),
        }
    }
}
