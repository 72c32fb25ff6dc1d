//! Flat JSON transformer

use super::{Document, DocumentFormat};
use crate::etl::Transformer;
use crate::row::Row;
use eyre::{Context, Result};
use serde_json::{Map, Value};

/// Converts a row into a flat JSON object keyed by lower-cased column name
///
/// No envelope is added in this mode; values keep their native JSON type
/// and SQL `NULL` becomes JSON `null`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonTransformer;

impl JsonTransformer {
    pub fn to_value(row: &Row) -> Value {
        let object: Map<String, Value> = row
            .iter()
            .map(|(column, value)| (column.trim().to_lowercase(), value.to_json()))
            .collect();
        Value::Object(object)
    }
}

impl Transformer for JsonTransformer {
    type Input = Row;
    type Output = Document;

    fn transform(&self, input: Self::Input) -> Result<Self::Output> {
        let content = serde_json::to_string(&Self::to_value(&input))
            .with_context(|| "Failed to serialize row to JSON")?;
        Ok(Document::new(DocumentFormat::Json, content))
    }
}
