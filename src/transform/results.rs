//! Whole-result conversions
//!
//! Render a set of rows at once rather than one document per row. Used to
//! preview what a load would write.

use super::{EnvelopeTransformer, JsonTransformer};
use crate::row::Row;
use eyre::Result;
use serde_json::Value;

/// Render rows as a `<results>` list of envelopes
pub fn rows_to_xml_list(rows: &[Row], transformer: &EnvelopeTransformer) -> Result<String> {
    let mut xml = String::from("<results>\n");
    for row in rows {
        xml.push_str(&transformer.render(row)?);
        xml.push('\n');
    }
    xml.push_str("</results>");
    Ok(xml)
}

/// Render rows as a JSON array of flat objects
pub fn rows_to_json_array(rows: &[Row]) -> Value {
    Value::Array(rows.iter().map(JsonTransformer::to_value).collect())
}
