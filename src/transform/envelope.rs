//! XML envelope transformer
//!
//! Produces documents of the form
//!
//! ```text
//! <envelope>
//!   <headers><IngestDate>…</IngestDate><key>value</key>…</headers>
//!   <triples></triples>
//!   <instance><column>value</column>…</instance>
//! </envelope>
//! ```
//!
//! (without the whitespace). Column elements use the lower-cased column
//! label and keep cursor column order. Labels that are not valid XML names
//! have each offending character replaced with `_`.

use super::{Clock, Document, DocumentFormat, HeaderMetadata, SystemClock};
use crate::etl::Transformer;
use crate::row::Row;
use eyre::Result;
use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::borrow::Cow;
use std::sync::Arc;

const INGEST_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Wraps each row in an XML envelope with header metadata
///
/// # Example
/// ```
/// use sql_document_loader::etl::Transformer;
/// use sql_document_loader::row::Row;
/// use sql_document_loader::transform::{EnvelopeTransformer, HeaderMetadata};
///
/// let transformer = EnvelopeTransformer::new(HeaderMetadata::parse("env,prod").unwrap());
/// let doc = transformer.transform(Row::new().with("ID", 1)).unwrap();
/// assert!(doc.content().contains("<env>prod</env>"));
/// assert!(doc.content().contains("<instance><id>1</id></instance>"));
/// ```
pub struct EnvelopeTransformer {
    metadata: HeaderMetadata,
    escape_values: bool,
    clock: Arc<dyn Clock>,
}

impl EnvelopeTransformer {
    pub fn new(metadata: HeaderMetadata) -> Self {
        Self {
            metadata,
            escape_values: true,
            clock: Arc::new(SystemClock),
        }
    }

    /// Escape `& < > " '` in values (default: true)
    ///
    /// Disabling reproduces the raw output of older loaders byte for byte,
    /// at the cost of malformed XML when values contain markup characters.
    pub fn with_escaping(mut self, escape_values: bool) -> Self {
        self.escape_values = escape_values;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Render the envelope for one row
    pub fn render(&self, row: &Row) -> Result<String> {
        let mut writer = Writer::new(Vec::with_capacity(128 + row.len() * 32));
        writer.write_event(Event::Start(BytesStart::new("envelope")))?;

        writer.write_event(Event::Start(BytesStart::new("headers")))?;
        let ingest_date = self.clock.now().format(INGEST_DATE_FORMAT).to_string();
        write_element(&mut writer, "IngestDate", Cow::Owned(ingest_date))?;
        for (key, value) in self.metadata.iter() {
            write_element(&mut writer, &element_name(key), self.text(value))?;
        }
        writer.write_event(Event::End(BytesEnd::new("headers")))?;

        writer.write_event(Event::Start(BytesStart::new("triples")))?;
        writer.write_event(Event::End(BytesEnd::new("triples")))?;

        writer.write_event(Event::Start(BytesStart::new("instance")))?;
        for (column, value) in row.iter() {
            let value = value.to_string();
            write_element(&mut writer, &column_element(column), self.text(&value))?;
        }
        writer.write_event(Event::End(BytesEnd::new("instance")))?;

        writer.write_event(Event::End(BytesEnd::new("envelope")))?;
        Ok(String::from_utf8(writer.into_inner())?)
    }

    fn text<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if self.escape_values {
            escape(value)
        } else {
            Cow::Borrowed(value)
        }
    }
}

impl Transformer for EnvelopeTransformer {
    type Input = Row;
    type Output = Document;

    fn transform(&self, input: Self::Input) -> Result<Self::Output> {
        Ok(Document::new(DocumentFormat::Xml, self.render(&input)?))
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, tag: &str, text: Cow<'_, str>) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::from_escaped(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Element name a column label is written under
pub fn column_element(label: &str) -> String {
    element_name(&label.trim().to_lowercase()).into_owned()
}

/// `name` made into a valid XML element name
///
/// Characters outside the XML name set become `_`, and a name that does
/// not start with a letter or `_` gets a leading `_`.
pub fn element_name(name: &str) -> Cow<'_, str> {
    if is_element_name(name) {
        return Cow::Borrowed(name);
    }

    let mut fixed = String::with_capacity(name.len() + 1);
    if !name.chars().next().is_some_and(is_name_start) {
        fixed.push('_');
    }
    fixed.extend(
        name.chars()
            .map(|c| if is_name_char(c) { c } else { '_' }),
    );
    Cow::Owned(fixed)
}

/// Whether `name` can be used as an element name as is
pub fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_numeric() || c == '-' || c == '.'
}
