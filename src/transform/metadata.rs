//! Envelope header metadata
//!
//! Parsed once at job start from the `key1,value1;key2,value2` form.

use super::is_element_name;
use crate::error::LoadError;
use std::str::FromStr;

/// Ordered `(key, value)` pairs injected into every envelope header
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderMetadata {
    pairs: Vec<(String, String)>,
}

impl HeaderMetadata {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse `key1,value1;key2,value2`
    ///
    /// Blank input yields no metadata. Entries without a `,`, or whose key
    /// is not a valid XML element name, are rejected. Only the first `,` splits an entry, so values
    /// may contain commas.
    pub fn parse(input: &str) -> Result<Self, LoadError> {
        let mut pairs = Vec::new();
        for entry in input.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value) = entry.split_once(',').ok_or_else(|| {
                LoadError::Config(format!(
                    "metadata entry '{}' is not in key,value form",
                    entry
                ))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(LoadError::Config(format!(
                    "metadata entry '{}' has an empty key",
                    entry
                )));
            }
            if !is_element_name(key) {
                return Err(LoadError::Config(format!(
                    "metadata key '{}' is not a valid XML element name",
                    key
                )));
            }
            pairs.push((key.to_string(), value.trim().to_string()));
        }
        Ok(Self { pairs })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromStr for HeaderMetadata {
    type Err = LoadError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
