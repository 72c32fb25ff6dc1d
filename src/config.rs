//! Loader configuration
//!
//! All settings are read once at startup into an immutable [`LoaderConfig`]
//! which every component receives by reference.
//!
//! Environment variables:
//! - `DATABASE_URL`: source database connection string
//! - `SQLLOAD_SOURCE`, `SQLLOAD_SCHEMA`, `SQLLOAD_TABLE`: URI namespace and table (required)
//! - `SQLLOAD_QUERY`: custom extraction query (optional, defaults to the whole table)
//! - `SQLLOAD_METADATA`: envelope header metadata, `key1,value1;key2,value2`
//! - `SQLLOAD_COLLECTIONS`: comma-separated collection tags
//! - `SQLLOAD_PRIMARY_KEY`: comma-separated key columns, bypassing the key lookup
//! - `SQLLOAD_BATCH_SIZE` (100), `SQLLOAD_THREAD_COUNT` (1),
//!   `SQLLOAD_FETCH_SIZE` (100), `SQLLOAD_MAX_IN_FLIGHT` (2)
//! - `SQLLOAD_FORMAT`: `xml` (default) or `json`
//! - `SQLLOAD_RAW_XML`: `true` to write values without XML escaping

use crate::batch::BatchWriterConfig;
use crate::error::LoadError;
use crate::transform::{DocumentFormat, HeaderMetadata};
use crate::uri::KeySpec;
use clap::Args;
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_THREAD_COUNT: usize = 1;
pub const DEFAULT_FETCH_SIZE: usize = 100;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 2;

/// Static configuration for one load
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    pub database_url: Option<String>,
    /// Leading URI segment naming the source system
    pub source_name: String,
    pub schema: String,
    pub table: String,
    /// Replaces `SELECT * FROM schema.table` when set
    pub query: Option<String>,
    pub metadata: HeaderMetadata,
    pub collections: Vec<String>,
    /// Key columns overriding the primary key lookup
    pub primary_key: Option<KeySpec>,
    pub batch_size: usize,
    pub thread_count: usize,
    pub fetch_size: usize,
    pub max_in_flight: usize,
    pub format: DocumentFormat,
    pub escape_values: bool,
    /// Prefix URIs with `/`
    pub leading_slash: bool,
}

impl LoaderConfig {
    /// Minimal configuration for `source/schema/table`, everything else default
    pub fn new(
        source_name: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            database_url: None,
            source_name: source_name.into(),
            schema: schema.into(),
            table: table.into(),
            query: None,
            metadata: HeaderMetadata::default(),
            collections: Vec::new(),
            primary_key: None,
            batch_size: DEFAULT_BATCH_SIZE,
            thread_count: DEFAULT_THREAD_COUNT,
            fetch_size: DEFAULT_FETCH_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            format: DocumentFormat::Xml,
            escape_values: true,
            leading_slash: true,
        }
    }

    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, LoadError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LoadError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| LoadError::Config(format!("{} environment variable not set", key)))
        };

        let mut config = Self::new(
            required("SQLLOAD_SOURCE")?,
            required("SQLLOAD_SCHEMA")?,
            required("SQLLOAD_TABLE")?,
        );
        config.database_url = get("DATABASE_URL");
        config.query = get("SQLLOAD_QUERY");
        if let Some(metadata) = get("SQLLOAD_METADATA") {
            config.metadata = HeaderMetadata::parse(&metadata)?;
        }
        if let Some(collections) = get("SQLLOAD_COLLECTIONS") {
            config.collections = parse_list(&collections);
        }
        if let Some(keys) = get("SQLLOAD_PRIMARY_KEY") {
            config.primary_key = Some(KeySpec::new(parse_list(&keys)));
        }
        if let Some(v) = get("SQLLOAD_BATCH_SIZE") {
            config.batch_size = parse_number("SQLLOAD_BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("SQLLOAD_THREAD_COUNT") {
            config.thread_count = parse_number("SQLLOAD_THREAD_COUNT", &v)?;
        }
        if let Some(v) = get("SQLLOAD_FETCH_SIZE") {
            config.fetch_size = parse_number("SQLLOAD_FETCH_SIZE", &v)?;
        }
        if let Some(v) = get("SQLLOAD_MAX_IN_FLIGHT") {
            config.max_in_flight = parse_number("SQLLOAD_MAX_IN_FLIGHT", &v)?;
        }
        if let Some(v) = get("SQLLOAD_FORMAT") {
            config.format = DocumentFormat::from_str(&v).map_err(LoadError::Config)?;
        }
        if let Some(v) = get("SQLLOAD_RAW_XML") {
            config.escape_values = !parse_bool("SQLLOAD_RAW_XML", &v)?;
        }
        Ok(config)
    }

    /// Apply command line overrides on top of this configuration
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self, LoadError> {
        if let Some(source) = &overrides.source {
            self.source_name = source.clone();
        }
        if let Some(schema) = &overrides.schema {
            self.schema = schema.clone();
        }
        if let Some(table) = &overrides.table {
            self.table = table.clone();
        }
        if let Some(query) = &overrides.query {
            self.query = Some(query.clone());
        }
        if let Some(metadata) = &overrides.metadata {
            self.metadata = HeaderMetadata::parse(metadata)?;
        }
        if let Some(collections) = &overrides.collections {
            self.collections = parse_list(collections);
        }
        if let Some(keys) = &overrides.primary_key {
            self.primary_key = Some(KeySpec::new(parse_list(keys)));
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(thread_count) = overrides.thread_count {
            self.thread_count = thread_count;
        }
        if let Some(fetch_size) = overrides.fetch_size {
            self.fetch_size = fetch_size;
        }
        if let Some(format) = overrides.format {
            self.format = format;
        }
        if overrides.raw_xml {
            self.escape_values = false;
        }
        if overrides.no_leading_slash {
            self.leading_slash = false;
        }
        Ok(self)
    }

    /// Check the configuration before a job starts
    ///
    /// # Errors
    /// Returns [`LoadError::Config`] for zero sizes or for schema and table
    /// names that are not plain SQL identifiers.
    pub fn validate(&self) -> Result<(), LoadError> {
        for (name, value) in [("schema", &self.schema), ("table", &self.table)] {
            if !identifier_pattern().is_match(value) {
                return Err(LoadError::Config(format!(
                    "{} name '{}' is not a valid SQL identifier",
                    name, value
                )));
            }
        }
        for (name, value) in [
            ("batch size", self.batch_size),
            ("thread count", self.thread_count),
            ("fetch size", self.fetch_size),
            ("max in flight", self.max_in_flight),
        ] {
            if value == 0 {
                return Err(LoadError::Config(format!("{} must be at least 1", name)));
            }
        }
        if self.source_name.trim().is_empty() {
            return Err(LoadError::Config("source name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Namespace segments every document URI starts with
    pub fn namespace(&self) -> [&str; 3] {
        [&self.source_name, &self.schema, &self.table]
    }

    pub fn writer_config(&self) -> BatchWriterConfig {
        BatchWriterConfig {
            job_name: format!("{}.{}", self.schema, self.table),
            batch_size: self.batch_size,
            thread_count: self.thread_count,
            max_in_flight: self.max_in_flight,
        }
    }
}

/// Command line overrides for [`LoaderConfig`]
#[derive(Args, Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Source system name used as the first URI segment
    #[arg(long)]
    pub source: Option<String>,

    /// Schema of the table to load
    #[arg(long)]
    pub schema: Option<String>,

    /// Table to load
    #[arg(long)]
    pub table: Option<String>,

    /// Custom extraction query instead of the whole table
    #[arg(long)]
    pub query: Option<String>,

    /// Envelope header metadata as "key1,value1;key2,value2"
    #[arg(long)]
    pub metadata: Option<String>,

    /// Comma-separated collection tags
    #[arg(long)]
    pub collections: Option<String>,

    /// Comma-separated key columns, bypassing the primary key lookup
    #[arg(long)]
    pub primary_key: Option<String>,

    /// Documents per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Number of batch writer workers
    #[arg(long)]
    pub thread_count: Option<usize>,

    /// Rows fetched from the database per round trip
    #[arg(long)]
    pub fetch_size: Option<usize>,

    /// Document format
    #[arg(long, value_enum)]
    pub format: Option<DocumentFormat>,

    /// Write values into XML without escaping special characters
    #[arg(long)]
    pub raw_xml: bool,

    /// Do not prefix document URIs with "/"
    #[arg(long)]
    pub no_leading_slash: bool,
}

/// Split a comma-separated list, dropping blanks
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_number(key: &str, value: &str) -> Result<usize, LoadError> {
    value
        .trim()
        .parse()
        .map_err(|_| LoadError::Config(format!("{} must be a positive integer, got '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, LoadError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(LoadError::Config(format!("{} must be true or false, got '{}'", key, value))),
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SQLLOAD_SOURCE", "erp"),
            ("SQLLOAD_SCHEMA", "hr"),
            ("SQLLOAD_TABLE", "employees"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::from_lookup(lookup(&required())).unwrap();
        assert_eq!(config.namespace(), ["erp", "hr", "employees"]);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.thread_count, 1);
        assert_eq!(config.fetch_size, 100);
        assert_eq!(config.format, DocumentFormat::Xml);
        assert!(config.escape_values);
        assert!(config.primary_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = LoaderConfig::from_lookup(lookup(&[("SQLLOAD_SOURCE", "erp")])).unwrap_err();
        assert!(err.to_string().contains("SQLLOAD_SCHEMA"));
    }

    #[test]
    fn test_full_environment() {
        let mut vars = required();
        vars.extend([
            ("SQLLOAD_METADATA", "env,prod;team,hr"),
            ("SQLLOAD_COLLECTIONS", "employees, hr ,"),
            ("SQLLOAD_PRIMARY_KEY", "DEPT_ID,EMP_ID"),
            ("SQLLOAD_BATCH_SIZE", "250"),
            ("SQLLOAD_FORMAT", "json"),
            ("SQLLOAD_RAW_XML", "true"),
        ]);
        let config = LoaderConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.metadata.len(), 2);
        assert_eq!(config.collections, vec!["employees", "hr"]);
        assert_eq!(config.primary_key, Some(KeySpec::new(["DEPT_ID", "EMP_ID"])));
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.format, DocumentFormat::Json);
        assert!(!config.escape_values);
    }

    #[test]
    fn test_invalid_values() {
        let mut vars = required();
        vars.push(("SQLLOAD_BATCH_SIZE", "lots"));
        assert!(LoaderConfig::from_lookup(lookup(&vars)).is_err());

        let mut vars = required();
        vars.push(("SQLLOAD_METADATA", "broken"));
        assert!(matches!(
            LoaderConfig::from_lookup(lookup(&vars)),
            Err(LoadError::Config(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = LoaderConfig::new("erp", "hr", "employees")
            .with_overrides(&ConfigOverrides {
                table: Some("contractors".into()),
                batch_size: Some(10),
                raw_xml: true,
                no_leading_slash: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.table, "contractors");
        assert_eq!(config.batch_size, 10);
        assert!(!config.escape_values);
        assert!(!config.leading_slash);
    }

    #[test]
    fn test_validate_rejects_bad_identifiers() {
        let mut config = LoaderConfig::new("erp", "hr", "employees; DROP TABLE x");
        assert!(config.validate().is_err());
        config.table = "employees".into();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_writer_config() {
        let mut config = LoaderConfig::new("erp", "hr", "employees");
        config.thread_count = 4;
        let writer = config.writer_config();
        assert_eq!(writer.job_name, "hr.employees");
        assert_eq!(writer.thread_count, 4);
        assert_eq!(writer.batch_size, 100);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        // SAFETY: serialized with the other environment tests
        unsafe {
            std::env::set_var("SQLLOAD_SOURCE", "crm");
            std::env::set_var("SQLLOAD_SCHEMA", "sales");
            std::env::set_var("SQLLOAD_TABLE", "orders");
        }
        let config = LoaderConfig::from_env().unwrap();
        assert_eq!(config.namespace(), ["crm", "sales", "orders"]);
        unsafe {
            std::env::remove_var("SQLLOAD_SOURCE");
            std::env::remove_var("SQLLOAD_SCHEMA");
            std::env::remove_var("SQLLOAD_TABLE");
        }
    }
}
