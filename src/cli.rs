//! CLI helper functions

use crate::{
    batch::DocumentSink,
    client::{Auth, AuthType, DocumentStore},
    config::{ConfigOverrides, LoaderConfig},
    job::{JobReport, LoadJob},
    source::{PgExecutor, QueryExecutor, fetch_rows, table_query},
    storage::{DirectorySink, MemorySink},
    transform::{DocumentFormat, EnvelopeTransformer, rows_to_json_array, rows_to_xml_list},
    uri::KeySpec,
};
use eyre::{Context, Result, eyre};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Where a load writes its documents
#[derive(Debug)]
pub enum LoadTarget {
    /// The remote document store from `STORE_*` variables
    Store,
    /// Files under a local directory
    Directory(PathBuf),
    /// Discard documents after counting them
    DryRun,
}

/// Load the job configuration from the environment and command line
///
/// Command line values take precedence; required settings may come from
/// either side.
pub fn load_loader_config(overrides: &ConfigOverrides) -> Result<LoaderConfig> {
    let config = LoaderConfig::from_lookup(|key| {
        let flag = match key {
            "SQLLOAD_SOURCE" => overrides.source.clone(),
            "SQLLOAD_SCHEMA" => overrides.schema.clone(),
            "SQLLOAD_TABLE" => overrides.table.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(key).ok())
    })?
    .with_overrides(overrides)?;

    config.validate()?;
    Ok(config)
}

/// Load the document store client from environment variables
///
/// Expected environment variables:
/// - STORE_URL: Document store base URL (required)
/// - STORE_AUTH: Force an auth scheme: apikey, basic or none (optional;
///   digest is not supported)
/// - STORE_USERNAME: Username for basic auth (optional)
/// - STORE_PASSWORD: Password for basic auth (optional)
/// - STORE_APIKEY: API key for auth (optional, preferred over username/password)
/// - STORE_DATABASE: Target database (optional)
/// - STORE_INSECURE: Accept invalid TLS certificates when "true" (optional)
pub fn load_store_client() -> Result<DocumentStore> {
    let url_str = std::env::var("STORE_URL").context("STORE_URL environment variable not set")?;
    let url = Url::parse(&url_str).with_context(|| format!("Invalid STORE_URL: {}", url_str))?;

    let username = std::env::var("STORE_USERNAME").ok();
    let password = std::env::var("STORE_PASSWORD").ok();
    let apikey = std::env::var("STORE_APIKEY").ok();
    let auth = match std::env::var("STORE_AUTH") {
        Ok(scheme) => {
            let auth_type = scheme
                .parse::<AuthType>()
                .map_err(|_| {
                    eyre!(
                        "Invalid STORE_AUTH: {} (supported: {})",
                        scheme,
                        AuthType::SUPPORTED
                    )
                })?;
            Auth::new(&auth_type, username, password, apikey)
        }
        Err(_) => Auth::detect(username, password, apikey),
    };

    let insecure = std::env::var("STORE_INSECURE")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let store = DocumentStore::try_new_with_options(url, auth, insecure)
        .context("Failed to create document store client")?;
    Ok(match std::env::var("STORE_DATABASE") {
        Ok(database) => store.with_database(database),
        Err(_) => store,
    })
}

/// Connect to the source database named by `DATABASE_URL`
pub async fn connect_source(config: &LoaderConfig) -> Result<PgExecutor> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| eyre!("DATABASE_URL environment variable not set"))?;
    let source = PgExecutor::connect(url)
        .await
        .context("Failed to connect to source database")?;
    Ok(source)
}

fn open_sink(target: &LoadTarget) -> Result<DocumentSink> {
    Ok(match target {
        LoadTarget::Store => {
            let store = load_store_client()?;
            log::info!("Writing documents to {}", store.to_string().bright_black());
            Arc::new(store)
        }
        LoadTarget::Directory(path) => {
            log::info!("Writing documents to {}", path.display().bright_black());
            Arc::new(DirectorySink::new(path)?)
        }
        LoadTarget::DryRun => {
            log::info!("Dry run: documents are discarded");
            Arc::new(MemorySink::new())
        }
    })
}

/// Load one table into `target`
///
/// Pipeline: PgExecutor → RowTransformer → BatchWriter → sink
pub async fn run_load(overrides: &ConfigOverrides, target: LoadTarget) -> Result<JobReport> {
    let config = load_loader_config(overrides)?;
    let sink = open_sink(&target)?;

    log::info!("Connecting to source database...");
    let source = connect_source(&config).await?;

    let report = LoadJob::new(&config, &source, sink).run().await;
    source.close().await;

    if report.fatal_error.is_none() {
        log::info!(
            "✓ Loaded {} document(s) from {} in {} ms",
            report.batches.documents_written,
            report.table,
            report.elapsed_ms
        );
    }
    Ok(report)
}

/// Resolve the key columns a load would use for URIs
pub async fn show_keys(overrides: &ConfigOverrides) -> Result<KeySpec> {
    let config = load_loader_config(overrides)?;
    if let Some(keys) = config.primary_key {
        return Ok(keys);
    }

    let source = connect_source(&config).await?;
    let keys = source.primary_keys(&config.schema, &config.table).await;
    source.close().await;
    Ok(KeySpec::new(keys?))
}

/// Render up to `limit` rows as one result document
///
/// XML rows are wrapped in a `<results>` element; JSON rows form an array.
pub async fn preview_rows(overrides: &ConfigOverrides, limit: usize) -> Result<String> {
    let config = load_loader_config(overrides)?;
    let source = connect_source(&config).await?;

    let sql = config
        .query
        .clone()
        .unwrap_or_else(|| table_query(&config.schema, &config.table));
    let rows = fetch_rows(&source, &sql, config.fetch_size.min(limit.max(1)), Some(limit)).await;
    source.close().await;
    let rows = rows?;
    log::debug!("Fetched {} row(s) for preview", rows.len());

    Ok(match config.format {
        DocumentFormat::Xml => {
            let envelope = EnvelopeTransformer::new(config.metadata.clone())
                .with_escaping(config.escape_values);
            rows_to_xml_list(&rows, &envelope)?
        }
        DocumentFormat::Json => serde_json::to_string_pretty(&rows_to_json_array(&rows))?,
    })
}

/// Verify the document store is reachable with the configured credentials
pub async fn check_store() -> Result<String> {
    let store = load_store_client()?;
    store.test_connection().await?;
    Ok(format!("Document store {} is reachable", store.to_string().cyan()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "SQLLOAD_SOURCE",
            "SQLLOAD_SCHEMA",
            "SQLLOAD_TABLE",
            "SQLLOAD_BATCH_SIZE",
            "STORE_URL",
            "STORE_AUTH",
            "STORE_USERNAME",
            "STORE_PASSWORD",
            "STORE_APIKEY",
            "STORE_DATABASE",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_flags_supply_required_settings() {
        clear_env();
        let overrides = ConfigOverrides {
            source: Some("erp".into()),
            schema: Some("hr".into()),
            table: Some("emp".into()),
            ..Default::default()
        };
        let config = load_loader_config(&overrides).unwrap();
        assert_eq!(config.namespace(), ["erp", "hr", "emp"]);
    }

    #[test]
    #[serial]
    fn test_flags_override_environment() {
        clear_env();
        unsafe {
            std::env::set_var("SQLLOAD_SOURCE", "erp");
            std::env::set_var("SQLLOAD_SCHEMA", "hr");
            std::env::set_var("SQLLOAD_TABLE", "emp");
            std::env::set_var("SQLLOAD_BATCH_SIZE", "10");
        }
        let overrides = ConfigOverrides {
            table: Some("dept".into()),
            batch_size: Some(25),
            ..Default::default()
        };
        let config = load_loader_config(&overrides).unwrap();
        assert_eq!(config.table, "dept");
        assert_eq!(config.batch_size, 25);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_table_is_an_error() {
        clear_env();
        let overrides = ConfigOverrides {
            source: Some("erp".into()),
            schema: Some("hr".into()),
            ..Default::default()
        };
        let err = load_loader_config(&overrides).unwrap_err();
        assert!(err.to_string().contains("SQLLOAD_TABLE"));
    }

    #[test]
    #[serial]
    fn test_store_client_from_env() {
        clear_env();
        unsafe {
            std::env::set_var("STORE_URL", "http://localhost:8000");
            std::env::set_var("STORE_DATABASE", "Staging");
        }
        let store = load_store_client().unwrap();
        assert_eq!(store.to_string(), "http://localhost:8000/ (database: Staging)");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_store_client_rejects_unknown_auth() {
        clear_env();
        unsafe {
            std::env::set_var("STORE_URL", "http://localhost:8000");
            std::env::set_var("STORE_AUTH", "kerberos");
        }
        assert!(load_store_client().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_store_client_rejects_digest_auth() {
        clear_env();
        unsafe {
            std::env::set_var("STORE_URL", "http://localhost:8000");
            std::env::set_var("STORE_AUTH", "digest");
        }
        let err = load_store_client().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid STORE_AUTH: digest (supported: apikey, basic, none)"
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_store_url_required() {
        clear_env();
        assert!(load_store_client().is_err());
    }
}
