//! Document store client module
//!
//! Provides `DocumentStore`, a sink writing documents through the store's
//! REST document API (`PUT /v1/documents?uri=…&collection=…`).

use super::Auth;
use crate::batch::WriteTask;
use crate::error::LoadError;
use crate::etl::Loader;
use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use url::Url;

const DOCUMENTS_PATH: &str = "/v1/documents";
const PING_PATH: &str = "/v1/ping";

/// Document store client for writing documents over HTTP.
///
/// # Example
/// ```no_run
/// use sql_document_loader::client::{Auth, DocumentStore};
/// use url::Url;
///
/// # async fn example() -> eyre::Result<()> {
/// let url = Url::parse("http://localhost:8000")?;
/// let store = DocumentStore::try_new(url, Auth::Basic("admin".into(), "admin".into()))?
///     .with_database("Documents");
/// store.test_connection().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct DocumentStore {
    client: Client,
    url: Url,
    database: Option<String>,
}

impl DocumentStore {
    /// Create a new client from a base URL and authentication scheme.
    ///
    /// # Errors
    /// Returns an error if the credentials cannot be encoded as a header or
    /// the HTTP client cannot be built.
    pub fn try_new(url: Url, auth: Auth) -> Result<Self> {
        Self::try_new_with_options(url, auth, false)
    }

    /// Create a new client, optionally accepting self-signed certificates.
    pub fn try_new_with_options(url: Url, auth: Auth, accept_invalid_certs: bool) -> Result<Self> {
        let mut headers = HeaderMap::new();
        auth.apply(&mut headers)?;
        if accept_invalid_certs {
            log::warn!("TLS certificate verification disabled for {}", url);
        }
        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        log::debug!("Document store client for {} using {} auth", url, auth);
        Ok(Self {
            client,
            url,
            database: None,
        })
    }

    /// Write into a database other than the endpoint's default
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Get the base URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Verify the connection and authentication to the store.
    pub async fn test_connection(&self) -> Result<reqwest::Response> {
        let response = self
            .client
            .request(Method::GET, self.url.join(PING_PATH)?)
            .send()
            .await
            .map_err(|e| eyre!("Failed to send request: {}", e))?;
        if !response.status().is_success() {
            eyre::bail!("Document store responded with {}", response.status());
        }
        Ok(response)
    }

    /// Query parameters addressing one document write
    pub fn write_params(&self, task: &WriteTask) -> Vec<(&'static str, String)> {
        let mut params = vec![("uri", task.uri.clone())];
        params.extend(
            task.collections
                .iter()
                .map(|c| ("collection", c.clone())),
        );
        if let Some(database) = &self.database {
            params.push(("database", database.clone()));
        }
        params
    }

    /// Write one document.
    pub async fn put_document(&self, task: &WriteTask) -> Result<()> {
        let response = self
            .client
            .request(Method::PUT, self.url.join(DOCUMENTS_PATH)?)
            .query(&self.write_params(task))
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static(task.document.format().mime_type()),
            )
            .body(task.document.content().to_string())
            .send()
            .await
            .with_context(|| format!("Failed to send document {}", task.uri))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            eyre::bail!("Failed to write {} ({}): {}", task.uri, status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl Loader for DocumentStore {
    type Item = WriteTask;

    /// Write every document of the batch
    ///
    /// A rejected document does not stop the rest of the batch. When any
    /// write fails the error is a [`LoadError::Sink`] carrying the number of
    /// documents that were written.
    async fn load(&self, items: Vec<Self::Item>) -> Result<usize> {
        let mut written = 0;
        let mut failures = Vec::new();
        for task in &items {
            match self.put_document(task).await {
                Ok(()) => written += 1,
                Err(e) => {
                    log::debug!("{:#}", e);
                    failures.push(e);
                }
            }
        }

        match failures.first() {
            None => {
                log::debug!("Wrote {} document(s) to {}", written, self.url);
                Ok(written)
            }
            Some(first) => Err(LoadError::Sink {
                written,
                message: format!(
                    "{} of {} document(s) failed, first: {:#}",
                    failures.len(),
                    items.len(),
                    first
                ),
            }
            .into()),
        }
    }
}

impl std::fmt::Display for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.database {
            Some(database) => write!(f, "{} (database: {})", self.url, database),
            None => write!(f, "{}", self.url),
        }
    }
}
