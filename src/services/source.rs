// src/services/source.rs

//! Listing sources.
//!
//! A source turns a [`SearchQuery`] into a batch of raw listings. How the
//! listings are scraped is the source's business; the pipeline only sees the
//! batch or an error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{RawListing, SearchQuery, SourceConfig, SourceKind};
use crate::utils::http;

/// Something that can produce a batch of listings.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Fetch one batch for `query`.
    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<RawListing>>;
}

/// Scraping service reached over HTTP.
///
/// The query is POSTed as JSON; the service answers with a JSON array of
/// listings.
pub struct HttpListingSource {
    client: Client,
    endpoint: Url,
}

impl HttpListingSource {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let endpoint = Url::parse(config.endpoint.trim())
            .map_err(|e| AppError::config(format!("source.endpoint: {e}")))?;
        let client = http::create_async_client(
            &config.user_agent,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self::new(client, endpoint))
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    fn name(&self) -> &str {
        self.endpoint.as_str()
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<RawListing>> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(query)
            .send()
            .await
            .map_err(|e| AppError::fetch(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::fetch(format!(
                "{} returned {}: {}",
                self.endpoint,
                status,
                http::snippet(&body)
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::fetch(format!("reading body from {}: {}", self.endpoint, e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::fetch(format!("decoding listings from {}: {}", self.endpoint, e)))
    }
}

/// Batch read from a JSON file on disk.
pub struct FileListingSource {
    path: PathBuf,
    label: String,
}

impl FileListingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path.display().to_string();
        Self { path, label }
    }
}

#[async_trait]
impl ListingSource for FileListingSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<RawListing>> {
        log::debug!(
            "Reading batch for '{}' in '{}' from {}",
            query.search_term,
            query.location,
            self.label
        );
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| AppError::fetch(format!("reading {}: {}", self.label, e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::fetch(format!("decoding {}: {}", self.label, e)))
    }
}

/// Build the configured source.
pub fn from_config(config: &SourceConfig) -> Result<Arc<dyn ListingSource>> {
    let source: Arc<dyn ListingSource> = match config.kind {
        SourceKind::Http => Arc::new(HttpListingSource::from_config(config)?),
        SourceKind::File => Arc::new(FileListingSource::new(&config.path)),
    };
    Ok(source)
}
