//! Retrieval of model artifacts

use crate::model_loader::ModelSource;
use async_trait::async_trait;
use bytes::Bytes;
use leafscan_core::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Fetches the raw bytes of a model artifact
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Retrieve the artifact.
    ///
    /// Transport failures and non-success responses are `Error::Retrieval`.
    async fn fetch(&self) -> Result<Bytes>;

    /// Where the artifact is fetched from, for logs
    fn location(&self) -> String;
}

/// Downloads the artifact with a single HTTP GET
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    /// Create a fetcher with no request timeout
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, None)
    }

    /// Create a fetcher with an optional overall request timeout
    pub fn with_timeout(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let url = url.into();
        reqwest::Url::parse(&url)
            .map_err(|e| Error::config(format!("Invalid model URL '{}': {}", url, e)))?;

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("leafscan/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self) -> Result<Bytes> {
        tracing::info!("Downloading model artifact from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::retrieval(format!("Request to {} failed: {}", self.url, e)))?
            .error_for_status()
            .map_err(|e| Error::retrieval(format!("Download from {} failed: {}", self.url, e)))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::retrieval(format!("Failed to read body from {}: {}", self.url, e)))?;

        tracing::info!("Downloaded {} bytes", body.len());
        Ok(body)
    }

    fn location(&self) -> String {
        self.url.clone()
    }
}

/// Reads the artifact from the local filesystem
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ArtifactFetcher for FileFetcher {
    async fn fetch(&self) -> Result<Bytes> {
        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::retrieval(format!(
                "Failed to read model file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Bytes::from(data))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Build the fetcher matching a configured source
pub fn fetcher_for_source(
    source: &ModelSource,
    timeout: Option<Duration>,
) -> Result<Arc<dyn ArtifactFetcher>> {
    match source {
        ModelSource::Url { url, .. } => Ok(Arc::new(HttpFetcher::with_timeout(url.clone(), timeout)?)),
        ModelSource::Local { path, .. } => Ok(Arc::new(FileFetcher::new(path.clone()))),
    }
}
