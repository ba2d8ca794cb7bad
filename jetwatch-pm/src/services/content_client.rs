//! Paper content client
//!
//! Downloads the full-text PDF for a paper from the preprint content
//! server. Downloads land in a caller-provided directory so the pipeline
//! can scope them to a single job and clean up wholesale.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "jetwatch/0.1.0 (https://github.com/jetwatch/jetwatch)";
const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Content client errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// The server has no document for this paper id
    #[error("Paper not found: {0}")]
    PaperNotFound(String),

    /// Non-success response other than 404
    #[error("Content API error {0}: {1}")]
    Api(u16, String),

    /// Local filesystem error while writing the download
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetches paper documents for analysis
#[async_trait]
pub trait PaperFetcher: Send + Sync {
    /// Download the full-text PDF for `paper_id` into `dest_dir`
    ///
    /// Returns the path of the written file.
    async fn download(&self, paper_id: &str, dest_dir: &Path) -> Result<PathBuf, FetchError>;
}

/// HTTP client for the preprint content server
pub struct ContentClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ContentClient {
    /// Create a new content client
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl PaperFetcher for ContentClient {
    async fn download(&self, paper_id: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        let url = format!("{}/{}.full.pdf", self.base_url, paper_id);

        tracing::debug!(paper_id = %paper_id, url = %url, "Downloading paper PDF");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(FetchError::PaperNotFound(paper_id.to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FetchError::Api(status.as_u16(), error_text));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let dest_path = dest_dir.join(format!("{}.full.pdf", paper_id));
        tokio::fs::write(&dest_path, &body).await?;

        tracing::debug!(
            paper_id = %paper_id,
            path = %dest_path.display(),
            bytes = body.len(),
            "Paper PDF downloaded"
        );

        Ok(dest_path)
    }
}
