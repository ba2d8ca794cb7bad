//! Author lookup client
//!
//! Queries the author directory service for the contact emails attached
//! to a paper. The directory sits in front of scraped journal metadata
//! and throttles aggressively, so requests are rate-limited client-side
//! to at most one per second.

use async_trait::async_trait;
use jetwatch_common::models::AuthorContact;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const USER_AGENT: &str = "jetwatch/0.1.0 (https://github.com/jetwatch/jetwatch)";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const RATE_LIMIT_MS: u64 = 1000;

/// Author lookup errors
#[derive(Debug, Error)]
pub enum LookupError {
    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// The directory has no author records for this paper
    #[error("No author records for paper: {0}")]
    AuthorsNotFound(String),

    /// The directory told us to back off
    #[error("Author directory rate limit exceeded")]
    RateLimitExceeded,

    /// Non-success response other than 404/503
    #[error("Author directory error {0}: {1}")]
    Api(u16, String),

    /// Response body did not match the expected shape
    #[error("Failed to parse author response: {0}")]
    Parse(String),
}

/// Client-side request throttle
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait until at least `min_interval` has passed since the last request
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Resolves author contact emails for a paper
#[async_trait]
pub trait AuthorLookup: Send + Sync {
    /// Look up the contact emails for `paper_id`
    async fn find_authors(&self, paper_id: &str) -> Result<AuthorContact, LookupError>;
}

/// HTTP client for the author directory service
pub struct AuthorsClient {
    http_client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl AuthorsClient {
    /// Create a new authors client
    pub fn new(base_url: impl Into<String>) -> Result<Self, LookupError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LookupError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            rate_limiter: RateLimiter::new(Duration::from_millis(RATE_LIMIT_MS)),
        })
    }
}

#[async_trait]
impl AuthorLookup for AuthorsClient {
    async fn find_authors(&self, paper_id: &str) -> Result<AuthorContact, LookupError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/authors/{}", self.base_url, paper_id);

        tracing::debug!(paper_id = %paper_id, url = %url, "Looking up author contacts");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| LookupError::Network(e.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            404 => return Err(LookupError::AuthorsNotFound(paper_id.to_string())),
            503 => return Err(LookupError::RateLimitExceeded),
            code if !status.is_success() => {
                let error_text = response.text().await.unwrap_or_default();
                return Err(LookupError::Api(code, error_text));
            }
            _ => {}
        }

        let contact = response
            .json::<AuthorContact>()
            .await
            .map_err(|e| LookupError::Parse(e.to_string()))?;

        tracing::debug!(
            paper_id = %paper_id,
            corresponding = contact.corresponding.len(),
            all = contact.all.len(),
            "Author contacts resolved"
        );

        Ok(contact)
    }
}
