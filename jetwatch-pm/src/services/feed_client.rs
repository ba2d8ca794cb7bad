//! Announcement feed client
//!
//! Consumes the announcement relay over HTTP: a long-lived NDJSON stream
//! endpoint for live monitoring and a JSON timeline endpoint for backfill.
//! The relay's own upstream protocol (and its credentials) are not our
//! concern; we pass through a bearer token when one is configured.

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use jetwatch_common::models::Announcement;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "jetwatch/0.1.0 (https://github.com/jetwatch/jetwatch)";
const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Feed client errors
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport-level failure; the stream is dead and must be reopened
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success response from the feed relay
    #[error("Feed API error {0}: {1}")]
    Api(u16, String),

    /// One frame on the stream could not be decoded; the stream goes on
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

/// Live announcement stream; `Err` items are frame- or transport-level
/// errors, a transport error is always the final item
pub type AnnouncementStream =
    Pin<Box<dyn Stream<Item = Result<Announcement, FeedError>> + Send>>;

/// Source of paper announcements
///
/// The production implementation is [`FeedClient`]; tests substitute
/// scripted sources.
#[async_trait]
pub trait AnnouncementSource: Send + Sync {
    /// Open the live stream of announcements
    async fn stream(&self) -> Result<AnnouncementStream, FeedError>;

    /// Fetch the most recent announcements, newest first, at most `limit`
    async fn recent(&self, limit: u32) -> Result<Vec<Announcement>, FeedError>;
}

/// HTTP announcement feed client
pub struct FeedClient {
    http_client: reqwest::Client,
    base_url: String,
    account: String,
    bearer_token: Option<String>,
}

impl FeedClient {
    /// Create a new feed client
    ///
    /// No total request timeout is set on the client; it would sever the
    /// long-lived stream. Bounded calls apply their own timeout.
    pub fn new(
        base_url: impl Into<String>,
        account: impl Into<String>,
        bearer_token: Option<String>,
    ) -> Result<Self, FeedError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| FeedError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            account: account.into(),
            bearer_token,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl AnnouncementSource for FeedClient {
    async fn stream(&self) -> Result<AnnouncementStream, FeedError> {
        let url = format!("{}/stream", self.base_url);

        tracing::debug!(url = %url, account = %self.account, "Opening announcement stream");

        let response = self
            .authorize(self.http_client.get(&url).query(&[("follow", &self.account)]))
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FeedError::Api(status.as_u16(), error_text));
        }

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut buf: Vec<u8> = Vec::new();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        buf.extend_from_slice(&chunk);
                        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                            let line: Vec<u8> = buf.drain(..=pos).collect();
                            if let Some(item) = decode_frame(&line) {
                                yield item;
                            }
                        }
                    }
                    Err(e) => {
                        // Transport failure ends the stream; the caller reconnects
                        yield Err(FeedError::Network(e.to_string()));
                        return;
                    }
                }
            }

            // Flush a trailing frame without a newline terminator
            if let Some(item) = decode_frame(&buf) {
                yield item;
            }
        };

        Ok(Box::pin(stream))
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Announcement>, FeedError> {
        let url = format!("{}/timeline", self.base_url);

        tracing::debug!(url = %url, account = %self.account, limit, "Fetching recent announcements");

        let response = self
            .authorize(self.http_client.get(&url).query(&[
                ("screen_name", self.account.as_str()),
                ("count", &limit.to_string()),
            ]))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FeedError::Api(status.as_u16(), error_text));
        }

        response
            .json::<Vec<Announcement>>()
            .await
            .map_err(|e| FeedError::MalformedFrame(e.to_string()))
    }
}

/// Decode one NDJSON frame; empty keep-alive lines yield nothing
fn decode_frame(line: &[u8]) -> Option<Result<Announcement, FeedError>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match serde_json::from_str::<Announcement>(text) {
        Ok(announcement) => Some(Ok(announcement)),
        Err(e) => Some(Err(FeedError::MalformedFrame(e.to_string()))),
    }
}
