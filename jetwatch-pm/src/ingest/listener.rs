//! Announcement stream listener
//!
//! Long-running consumer of the live announcement stream. Announcements
//! are ingested one at a time in arrival order; there is no concurrent
//! intake. Stream interruptions never stop the listener: it reconnects
//! with exponential backoff (capped) and only exits on shutdown.

use chrono::Utc;
use futures::StreamExt;
use jetwatch_common::events::{EventBus, MonitorEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::services::{AnnouncementSource, AnnouncementStream, FeedError};

use super::intake::IntakeHandler;

const INITIAL_BACKOFF_SECS: u64 = 1;

/// Live-stream ingestion task
pub struct EventListener {
    source: Arc<dyn AnnouncementSource>,
    intake: IntakeHandler,
    events: EventBus,
    backoff_max: Duration,
}

impl EventListener {
    pub fn new(
        source: Arc<dyn AnnouncementSource>,
        intake: IntakeHandler,
        events: EventBus,
        backoff_max: Duration,
    ) -> Self {
        Self {
            source,
            intake,
            events,
            backoff_max,
        }
    }

    /// Consume the stream until cancelled, reconnecting on every failure
    pub async fn run(&self, cancel: CancellationToken) {
        let mut backoff = Duration::from_secs(INITIAL_BACKOFF_SECS);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let interruption = match self.source.stream().await {
                Ok(mut stream) => {
                    tracing::info!("Announcement stream connected");
                    self.events.emit_lossy(MonitorEvent::StreamConnected {
                        timestamp: Utc::now(),
                    });
                    backoff = Duration::from_secs(INITIAL_BACKOFF_SECS);

                    match self.consume(&mut stream, &cancel).await {
                        Some(error) => error,
                        None => break,
                    }
                }
                Err(e) => e.to_string(),
            };

            tracing::warn!(
                error = %interruption,
                backoff_seconds = backoff.as_secs(),
                "Announcement stream interrupted; reconnecting"
            );
            self.events.emit_lossy(MonitorEvent::StreamInterrupted {
                error: interruption,
                backoff_seconds: backoff.as_secs(),
                timestamp: Utc::now(),
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.backoff_max);
        }

        tracing::info!("Event listener stopped");
    }

    /// Drain one connected stream
    ///
    /// Returns the interruption reason, or `None` when cancelled.
    async fn consume(
        &self,
        stream: &mut AnnouncementStream,
        cancel: &CancellationToken,
    ) -> Option<String> {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(announcement)) => {
                    if let Err(e) = self.intake.ingest(&announcement).await {
                        tracing::error!(
                            source_id = %announcement.id,
                            error = %e,
                            "Intake failed; announcement skipped"
                        );
                    }
                }
                Some(Err(FeedError::MalformedFrame(e))) => {
                    tracing::warn!(error = %e, "Skipping malformed stream frame");
                }
                Some(Err(e)) => return Some(e.to_string()),
                None => return Some("stream ended".to_string()),
            }
        }
    }
}
