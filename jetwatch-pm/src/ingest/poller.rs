//! Backfill poller
//!
//! One-shot catch-up: pull the most recent announcements from the source
//! and run each through the same intake path as the live stream, in the
//! order the source returned them. Re-ingesting already-known papers is
//! harmless (intake is idempotent and enqueue deduplicates), which makes
//! backfill the recovery route for announcements missed during downtime
//! and for papers whose job was lost between upsert and enqueue.

use jetwatch_common::{Error, Result};
use std::sync::Arc;

use crate::services::AnnouncementSource;
use crate::worker::DispatchOutcome;

use super::intake::{IngestOutcome, IntakeHandler};

/// Counts from one backfill run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    /// Announcements returned by the source
    pub fetched: usize,
    /// Announcements that produced a record and a dispatch
    pub ingested: usize,
    /// Malformed announcements dropped at intake
    pub discarded: usize,
    /// Dispatches that folded into an already-active job
    pub deduplicated: usize,
}

/// Timeline-based catch-up ingestion
pub struct BackfillPoller {
    source: Arc<dyn AnnouncementSource>,
    intake: IntakeHandler,
}

impl BackfillPoller {
    pub fn new(source: Arc<dyn AnnouncementSource>, intake: IntakeHandler) -> Self {
        Self { source, intake }
    }

    /// Fetch up to `limit` recent announcements and ingest each one
    pub async fn run(&self, limit: u32) -> Result<BackfillSummary> {
        tracing::info!(limit, "Starting backfill");

        let announcements = self
            .source
            .recent(limit)
            .await
            .map_err(|e| Error::Internal(format!("Timeline fetch failed: {}", e)))?;

        let mut summary = BackfillSummary {
            fetched: announcements.len(),
            ..Default::default()
        };

        for announcement in &announcements {
            match self.intake.ingest(announcement).await? {
                IngestOutcome::Ingested { dispatch } => {
                    summary.ingested += 1;
                    if matches!(dispatch, DispatchOutcome::Deduplicated { .. }) {
                        summary.deduplicated += 1;
                    }
                }
                IngestOutcome::Discarded { .. } => summary.discarded += 1,
            }
        }

        tracing::info!(
            fetched = summary.fetched,
            ingested = summary.ingested,
            discarded = summary.discarded,
            deduplicated = summary.deduplicated,
            "Backfill complete"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use jetwatch_common::db::init::init_memory_database;
    use jetwatch_common::db::queue::queue_depth;
    use jetwatch_common::events::EventBus;
    use jetwatch_common::models::Announcement;

    use crate::services::{AnnouncementStream, FeedError};
    use crate::worker::QueuedDispatch;

    struct FixedTimeline {
        announcements: Vec<Announcement>,
    }

    #[async_trait]
    impl AnnouncementSource for FixedTimeline {
        async fn stream(&self) -> std::result::Result<AnnouncementStream, FeedError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn recent(
            &self,
            limit: u32,
        ) -> std::result::Result<Vec<Announcement>, FeedError> {
            Ok(self
                .announcements
                .iter()
                .take(limit as usize)
                .cloned()
                .collect())
        }
    }

    fn announcement(paper_id: &str, urls: &[&str]) -> Announcement {
        Announcement {
            id: format!("src-{}", paper_id),
            created_at: Utc::now(),
            full_text: format!("Title of {} {}", paper_id, urls.first().unwrap_or(&"")),
            embedded_urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn backfill_counts_ingests_discards_and_dedups() {
        let pool = init_memory_database().await.unwrap();
        let events = EventBus::new(64);
        let dispatch = Arc::new(QueuedDispatch::new(pool.clone(), 2, events.clone()));
        let intake = IntakeHandler::new(pool.clone(), dispatch, events);

        let source = FixedTimeline {
            announcements: vec![
                announcement("aaa1", &["http://biorxiv.org/content/aaa1"]),
                announcement("bad0", &[]),
                // Same paper twice: second ingest refreshes, dedups
                announcement("aaa1", &["http://biorxiv.org/content/aaa1"]),
                announcement("ccc3", &["http://biorxiv.org/content/ccc3"]),
            ],
        };
        let poller = BackfillPoller::new(Arc::new(source), intake);

        let summary = poller.run(10).await.unwrap();
        assert_eq!(summary.fetched, 4);
        assert_eq!(summary.ingested, 3);
        assert_eq!(summary.discarded, 1);
        assert_eq!(summary.deduplicated, 1);

        let depth = queue_depth(&pool).await.unwrap();
        assert_eq!(depth.queued, 2);
    }

    #[tokio::test]
    async fn backfill_respects_limit() {
        let pool = init_memory_database().await.unwrap();
        let events = EventBus::new(64);
        let dispatch = Arc::new(QueuedDispatch::new(pool.clone(), 2, events.clone()));
        let intake = IntakeHandler::new(pool.clone(), dispatch, events);

        let source = FixedTimeline {
            announcements: vec![
                announcement("aaa1", &["http://biorxiv.org/content/aaa1"]),
                announcement("bbb2", &["http://biorxiv.org/content/bbb2"]),
                announcement("ccc3", &["http://biorxiv.org/content/ccc3"]),
            ],
        };
        let poller = BackfillPoller::new(Arc::new(source), intake);

        let summary = poller.run(2).await.unwrap();
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.ingested, 2);
    }
}
