//! Announcement intake
//!
//! Turns one raw announcement into a paper record plus a processing job.
//! The paper id comes from the first embedded URL's last path segment; the
//! title is the text before the first link, falling back to the ASCII-only
//! body when the announcement has unusual formatting. Record upsert and
//! job dispatch are deliberately two steps, not one transaction; a crash
//! between them is healed by backfill re-ingestion.

use chrono::Utc;
use jetwatch_common::db::papers;
use jetwatch_common::events::{EventBus, MonitorEvent};
use jetwatch_common::models::{Announcement, PaperJob};
use jetwatch_common::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::SqlitePool;
use std::sync::Arc;
use url::Url;

use crate::worker::{DispatchOutcome, JobDispatch};

/// Title is everything before the first whitespace-then-`http` boundary
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(.*?)\shttp").expect("title pattern is valid"));

/// Why intake rejected an announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The announcement carried no embedded URLs
    NoEmbeddedUrls,
    /// The first embedded URL had no usable last path segment
    NoPaperId,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::NoEmbeddedUrls => "no embedded URLs",
            DiscardReason::NoPaperId => "no paper id in embedded URL",
        }
    }
}

/// Result of ingesting one announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A record was upserted and a job dispatched
    Ingested { dispatch: DispatchOutcome },
    /// The announcement was malformed and dropped
    Discarded { reason: DiscardReason },
}

/// Serialized intake path shared by the listener and the backfill poller
pub struct IntakeHandler {
    pool: SqlitePool,
    dispatch: Arc<dyn JobDispatch>,
    events: EventBus,
}

impl IntakeHandler {
    pub fn new(pool: SqlitePool, dispatch: Arc<dyn JobDispatch>, events: EventBus) -> Self {
        Self {
            pool,
            dispatch,
            events,
        }
    }

    /// Ingest one announcement: parse, upsert the record, dispatch a job
    ///
    /// Malformed announcements are logged and reported as `Discarded`, not
    /// errors; errors are reserved for store and dispatch failures.
    pub async fn ingest(&self, announcement: &Announcement) -> Result<IngestOutcome> {
        let paper_id = match extract_paper_id(announcement) {
            Ok(id) => id,
            Err(reason) => {
                tracing::warn!(
                    source_id = %announcement.id,
                    reason = reason.as_str(),
                    "Announcement discarded"
                );
                self.events.emit_lossy(MonitorEvent::AnnouncementDiscarded {
                    source_id: announcement.id.clone(),
                    reason: reason.as_str().to_string(),
                    timestamp: Utc::now(),
                });
                return Ok(IngestOutcome::Discarded { reason });
            }
        };

        let title = extract_title(&announcement.full_text);
        let snapshot = PaperJob {
            paper_id: paper_id.clone(),
            created: announcement.created_at,
            title: title.clone(),
        };

        papers::upsert_intake(&self.pool, &snapshot).await?;
        tracing::info!(paper_id = %paper_id, title = %title, "Paper ingested");
        self.events.emit_lossy(MonitorEvent::PaperIngested {
            paper_id: paper_id.clone(),
            title,
            timestamp: Utc::now(),
        });

        let dispatch = self.dispatch.dispatch(&snapshot).await?;

        Ok(IngestOutcome::Ingested { dispatch })
    }
}

/// Paper id = last non-empty path segment of the first embedded URL
fn extract_paper_id(announcement: &Announcement) -> std::result::Result<String, DiscardReason> {
    let first_url = announcement
        .embedded_urls
        .first()
        .ok_or(DiscardReason::NoEmbeddedUrls)?;

    let parsed = Url::parse(first_url).map_err(|_| DiscardReason::NoPaperId)?;

    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .ok_or(DiscardReason::NoPaperId)?;

    Ok(segment.to_string())
}

/// Best-effort title from the announcement body
///
/// The text before the first link, or the whole body with non-ASCII
/// characters stripped when no link boundary matches.
fn extract_title(full_text: &str) -> String {
    if let Some(captures) = TITLE_RE.captures(full_text) {
        if let Some(title) = captures.get(1) {
            return title.as_str().trim().to_string();
        }
    }

    full_text
        .chars()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .trim()
        .to_string()
}
