//! Paper processing pipeline
//!
//! Runs one job end to end: download the paper into a scoped workspace,
//! classify its figures, persist the verdict, and for flagged papers
//! enrich the record with author contacts. Results are persisted as each
//! step lands, so an enrichment failure never discards a computed verdict.
//! Every step is idempotent; re-running a job with the same external
//! inputs converges to the same record state.

use chrono::Utc;
use jetwatch_common::db::papers;
use jetwatch_common::events::{EventBus, MonitorEvent};
use jetwatch_common::models::{PaperJob, ParseStatus, Verdict};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

use crate::services::{
    AuthorLookup, ColormapDetector, DetectError, FetchError, LookupError, PaperFetcher,
};

/// Pipeline errors; every variant surfaces to the queue's retry path
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Could not create the scoped download workspace
    #[error("Workspace error: {0}")]
    Workspace(std::io::Error),

    /// Download step failed
    #[error("Download failed: {0}")]
    Download(#[from] FetchError),

    /// Analysis step failed
    #[error("Analysis failed: {0}")]
    Analysis(#[from] DetectError),

    /// Author lookup failed after the verdict was already persisted
    #[error("Author lookup failed: {0}")]
    Enrichment(#[from] LookupError),

    /// Record store rejected a merge
    #[error("Persistence failed: {0}")]
    Persistence(#[from] jetwatch_common::Error),
}

/// Result of a successful pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub paper_id: String,
    /// Verdict persisted on the record
    pub status: ParseStatus,
}

/// The per-job processing pipeline
///
/// Collaborators are injected as trait objects so tests can run the
/// pipeline against scripted stand-ins.
pub struct ProcessPipeline {
    pool: SqlitePool,
    fetcher: Arc<dyn PaperFetcher>,
    detector: Arc<dyn ColormapDetector>,
    authors: Arc<dyn AuthorLookup>,
    events: EventBus,
}

impl ProcessPipeline {
    pub fn new(
        pool: SqlitePool,
        fetcher: Arc<dyn PaperFetcher>,
        detector: Arc<dyn ColormapDetector>,
        authors: Arc<dyn AuthorLookup>,
        events: EventBus,
    ) -> Self {
        Self {
            pool,
            fetcher,
            detector,
            authors,
            events,
        }
    }

    /// Process one paper job to completion
    ///
    /// Steps: download, analyze, persist the verdict, then enrich flagged
    /// papers with author contacts. The workspace directory is removed on
    /// every exit path when the handle drops.
    pub async fn process(&self, job: &PaperJob) -> Result<PipelineOutcome, PipelineError> {
        let paper_id = &job.paper_id;

        let workspace = tempfile::Builder::new()
            .prefix(&format!("jetwatch-{}-", paper_id))
            .tempdir()
            .map_err(PipelineError::Workspace)?;

        tracing::debug!(
            paper_id = %paper_id,
            workspace = %workspace.path().display(),
            "Downloading paper"
        );
        let pdf_path = self.fetcher.download(paper_id, workspace.path()).await?;

        tracing::debug!(paper_id = %paper_id, "Analyzing figures");
        let detection = self.detector.analyze(&pdf_path).await?;
        let status = ParseStatus::from(detection.verdict);

        // Verdict lands before enrichment so a lookup failure cannot
        // discard it; the retry re-runs from the top and converges.
        papers::merge_analysis(&self.pool, paper_id, detection.verdict, &detection.data).await?;
        tracing::info!(paper_id = %paper_id, status = status.as_str(), "Analysis persisted");

        if detection.verdict == Verdict::Flagged {
            self.events.emit_lossy(MonitorEvent::PaperFlagged {
                paper_id: paper_id.clone(),
                timestamp: Utc::now(),
            });

            tracing::debug!(paper_id = %paper_id, "Looking up author contacts");
            let contact = self.authors.find_authors(paper_id).await?;
            papers::merge_author_contact(&self.pool, paper_id, &contact).await?;
            tracing::info!(
                paper_id = %paper_id,
                corresponding = contact.corresponding.len(),
                all = contact.all.len(),
                "Author contacts persisted"
            );
        }

        Ok(PipelineOutcome {
            paper_id: paper_id.clone(),
            status,
        })
    }
}
