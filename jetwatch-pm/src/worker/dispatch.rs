//! Job dispatch strategies
//!
//! Intake hands finished snapshots to a [`JobDispatch`]. Production
//! enqueues into the durable queue for the worker pool; tests and one-shot
//! tools can instead run the pipeline synchronously at the dispatch point.

use async_trait::async_trait;
use chrono::Utc;
use jetwatch_common::db::queue::{self, EnqueueOutcome};
use jetwatch_common::events::{EventBus, MonitorEvent};
use jetwatch_common::models::{PaperJob, ParseStatus};
use jetwatch_common::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use super::pipeline::ProcessPipeline;

/// What happened to a dispatched job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Job persisted to the durable queue
    Enqueued { job_id: Uuid },
    /// An active job already covered the paper; its payload was refreshed
    Deduplicated { job_id: Uuid },
    /// Pipeline ran synchronously at the dispatch point; no queue row
    Completed { status: ParseStatus },
}

/// Strategy seam between intake and processing
#[async_trait]
pub trait JobDispatch: Send + Sync {
    /// Hand one intake snapshot over for processing
    async fn dispatch(&self, job: &PaperJob) -> Result<DispatchOutcome>;
}

/// Production dispatch: enqueue into the durable queue
pub struct QueuedDispatch {
    pool: SqlitePool,
    max_attempts: u32,
    events: EventBus,
}

impl QueuedDispatch {
    pub fn new(pool: SqlitePool, max_attempts: u32, events: EventBus) -> Self {
        Self {
            pool,
            max_attempts,
            events,
        }
    }
}

#[async_trait]
impl JobDispatch for QueuedDispatch {
    async fn dispatch(&self, job: &PaperJob) -> Result<DispatchOutcome> {
        match queue::enqueue(&self.pool, job, self.max_attempts).await? {
            EnqueueOutcome::Enqueued { job_id } => {
                tracing::debug!(paper_id = %job.paper_id, job_id = %job_id, "Job enqueued");
                self.events.emit_lossy(MonitorEvent::JobEnqueued {
                    job_id,
                    paper_id: job.paper_id.clone(),
                    timestamp: Utc::now(),
                });
                Ok(DispatchOutcome::Enqueued { job_id })
            }
            EnqueueOutcome::Deduplicated { job_id } => {
                tracing::debug!(
                    paper_id = %job.paper_id,
                    job_id = %job_id,
                    "Active job already queued; payload refreshed"
                );
                self.events.emit_lossy(MonitorEvent::JobDeduplicated {
                    job_id,
                    paper_id: job.paper_id.clone(),
                    timestamp: Utc::now(),
                });
                Ok(DispatchOutcome::Deduplicated { job_id })
            }
        }
    }
}

/// Synchronous dispatch: run the pipeline in the calling task
///
/// Used by test harnesses and one-shot tools that want intake and
/// processing to finish together. Writes no queue row, so there is no
/// retry on failure.
pub struct InlineDispatch {
    pipeline: Arc<ProcessPipeline>,
}

impl InlineDispatch {
    pub fn new(pipeline: Arc<ProcessPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobDispatch for InlineDispatch {
    async fn dispatch(&self, job: &PaperJob) -> Result<DispatchOutcome> {
        let outcome = self
            .pipeline
            .process(job)
            .await
            .map_err(|e| Error::Internal(format!("Inline processing failed: {}", e)))?;

        Ok(DispatchOutcome::Completed {
            status: outcome.status,
        })
    }
}
