//! Processing worker pool
//!
//! N tokio tasks poll the durable queue. Each worker claims one job at a
//! time, runs the pipeline, and acks the queue with the result. A sweeper
//! task periodically moves lease-expired jobs with no attempts remaining
//! into `failed`. Shutdown is cooperative: cancellation stops workers at
//! the next claim boundary; an in-flight job runs to completion first.

use chrono::Utc;
use jetwatch_common::db::queue::{self, LeasedJob};
use jetwatch_common::db::settings;
use jetwatch_common::events::{EventBus, MonitorEvent};
use jetwatch_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::pipeline::ProcessPipeline;

const SWEEP_INTERVAL_SECS: u64 = 30;

/// Pool of queue-polling processing workers
pub struct WorkerPool {
    pool: SqlitePool,
    pipeline: Arc<ProcessPipeline>,
    events: EventBus,
    worker_count: usize,
    poll_interval: Duration,
    lease_seconds: u64,
}

impl WorkerPool {
    pub fn new(
        pool: SqlitePool,
        pipeline: Arc<ProcessPipeline>,
        events: EventBus,
        worker_count: usize,
        poll_interval: Duration,
        lease_seconds: u64,
    ) -> Self {
        Self {
            pool,
            pipeline,
            events,
            worker_count,
            poll_interval,
            lease_seconds,
        }
    }

    /// Build a pool sized from the settings table
    pub async fn from_settings(
        pool: SqlitePool,
        pipeline: Arc<ProcessPipeline>,
        events: EventBus,
    ) -> Result<Self> {
        let worker_count = settings::get_worker_count(&pool).await?;
        let poll_interval =
            Duration::from_millis(settings::get_worker_poll_interval_ms(&pool).await?);
        let lease_seconds = settings::get_job_lease_seconds(&pool).await?;

        Ok(Self::new(
            pool,
            pipeline,
            events,
            worker_count,
            poll_interval,
            lease_seconds,
        ))
    }

    /// Run the workers and the lease sweeper until cancelled
    ///
    /// Resolves once every task has stopped.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            workers = self.worker_count,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            lease_seconds = self.lease_seconds,
            "Starting worker pool"
        );

        let mut handles = Vec::with_capacity(self.worker_count + 1);

        for worker_id in 0..self.worker_count {
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                self.pool.clone(),
                Arc::clone(&self.pipeline),
                self.events.clone(),
                self.poll_interval,
                self.lease_seconds,
                cancel.clone(),
            )));
        }

        handles.push(tokio::spawn(sweeper_loop(self.pool.clone(), cancel.clone())));

        for handle in handles {
            let _ = handle.await;
        }

        tracing::info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    pool: SqlitePool,
    pipeline: Arc<ProcessPipeline>,
    events: EventBus,
    poll_interval: Duration,
    lease_seconds: u64,
    cancel: CancellationToken,
) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match queue::claim(&pool, lease_seconds).await {
            Ok(Some(job)) => {
                run_one(worker_id, &pool, &pipeline, &events, job).await;
            }
            Ok(None) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(e) => {
                tracing::error!(worker_id, error = %e, "Job claim failed");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }

    tracing::debug!(worker_id, "Worker stopped");
}

async fn run_one(
    worker_id: usize,
    pool: &SqlitePool,
    pipeline: &ProcessPipeline,
    events: &EventBus,
    job: LeasedJob,
) {
    tracing::info!(
        worker_id,
        job_id = %job.job_id,
        paper_id = %job.paper_id,
        attempt = job.attempt,
        "Processing job"
    );
    events.emit_lossy(MonitorEvent::JobStarted {
        job_id: job.job_id,
        paper_id: job.paper_id.clone(),
        attempt: job.attempt,
        timestamp: Utc::now(),
    });

    match pipeline.process(&job.payload).await {
        Ok(outcome) => {
            match queue::complete(pool, job.job_id).await {
                Ok(true) => {}
                Ok(false) => {
                    // Lease expired mid-run and the job moved on; the
                    // merges are idempotent so the late result is harmless
                    tracing::warn!(
                        worker_id,
                        job_id = %job.job_id,
                        "Job no longer running at completion"
                    );
                }
                Err(e) => {
                    tracing::error!(worker_id, job_id = %job.job_id, error = %e, "Completion ack failed");
                }
            }
            events.emit_lossy(MonitorEvent::JobCompleted {
                job_id: job.job_id,
                paper_id: job.paper_id.clone(),
                status: outcome.status,
                timestamp: Utc::now(),
            });
            tracing::info!(
                worker_id,
                job_id = %job.job_id,
                paper_id = %job.paper_id,
                status = outcome.status.as_str(),
                "Job complete"
            );
        }
        Err(e) => {
            let error_text = e.to_string();
            match queue::fail(pool, job.job_id, &error_text).await {
                Ok(Some(fail)) => {
                    if fail.will_retry {
                        tracing::warn!(
                            worker_id,
                            job_id = %job.job_id,
                            paper_id = %job.paper_id,
                            attempt = job.attempt,
                            error = %error_text,
                            "Job failed; queued for redelivery"
                        );
                    } else {
                        tracing::error!(
                            worker_id,
                            job_id = %job.job_id,
                            paper_id = %job.paper_id,
                            attempt = job.attempt,
                            error = %error_text,
                            "Job failed permanently; manual triage required"
                        );
                    }
                    events.emit_lossy(MonitorEvent::JobFailed {
                        job_id: job.job_id,
                        paper_id: job.paper_id.clone(),
                        attempt: job.attempt,
                        error: error_text,
                        will_retry: fail.will_retry,
                        timestamp: Utc::now(),
                    });
                }
                Ok(None) => {
                    tracing::warn!(
                        worker_id,
                        job_id = %job.job_id,
                        "Job no longer running when failure was recorded"
                    );
                }
                Err(db_e) => {
                    tracing::error!(worker_id, job_id = %job.job_id, error = %db_e, "Failure ack failed");
                }
            }
        }
    }
}

/// Periodically fail lease-expired jobs that are out of attempts
async fn sweeper_loop(pool: SqlitePool, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(SWEEP_INTERVAL_SECS)) => {}
        }

        match queue::release_expired(&pool).await {
            Ok(0) => {}
            Ok(n) => tracing::warn!(count = n, "Expired jobs moved to failed"),
            Err(e) => tracing::error!(error = %e, "Expired-lease sweep failed"),
        }
    }
}
