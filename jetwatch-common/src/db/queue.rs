//! Durable job queue
//!
//! SQLite-backed queue with at-least-once delivery. Claims take a lease;
//! a worker that outlives its lease is presumed dead and the job becomes
//! claimable again until attempts are exhausted. Acks are guarded on
//! `state = 'running'`, so a late ack after lease loss is a no-op; the
//! processing pipeline is idempotent, so double delivery converges.
//!
//! Delivery order is FIFO by enqueue time among eligible jobs.

use crate::error::{Error, Result};
use crate::models::{JobState, PaperJob};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Result of an enqueue call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job row was created
    Enqueued { job_id: Uuid },
    /// An active job for the paper already existed; its payload was
    /// refreshed to the newest intake snapshot
    Deduplicated { job_id: Uuid },
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueOutcome::Enqueued { job_id } => *job_id,
            EnqueueOutcome::Deduplicated { job_id } => *job_id,
        }
    }
}

/// A claimed job, exclusive to one worker until the lease expires
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub job_id: Uuid,
    pub paper_id: String,
    pub payload: PaperJob,
    /// Delivery attempt number (1-based)
    pub attempt: u32,
    pub lease_expires_at: DateTime<Utc>,
}

/// Outcome of failing a running job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailOutcome {
    /// True when the job went back to `queued` for redelivery
    pub will_retry: bool,
}

/// Queue depth per state, for the status view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub queued: i64,
    pub running: i64,
    pub done: i64,
    pub failed: i64,
}

/// One job row as shown in the status view
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub paper_id: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Enqueue a processing job for a paper
///
/// At most one queued/running job exists per paper. When one does, no new
/// row is created; the active job's payload is refreshed instead and the
/// call reports [`EnqueueOutcome::Deduplicated`]. Jobs in `done`/`failed`
/// states never block a new enqueue.
pub async fn enqueue(
    pool: &SqlitePool,
    snapshot: &PaperJob,
    max_attempts: u32,
) -> Result<EnqueueOutcome> {
    let job_id = Uuid::new_v4();
    let payload = serde_json::to_string(snapshot)?;

    // Upsert against the partial unique index on active jobs; the WHERE
    // clause must match the index definition exactly.
    let returned: String = sqlx::query_scalar(
        r#"
        INSERT INTO jobs (job_id, paper_id, payload, state, attempts, max_attempts, enqueued_at)
        VALUES (?, ?, ?, 'queued', 0, ?, ?)
        ON CONFLICT(paper_id) WHERE state IN ('queued', 'running')
        DO UPDATE SET payload = excluded.payload
        RETURNING job_id
        "#,
    )
    .bind(job_id.to_string())
    .bind(&snapshot.paper_id)
    .bind(&payload)
    .bind(max_attempts)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    let returned_id = parse_job_id(&returned)?;
    if returned_id == job_id {
        Ok(EnqueueOutcome::Enqueued { job_id })
    } else {
        Ok(EnqueueOutcome::Deduplicated { job_id: returned_id })
    }
}

/// Claim the oldest eligible job, if any
///
/// Eligible means `queued`, or `running` past its lease with attempts
/// remaining. The claim is a single UPDATE, so concurrent workers can
/// never take the same row. Returns `None` when nothing is claimable.
pub async fn claim(pool: &SqlitePool, lease_seconds: u64) -> Result<Option<LeasedJob>> {
    let now = Utc::now();
    let lease_expires_at = now + Duration::seconds(lease_seconds as i64);

    let row = sqlx::query(
        r#"
        UPDATE jobs
        SET state = 'running',
            attempts = attempts + 1,
            started_at = ?,
            lease_expires_at = ?
        WHERE job_id = (
            SELECT job_id FROM jobs
            WHERE state = 'queued'
               OR (state = 'running' AND lease_expires_at < ? AND attempts < max_attempts)
            ORDER BY enqueued_at
            LIMIT 1
        )
        RETURNING job_id, paper_id, payload, attempts
        "#,
    )
    .bind(now)
    .bind(lease_expires_at)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let payload: PaperJob = serde_json::from_str(&row.get::<String, _>("payload"))?;

    Ok(Some(LeasedJob {
        job_id: parse_job_id(&row.get::<String, _>("job_id"))?,
        paper_id: row.get("paper_id"),
        payload,
        attempt: row.get::<i64, _>("attempts") as u32,
        lease_expires_at,
    }))
}

/// Mark a running job done
///
/// Returns false when the job was no longer `running` (lease lost and the
/// job was already resolved elsewhere).
pub async fn complete(pool: &SqlitePool, job_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET state = 'done', finished_at = ?, lease_expires_at = NULL
        WHERE job_id = ? AND state = 'running'
        "#,
    )
    .bind(Utc::now())
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record a failure on a running job
///
/// With attempts remaining the job returns to `queued` for redelivery;
/// otherwise it lands in `failed` for manual triage. Returns `None` when
/// the job was no longer `running`.
pub async fn fail(pool: &SqlitePool, job_id: Uuid, error: &str) -> Result<Option<FailOutcome>> {
    let returned: Option<String> = sqlx::query_scalar(
        r#"
        UPDATE jobs
        SET state = CASE WHEN attempts < max_attempts THEN 'queued' ELSE 'failed' END,
            finished_at = CASE WHEN attempts < max_attempts THEN NULL ELSE ? END,
            lease_expires_at = NULL,
            last_error = ?
        WHERE job_id = ? AND state = 'running'
        RETURNING state
        "#,
    )
    .bind(Utc::now())
    .bind(error)
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?;

    match returned.as_deref() {
        Some("queued") => Ok(Some(FailOutcome { will_retry: true })),
        Some("failed") => Ok(Some(FailOutcome { will_retry: false })),
        Some(other) => Err(Error::Internal(format!(
            "unexpected job state after fail: {}",
            other
        ))),
        None => Ok(None),
    }
}

/// Sweep expired running jobs with no attempts remaining into `failed`
///
/// Expired jobs with attempts remaining are not touched here; `claim`
/// redelivers them directly. Returns the number of jobs swept.
pub async fn release_expired(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET state = 'failed', finished_at = ?, lease_expires_at = NULL,
            last_error = COALESCE(last_error, 'lease expired')
        WHERE state = 'running' AND lease_expires_at < ? AND attempts >= max_attempts
        "#,
    )
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Count jobs per state
pub async fn queue_depth(pool: &SqlitePool) -> Result<QueueDepth> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
            .fetch_all(pool)
            .await?;

    let mut depth = QueueDepth::default();
    for (state, count) in rows {
        match JobState::parse(&state) {
            Some(JobState::Queued) => depth.queued = count,
            Some(JobState::Running) => depth.running = count,
            Some(JobState::Done) => depth.done = count,
            Some(JobState::Failed) => depth.failed = count,
            None => {
                return Err(Error::Internal(format!(
                    "unknown state in jobs table: {}",
                    state
                )))
            }
        }
    }

    Ok(depth)
}

/// List jobs for the status view, optionally filtered by state
pub async fn list_jobs(
    pool: &SqlitePool,
    state: Option<JobState>,
    limit: i64,
) -> Result<Vec<JobSummary>> {
    let rows = match state {
        Some(state) => {
            sqlx::query(
                r#"
                SELECT job_id, paper_id, state, attempts, max_attempts,
                       last_error, enqueued_at, finished_at
                FROM jobs
                WHERE state = ?
                ORDER BY enqueued_at DESC
                LIMIT ?
                "#,
            )
            .bind(state.as_str())
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT job_id, paper_id, state, attempts, max_attempts,
                       last_error, enqueued_at, finished_at
                FROM jobs
                ORDER BY enqueued_at DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    rows.into_iter()
        .map(|row| {
            let state_text: String = row.get("state");
            let state = JobState::parse(&state_text).ok_or_else(|| {
                Error::Internal(format!("unknown state in jobs table: {}", state_text))
            })?;
            Ok(JobSummary {
                job_id: parse_job_id(&row.get::<String, _>("job_id"))?,
                paper_id: row.get("paper_id"),
                state,
                attempts: row.get::<i64, _>("attempts") as u32,
                max_attempts: row.get::<i64, _>("max_attempts") as u32,
                last_error: row.get("last_error"),
                enqueued_at: row.get("enqueued_at"),
                finished_at: row.get("finished_at"),
            })
        })
        .collect()
}

fn parse_job_id(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text)
        .map_err(|e| Error::Internal(format!("invalid job_id in jobs table: {}", e)))
}
