//! Worker pool integration tests
//!
//! Runs real jobs through the durable queue with scripted collaborators:
//! the happy path from announcement to enriched record, parallel queue
//! draining, and the retry-then-triage failure path.

mod helpers;

use helpers::{announcement_for, sample_announcement, sample_contact};
use helpers::{StubAuthors, StubDetector, StubFetcher};
use jetwatch_common::db::init::init_memory_database;
use jetwatch_common::db::queue::{self, queue_depth};
use jetwatch_common::db::papers;
use jetwatch_common::events::{EventBus, MonitorEvent};
use jetwatch_common::models::{JobState, ParseStatus};
use jetwatch_pm::ingest::IntakeHandler;
use jetwatch_pm::worker::{ProcessPipeline, QueuedDispatch, WorkerPool};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POLL: Duration = Duration::from_millis(10);
const LEASE_SECONDS: u64 = 600;

fn pipeline_with(
    pool: &SqlitePool,
    fetcher: Arc<StubFetcher>,
    detector: Arc<StubDetector>,
    authors: Arc<StubAuthors>,
    events: EventBus,
) -> Arc<ProcessPipeline> {
    Arc::new(ProcessPipeline::new(
        pool.clone(),
        fetcher,
        detector,
        authors,
        events,
    ))
}

/// Poll the queue until `done` jobs finish (or fail the test after 5s)
async fn wait_for_depth(pool: &SqlitePool, done: i64, failed: i64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let depth = queue_depth(pool).await.unwrap();
        if depth.done == done && depth.failed == failed {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "queue never reached done={} failed={}, at {:?}",
            done,
            failed,
            depth
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn end_to_end_through_queue_and_workers() {
    let pool = init_memory_database().await.unwrap();
    let events = EventBus::new(256);

    // Intake enqueues; the record starts unprocessed
    let intake = IntakeHandler::new(
        pool.clone(),
        Arc::new(QueuedDispatch::new(pool.clone(), 2, events.clone())),
        events.clone(),
    );
    intake.ingest(&sample_announcement()).await.unwrap();

    let record = papers::get_paper(&pool, "172627v1").await.unwrap().unwrap();
    assert_eq!(record.title, "Some Title");
    assert_eq!(record.parse_status, ParseStatus::Unprocessed);
    assert_eq!(queue_depth(&pool).await.unwrap().queued, 1);

    // Workers drain the queue with a flagging detector
    let pipeline = pipeline_with(
        &pool,
        Arc::new(StubFetcher::ok()),
        Arc::new(StubDetector::flagged(serde_json::json!({"pages": [3, 7]}))),
        Arc::new(StubAuthors::with_contact(sample_contact())),
        events.clone(),
    );
    let workers = WorkerPool::new(pool.clone(), pipeline, events, 2, POLL, LEASE_SECONDS);

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let handle = tokio::spawn(async move { workers.run(worker_cancel).await });

    wait_for_depth(&pool, 1, 0).await;
    cancel.cancel();
    handle.await.unwrap();

    let record = papers::get_paper(&pool, "172627v1").await.unwrap().unwrap();
    assert_eq!(record.parse_status, ParseStatus::Flagged);
    let contact = record.author_contact.unwrap();
    assert_eq!(contact.corresponding, vec!["t.ellis@imperial.ac.uk"]);
    assert_eq!(contact.all.len(), 4);
}

#[tokio::test]
async fn worker_pool_drains_parallel_jobs() {
    let pool = init_memory_database().await.unwrap();
    let events = EventBus::new(256);

    let intake = IntakeHandler::new(
        pool.clone(),
        Arc::new(QueuedDispatch::new(pool.clone(), 2, events.clone())),
        events.clone(),
    );
    for (id, title) in [
        ("aaa1", "First paper"),
        ("bbb2", "Second paper"),
        ("ccc3", "Third paper"),
    ] {
        intake.ingest(&announcement_for(id, title)).await.unwrap();
    }
    assert_eq!(queue_depth(&pool).await.unwrap().queued, 3);

    let detector = Arc::new(StubDetector::clean());
    let pipeline = pipeline_with(
        &pool,
        Arc::new(StubFetcher::ok()),
        Arc::clone(&detector),
        Arc::new(StubAuthors::failing("must not be called for clean papers")),
        events.clone(),
    );
    let workers = WorkerPool::new(pool.clone(), pipeline, events, 3, POLL, LEASE_SECONDS);

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let handle = tokio::spawn(async move { workers.run(worker_cancel).await });

    wait_for_depth(&pool, 3, 0).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(detector.calls(), 3);
    for id in ["aaa1", "bbb2", "ccc3"] {
        let record = papers::get_paper(&pool, id).await.unwrap().unwrap();
        assert_eq!(record.parse_status, ParseStatus::Clean);
        assert!(record.author_contact.is_none());
    }
}

#[tokio::test]
async fn failing_job_retries_once_then_surfaces_for_triage() {
    let pool = init_memory_database().await.unwrap();
    let events = EventBus::new(256);
    let mut rx = events.subscribe();

    let intake = IntakeHandler::new(
        pool.clone(),
        Arc::new(QueuedDispatch::new(pool.clone(), 2, events.clone())),
        events.clone(),
    );
    intake
        .ingest(&announcement_for("bad404", "Unanalyzable"))
        .await
        .unwrap();

    let detector = Arc::new(StubDetector::failing("classifier crashed"));
    let pipeline = pipeline_with(
        &pool,
        Arc::new(StubFetcher::ok()),
        Arc::clone(&detector),
        Arc::new(StubAuthors::failing("unused")),
        events.clone(),
    );
    let workers = WorkerPool::new(pool.clone(), pipeline, events, 1, POLL, LEASE_SECONDS);

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let handle = tokio::spawn(async move { workers.run(worker_cancel).await });

    wait_for_depth(&pool, 0, 1).await;
    cancel.cancel();
    handle.await.unwrap();

    // One redelivery happened before the job was parked
    assert_eq!(detector.calls(), 2);

    let failed = queue::list_jobs(&pool, Some(JobState::Failed), 10)
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].paper_id, "bad404");
    assert_eq!(failed[0].attempts, 2);
    assert!(failed[0]
        .last_error
        .as_deref()
        .unwrap()
        .contains("classifier crashed"));

    let mut failure_events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let MonitorEvent::JobFailed { will_retry, .. } = event {
            failure_events.push(will_retry);
        }
    }
    assert_eq!(failure_events, vec![true, false]);

    // The record never got a verdict
    let record = papers::get_paper(&pool, "bad404").await.unwrap().unwrap();
    assert_eq!(record.parse_status, ParseStatus::Unprocessed);
}
