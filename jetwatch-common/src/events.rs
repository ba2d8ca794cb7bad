//! Event types for the jetwatch event system
//!
//! Provides shared event definitions and the EventBus used by the monitor
//! service for observability. Events describe ingestion and processing
//! lifecycle; consumers subscribe for logging or notification fan-out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::ParseStatus;

/// jetwatch event types
///
/// Events are broadcast via [`EventBus`] and can be serialized for
/// transmission or structured logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MonitorEvent {
    /// Announcement stream (re)connected
    StreamConnected {
        /// When the connection was established
        timestamp: DateTime<Utc>,
    },

    /// Announcement stream dropped; the listener will reconnect
    StreamInterrupted {
        /// Error that interrupted the stream
        error: String,
        /// Backoff before the next connection attempt
        backoff_seconds: u64,
        /// When the interruption was observed
        timestamp: DateTime<Utc>,
    },

    /// An announcement could not be mapped to a paper and was dropped
    AnnouncementDiscarded {
        /// Source-assigned event identifier
        source_id: String,
        /// Why intake rejected it
        reason: String,
        /// When the discard happened
        timestamp: DateTime<Utc>,
    },

    /// Intake upserted a paper record
    PaperIngested {
        /// Paper identifier
        paper_id: String,
        /// Extracted title
        title: String,
        /// When intake ran
        timestamp: DateTime<Utc>,
    },

    /// A processing job was added to the durable queue
    JobEnqueued {
        /// Queue job identifier
        job_id: Uuid,
        /// Paper the job will process
        paper_id: String,
        /// When the job was enqueued
        timestamp: DateTime<Utc>,
    },

    /// Enqueue found an active job for the paper and refreshed it instead
    JobDeduplicated {
        /// Identifier of the already-active job
        job_id: Uuid,
        /// Paper the job will process
        paper_id: String,
        /// When the duplicate intake happened
        timestamp: DateTime<Utc>,
    },

    /// A worker claimed a job and started the pipeline
    JobStarted {
        /// Queue job identifier
        job_id: Uuid,
        /// Paper being processed
        paper_id: String,
        /// Delivery attempt number (1-based)
        attempt: u32,
        /// When the claim landed
        timestamp: DateTime<Utc>,
    },

    /// Pipeline finished and results were persisted
    JobCompleted {
        /// Queue job identifier
        job_id: Uuid,
        /// Paper that was processed
        paper_id: String,
        /// Verdict that was persisted
        status: ParseStatus,
        /// When the job completed
        timestamp: DateTime<Utc>,
    },

    /// Pipeline failed; the job retries or surfaces for triage
    JobFailed {
        /// Queue job identifier
        job_id: Uuid,
        /// Paper being processed
        paper_id: String,
        /// Delivery attempt that failed (1-based)
        attempt: u32,
        /// Error text recorded on the job
        error: String,
        /// Whether the queue will redeliver
        will_retry: bool,
        /// When the failure was recorded
        timestamp: DateTime<Utc>,
    },

    /// Analysis flagged a rainbow colormap in the paper
    PaperFlagged {
        /// Paper identifier
        paper_id: String,
        /// When the verdict was persisted
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// Get event type name as a string (for logging and filtering)
    pub fn event_type(&self) -> &str {
        match self {
            MonitorEvent::StreamConnected { .. } => "StreamConnected",
            MonitorEvent::StreamInterrupted { .. } => "StreamInterrupted",
            MonitorEvent::AnnouncementDiscarded { .. } => "AnnouncementDiscarded",
            MonitorEvent::PaperIngested { .. } => "PaperIngested",
            MonitorEvent::JobEnqueued { .. } => "JobEnqueued",
            MonitorEvent::JobDeduplicated { .. } => "JobDeduplicated",
            MonitorEvent::JobStarted { .. } => "JobStarted",
            MonitorEvent::JobCompleted { .. } => "JobCompleted",
            MonitorEvent::JobFailed { .. } => "JobFailed",
            MonitorEvent::PaperFlagged { .. } => "PaperFlagged",
        }
    }
}

/// Broadcast bus for [`MonitorEvent`]
///
/// Cloning is cheap; all clones share the same channel. Subscribers receive
/// only events emitted after they subscribe.
///
/// # Examples
///
/// ```
/// use jetwatch_common::events::{EventBus, MonitorEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(MonitorEvent::PaperIngested {
///     paper_id: "172627v1".to_string(),
///     title: "Some Title".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "PaperIngested");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    ///
    /// `capacity` is the number of events buffered before old events are
    /// dropped for slow subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if no subscriber is
    /// listening (the event is lost).
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: MonitorEvent,
    ) -> Result<usize, broadcast::error::SendError<MonitorEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// Used for lifecycle events where a missing subscriber is acceptable.
    pub fn emit_lossy(&self, event: MonitorEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ingested() -> MonitorEvent {
        MonitorEvent::PaperIngested {
            paper_id: "172627v1".to_string(),
            title: "Some Title".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(sample_ingested()).unwrap();

        let received = rx.try_recv().unwrap();
        assert_eq!(received.event_type(), "PaperIngested");
    }

    #[test]
    fn emit_without_subscribers_errors_but_lossy_does_not_panic() {
        let bus = EventBus::new(10);
        assert!(bus.emit(sample_ingested()).is_err());
        bus.emit_lossy(sample_ingested());
    }

    #[test]
    fn multiple_subscribers_all_receive() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(sample_ingested()).unwrap();

        assert_eq!(rx1.try_recv().unwrap().event_type(), "PaperIngested");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "PaperIngested");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(sample_ingested()).unwrap();
        assert_eq!(json.get("type").unwrap(), "PaperIngested");
        assert_eq!(json.get("paper_id").unwrap(), "172627v1");
    }

    #[test]
    fn event_type_covers_queue_lifecycle() {
        let job_id = Uuid::new_v4();
        let now = Utc::now();
        let started = MonitorEvent::JobStarted {
            job_id,
            paper_id: "p1".into(),
            attempt: 1,
            timestamp: now,
        };
        let failed = MonitorEvent::JobFailed {
            job_id,
            paper_id: "p1".into(),
            attempt: 2,
            error: "download timed out".into(),
            will_retry: false,
            timestamp: now,
        };
        assert_eq!(started.event_type(), "JobStarted");
        assert_eq!(failed.event_type(), "JobFailed");
    }
}
