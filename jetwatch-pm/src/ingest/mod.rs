//! Ingestion side of the monitor: intake parsing, live stream, backfill

pub mod intake;
pub mod listener;
pub mod poller;

pub use intake::{DiscardReason, IngestOutcome, IntakeHandler};
pub use listener::EventListener;
pub use poller::{BackfillPoller, BackfillSummary};
