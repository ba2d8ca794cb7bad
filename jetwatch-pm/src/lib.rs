//! jetwatch-pm library interface
//!
//! Exposes the monitor's building blocks for integration testing: the
//! intake path, stream listener and backfill poller, the processing
//! pipeline with its worker pool, and the collaborator service clients.

pub mod config;
pub mod ingest;
pub mod services;
pub mod worker;
