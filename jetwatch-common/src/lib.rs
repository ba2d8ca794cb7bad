//! # jetwatch Common Library
//!
//! Shared code for the jetwatch services including:
//! - Domain models (paper records, announcements, job payloads)
//! - Paper record store and durable job queue (SQLite)
//! - Event types (MonitorEvent enum) and the EventBus
//! - Configuration loading

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
