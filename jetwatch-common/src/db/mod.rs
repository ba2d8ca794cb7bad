//! Database layer: paper record store, durable job queue, settings

pub mod init;
pub mod papers;
pub mod queue;
pub mod settings;

pub use init::init_database;
