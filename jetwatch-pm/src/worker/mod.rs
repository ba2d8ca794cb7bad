//! Processing side of the monitor: dispatch seam, pipeline, worker pool

pub mod dispatch;
pub mod pipeline;
pub mod runner;

pub use dispatch::{DispatchOutcome, InlineDispatch, JobDispatch, QueuedDispatch};
pub use pipeline::{PipelineError, PipelineOutcome, ProcessPipeline};
pub use runner::WorkerPool;
