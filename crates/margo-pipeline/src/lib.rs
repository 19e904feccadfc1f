//! Orchestration: per-date dataset pipelines, the profit engine sequence,
//! a rayon-backed job scheduler, and catch-up/health/status reporting.

pub mod daily;
pub mod dataset;
pub mod error;
pub mod health;
pub mod scheduler;
pub mod status;

pub use daily::PipelineEnv;
pub use dataset::Dataset;
pub use error::PipelineError;
pub use health::{CatchUpStatus, Health, catch_up, health_check};
pub use scheduler::{Batch, BatchId, BatchReport, Job, JobId, Scheduler};
