//! Clip download worker.
//!
//! This crate provides:
//! - The job executor (host metadata, acquisition cascade, transcode)
//! - The one-job-at-a-time queue consumption loop
//! - Typed failure classification for the queue's failure records

pub mod config;
pub mod error;
pub mod executor;
pub mod runner;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{host_identity, JobExecutor};
pub use runner::{JobOutcome, WorkerRunner};
