//! Shared data models for the clip download pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Clip descriptors and their deterministic identity
//! - Job identifiers, statuses and typed failure records
//! - Transcode parameters carried with every queued job

pub mod clip;
pub mod job;

// Re-export common types
pub use clip::{Clip, ClipError, ClipIdentity};
pub use job::{DownloadClipJob, FailureKind, JobFailure, JobId, JobStatus, TranscodeParams};
