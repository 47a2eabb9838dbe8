//! Job definitions shared by the coordinator and the workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Clip;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job status as recorded by the queue.
///
/// A coordinator only ever holds a cached copy of this value; it must be
/// refreshed from the queue before being trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in queue
    #[default]
    Queued,
    /// Job is being executed by a worker
    Running,
    /// Job completed and its result is available
    Finished,
    /// Job failed; a failure record is available
    Failed,
    /// Status not recognised
    Unknown,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "finished" => JobStatus::Finished,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Unknown,
        })
    }
}

/// Typed classification of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Upstream content is gone, private, region-locked or otherwise unavailable
    ContentUnavailable,
    /// Every acquisition strategy and candidate failed
    AcquisitionExhausted,
    /// The transcode step failed
    Transcode,
    /// The job finished but produced a zero-length payload
    EmptyResult,
    /// Any other worker-side failure
    Unclassified,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ContentUnavailable => "content_unavailable",
            FailureKind::AcquisitionExhausted => "acquisition_exhausted",
            FailureKind::Transcode => "transcode",
            FailureKind::EmptyResult => "empty_result",
            FailureKind::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure record stored with a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    /// Short human-readable message
    pub message: String,
    /// Full error chain, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Target parameters for the transcode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeParams {
    /// Output width; negative values mean "auto, preserve aspect, round to even"
    pub width: i32,
    /// Output height; negative values mean "auto, preserve aspect, round to even"
    pub height: i32,
    /// Output frame rate
    pub fps: u32,
    /// Output audio sample rate
    pub sample_rate: u32,
}

impl Default for TranscodeParams {
    fn default() -> Self {
        Self {
            width: -2,
            height: -2,
            fps: 16,
            sample_rate: 16000,
        }
    }
}

/// Job payload: download one clip and transcode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadClipJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Clip to fetch
    pub clip: Clip,
    /// Transcode parameters
    #[serde(default)]
    pub params: TranscodeParams,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl DownloadClipJob {
    pub fn new(clip: Clip, params: TranscodeParams) -> Self {
        Self {
            job_id: JobId::new(),
            clip,
            params,
            created_at: Utc::now(),
        }
    }
}
