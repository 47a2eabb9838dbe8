//! Worker error types.

use thiserror::Error;

use clipq_media::MediaError;
use clipq_models::{FailureKind, JobFailure};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] clipq_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Typed failure kind stored with the job record.
    pub fn kind(&self) -> FailureKind {
        match self {
            WorkerError::Media(e) => match e {
                MediaError::ContentUnavailable { .. } => FailureKind::ContentUnavailable,
                MediaError::NoStreamAcquirable { .. } => FailureKind::AcquisitionExhausted,
                MediaError::FfmpegNotFound
                | MediaError::FfmpegFailed { .. }
                | MediaError::UnsupportedFormat(_)
                | MediaError::Timeout(_) => FailureKind::Transcode,
                _ => FailureKind::Unclassified,
            },
            _ => FailureKind::Unclassified,
        }
    }

    /// Failure record for the queue.
    ///
    /// Content-unavailable failures keep only the short upstream message;
    /// everything else carries its full detail.
    pub fn failure(&self) -> JobFailure {
        let kind = self.kind();
        let failure = JobFailure::new(kind, self.to_string());

        match self {
            WorkerError::Media(MediaError::ContentUnavailable { .. }) => failure,
            WorkerError::Media(MediaError::FfmpegFailed {
                stderr: Some(stderr),
                exit_code,
                ..
            }) => failure.with_detail(format!("exit code {:?}\n{}", exit_code, stderr)),
            _ => failure.with_detail(format!("{:?}", self)),
        }
    }
}
