//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while acquiring or transcoding media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("Stream listing failed: {message}")]
    ListingFailed { message: String },

    #[error("Content unavailable: {message}")]
    ContentUnavailable { message: String },

    #[error("No stream acquirable for {source_id} after {attempts} candidate(s)")]
    NoStreamAcquirable { source_id: String, attempts: usize },

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    /// Create a stream listing failure error.
    pub fn listing_failed(message: impl Into<String>) -> Self {
        Self::ListingFailed {
            message: message.into(),
        }
    }

    /// Create a content unavailable error.
    pub fn content_unavailable(message: impl Into<String>) -> Self {
        Self::ContentUnavailable {
            message: message.into(),
        }
    }

    /// Errors scoped to a single stream candidate; the cascade moves on.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MediaError::DownloadFailed { .. } | MediaError::FileNotFound(_) | MediaError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(MediaError::download_failed("HTTP Error 403").is_transient());
        assert!(!MediaError::content_unavailable("Video unavailable").is_transient());
        assert!(!MediaError::NoStreamAcquirable {
            source_id: "x".into(),
            attempts: 0
        }
        .is_transient());
        assert!(!MediaError::YtDlpNotFound.is_transient());
    }
}
