//! Media layer for clip workers.
//!
//! This crate provides:
//! - Stream listing and download via yt-dlp
//! - The stream acquisition cascade (direct, progressive, adaptive)
//! - Type-safe FFmpeg command building and running
//! - Progress parsing from `-progress pipe:2`
//! - The clip transcode operation

pub mod cascade;
pub mod command;
pub mod download;
pub mod error;
pub mod progress;
pub mod stream;
pub mod transcode;

pub use cascade::{AcquiredSource, AcquisitionCascade, Strategy, DEFAULT_DIRECT_TAG};
pub use command::{check_ffmpeg, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use download::{is_unavailable_message, source_url, YtDlpProvider};
pub use error::{MediaError, MediaResult};
pub use progress::FfmpegProgress;
pub use stream::{StreamHandle, StreamKind, StreamProvider};
pub use transcode::{FfmpegTranscoder, OutputFormat, TranscodeRequest, Transcoder};
