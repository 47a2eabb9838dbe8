//! Remote stream handles and the provider seam.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MediaResult;

/// What a remote stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Muxed audio and video
    Combined,
    /// Adaptive video-only stream
    VideoOnly,
    /// Adaptive audio-only stream
    AudioOnly,
}

/// Reference to one downloadable remote stream.
///
/// Ephemeral: lives only for the duration of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamHandle {
    /// Format/quality tag (yt-dlp `format_id`, e.g. `18`)
    pub tag: String,
    pub kind: StreamKind,
    /// Container extension (e.g. `mp4`, `webm`, `m4a`)
    pub container: String,
    /// Video height in pixels
    #[serde(default)]
    pub height: Option<u32>,
    /// Audio bitrate in kbit/s
    #[serde(default)]
    pub audio_bitrate: Option<f64>,
}

impl StreamHandle {
    pub fn new(tag: impl Into<String>, kind: StreamKind, container: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            kind,
            container: container.into(),
            height: None,
            audio_bitrate: None,
        }
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_audio_bitrate(mut self, kbps: f64) -> Self {
        self.audio_bitrate = Some(kbps);
        self
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {}", self.tag, self.kind, self.container)?;
        if let Some(height) = self.height {
            write!(f, ", {}p", height)?;
        }
        f.write_str(")")
    }
}

/// Source of remote streams for a video.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// List every stream the source offers.
    async fn list_streams(&self, source_id: &str) -> MediaResult<Vec<StreamHandle>>;

    /// Download one stream into `dest_dir`, returning the local file path.
    async fn download(
        &self,
        source_id: &str,
        stream: &StreamHandle,
        dest_dir: &Path,
        stem: &str,
    ) -> MediaResult<PathBuf>;
}
