//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use clipq_media::{AcquisitionCascade, DEFAULT_DIRECT_TAG};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Work directory for temporary files
    pub work_dir: PathBuf,
    /// Upper bound on one job's execution
    pub job_timeout: Duration,
    /// Enable the separate video/audio fallback strategy
    pub enable_adaptive: bool,
    /// Format tag tried by the direct strategy
    pub direct_format: String,
    /// How long one dequeue call blocks
    pub block: Duration,
    /// Optional cookies file passed to yt-dlp
    pub cookies_path: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/clipq"),
            job_timeout: Duration::from_secs(600),
            enable_adaptive: false,
            direct_format: DEFAULT_DIRECT_TAG.to_string(),
            block: Duration::from_millis(1000),
            cookies_path: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            job_timeout: std::env::var("WORKER_JOB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            enable_adaptive: std::env::var("WORKER_ENABLE_ADAPTIVE")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.enable_adaptive),
            direct_format: std::env::var("WORKER_DIRECT_FORMAT")
                .unwrap_or(defaults.direct_format),
            block: std::env::var("WORKER_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.block),
            cookies_path: std::env::var("YTDLP_COOKIES_PATH").ok().map(PathBuf::from),
        }
    }

    /// Acquisition cascade described by this config.
    pub fn cascade(&self) -> AcquisitionCascade {
        AcquisitionCascade::default()
            .with_direct_tag(&self.direct_format)
            .with_adaptive(self.enable_adaptive)
    }
}
