//! Job executor.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use clipq_media::{AcquisitionCascade, StreamProvider, TranscodeRequest, Transcoder};
use clipq_models::DownloadClipJob;
use clipq_queue::{WorkerQueue, HOSTNAME_META_KEY};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Identity of this host, recorded on every executed job.
pub fn host_identity() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Turns one clip job into transcoded bytes.
pub struct JobExecutor {
    config: WorkerConfig,
    cascade: AcquisitionCascade,
    provider: Arc<dyn StreamProvider>,
    transcoder: Arc<dyn Transcoder>,
    hostname: String,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        provider: Arc<dyn StreamProvider>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            cascade: config.cascade(),
            config,
            provider,
            transcoder,
            hostname: host_identity(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Execute `job`, bounded by the configured job timeout.
    ///
    /// The staging directory and transcode output are removed on return,
    /// whatever the outcome.
    pub async fn execute(
        &self,
        queue: &dyn WorkerQueue,
        job: &DownloadClipJob,
    ) -> WorkerResult<Vec<u8>> {
        if let Err(e) = queue
            .set_meta(&job.job_id, HOSTNAME_META_KEY, &self.hostname)
            .await
        {
            warn!(job_id = %job.job_id, "Failed to record hostname: {}", e);
        }

        let timeout = self.config.job_timeout;
        tokio::time::timeout(timeout, self.run(job))
            .await
            .map_err(|_| WorkerError::Timeout(timeout.as_secs()))?
    }

    async fn run(&self, job: &DownloadClipJob) -> WorkerResult<Vec<u8>> {
        let clip = &job.clip;
        let identity = clip.identity();

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let staging = tempfile::Builder::new()
            .prefix("clipq-")
            .tempdir_in(&self.config.work_dir)?;

        info!(
            job_id = %job.job_id,
            source_id = %clip.source_id,
            start = clip.start,
            end = clip.end,
            "Executing clip job"
        );

        let source = self
            .cascade
            .acquire(
                self.provider.as_ref(),
                &clip.source_id,
                staging.path(),
                identity.as_str(),
            )
            .await?;

        let output = staging.path().join(identity.file_name("mp4"));
        let request = TranscodeRequest {
            inputs: source.inputs().into_iter().map(PathBuf::from).collect(),
            output: output.clone(),
            start: clip.start,
            end: clip.end,
            params: job.params,
        };
        self.transcoder.transcode(&request).await?;

        let bytes = tokio::fs::read(&output).await?;
        debug!(
            job_id = %job.job_id,
            num_bytes = bytes.len(),
            "Read transcoded clip"
        );

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_identity_prefers_env() {
        // HOSTNAME is usually set in CI containers; when it is, it wins.
        let identity = host_identity();
        assert!(!identity.is_empty());
        if let Ok(env) = std::env::var("HOSTNAME") {
            if !env.trim().is_empty() {
                assert_eq!(identity, env.trim());
            }
        }
    }
}
