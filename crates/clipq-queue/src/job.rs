//! Job handles.

use std::collections::HashMap;
use std::time::Duration;

use clipq_models::{Clip, DownloadClipJob, JobFailure, JobId, JobStatus};

/// Metadata key under which workers record their host identity.
pub const HOSTNAME_META_KEY: &str = "hostname";

/// Coordinator-side handle to a queued job.
///
/// `status`, `result`, `failure` and `meta` are a cached view of the queue
/// record as of the last refresh.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub payload: DownloadClipJob,
    pub status: JobStatus,
    pub result: Option<Vec<u8>>,
    pub failure: Option<JobFailure>,
    pub meta: HashMap<String, String>,
}

impl Job {
    /// Handle for a freshly enqueued job.
    pub fn queued(payload: DownloadClipJob) -> Self {
        Self {
            id: payload.job_id.clone(),
            payload,
            status: JobStatus::Queued,
            result: None,
            failure: None,
            meta: HashMap::new(),
        }
    }

    pub fn clip(&self) -> &Clip {
        &self.payload.clip
    }

    /// Host that executed the job, if recorded.
    pub fn hostname(&self) -> Option<&str> {
        self.meta.get(HOSTNAME_META_KEY).map(String::as_str)
    }

    pub fn is_finished(&self) -> bool {
        self.status == JobStatus::Finished
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }
}

/// Worker-side handle to a dequeued job.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Queue message id, acknowledged once the job is terminal
    pub message_id: String,
    pub job: DownloadClipJob,
    /// How long a finished result stays fetchable
    pub result_ttl: Duration,
}

impl Delivery {
    pub fn job_id(&self) -> &JobId {
        &self.job.job_id
    }
}
