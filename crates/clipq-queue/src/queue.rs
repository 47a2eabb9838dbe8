//! Queue configuration and the two views of the queue.

use std::time::Duration;

use async_trait::async_trait;

use clipq_models::{DownloadClipJob, JobFailure, JobId};

use crate::error::QueueResult;
use crate::job::{Delivery, Job};

/// How long failure records are retained (one year).
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// How long a running record lives without a terminal update.
pub const DEFAULT_RUNNING_LEASE: Duration = Duration::from_secs(660);

/// Slack added to the worker job timeout when deriving the running lease.
pub const LEASE_MARGIN: Duration = Duration::from_secs(60);

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Logical queue name
    pub queue_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Retention of failure records
    pub failure_ttl: Duration,
    /// Lifetime of a running record; a job abandoned by its worker expires
    /// after this and reads as not found
    pub running_lease: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            queue_name: "default".to_string(),
            consumer_group: "clipq:workers".to_string(),
            failure_ttl: DEFAULT_FAILURE_TTL,
            running_lease: DEFAULT_RUNNING_LEASE,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            queue_name: std::env::var("QUEUE_NAME").unwrap_or(defaults.queue_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            failure_ttl: std::env::var("WORKER_FAILURE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.failure_ttl),
            running_lease: std::env::var("QUEUE_RUNNING_LEASE")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.running_lease),
        }
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// Cover jobs that may run for up to `job_timeout`.
    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.running_lease = job_timeout + LEASE_MARGIN;
        self
    }

    /// Stream holding pending job ids.
    pub fn stream_key(&self) -> String {
        format!("clipq:queue:{}", self.queue_name)
    }
}

/// Key of the job record hash.
pub fn job_key(id: &JobId) -> String {
    format!("clipq:job:{}", id)
}

/// Key of the job metadata hash.
pub fn meta_key(id: &JobId) -> String {
    format!("clipq:job:{}:meta", id)
}

/// Coordinator view of the queue.
///
/// The queue is the source of truth for job state; a [`Job`] is only a
/// cached copy that [`JobQueue::refresh`] brings up to date.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a job whose finished result is retained for `result_ttl`.
    async fn enqueue(&self, job: DownloadClipJob, result_ttl: Duration) -> QueueResult<Job>;

    /// Update the cached view of `job`.
    ///
    /// Returns [`QueueError::JobNotFound`](crate::QueueError::JobNotFound)
    /// if the record has expired or was deleted.
    async fn refresh(&self, job: &mut Job) -> QueueResult<()>;

    /// Remove the job record.
    async fn delete(&self, job: &Job) -> QueueResult<()>;
}

/// Worker view of the queue.
#[async_trait]
pub trait WorkerQueue: Send + Sync {
    /// Take the next job, waiting up to `block`.
    ///
    /// Marks it running under a lease: if neither [`complete`](Self::complete)
    /// nor [`fail`](Self::fail) follows in time, the record expires.
    async fn dequeue(&self, consumer: &str, block: Duration) -> QueueResult<Option<Delivery>>;

    /// Store one metadata entry on the job record.
    async fn set_meta(&self, job_id: &JobId, key: &str, value: &str) -> QueueResult<()>;

    /// Record a successful result and acknowledge the delivery.
    async fn complete(&self, delivery: &Delivery, result: Vec<u8>) -> QueueResult<()>;

    /// Record a typed failure and acknowledge the delivery.
    async fn fail(&self, delivery: &Delivery, failure: JobFailure) -> QueueResult<()>;
}
