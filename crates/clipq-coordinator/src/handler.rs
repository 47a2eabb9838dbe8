//! Completion handler: reconciles in-flight jobs against the queue.

use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use clipq_models::{FailureKind, JobFailure, JobStatus};
use clipq_queue::{Job, JobQueue};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::metrics;
use crate::oracle::CompletionOracle;

/// Counts produced by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub finished: u64,
    pub failed: u64,
    /// Jobs whose queue record vanished before they were seen terminal
    pub missing: u64,
}

/// Terminal-state side effects for in-flight jobs.
pub struct CompletionHandler {
    queue: Arc<dyn JobQueue>,
    oracle: CompletionOracle,
}

enum Disposition {
    Pending(Job),
    Finished,
    Failed,
    Missing,
}

impl CompletionHandler {
    pub fn new(queue: Arc<dyn JobQueue>, oracle: CompletionOracle) -> Self {
        Self { queue, oracle }
    }

    /// Refresh every job and handle the terminal ones.
    ///
    /// Returns the jobs still pending, in their original order. Only a
    /// storage failure aborts the pass.
    pub async fn reconcile(
        &self,
        in_flight: Vec<Job>,
    ) -> CoordinatorResult<(Vec<Job>, Reconciliation)> {
        let mut pending = Vec::with_capacity(in_flight.len());
        let mut counts = Reconciliation::default();

        for job in in_flight {
            match self.handle(job).await? {
                Disposition::Pending(job) => pending.push(job),
                Disposition::Finished => counts.finished += 1,
                Disposition::Failed => counts.failed += 1,
                Disposition::Missing => counts.missing += 1,
            }
        }

        Ok((pending, counts))
    }

    async fn handle(&self, mut job: Job) -> CoordinatorResult<Disposition> {
        if let Err(e) = self.queue.refresh(&mut job).await {
            if e.is_not_found() {
                error!(
                    job_id = %job.id,
                    source_id = %job.clip().source_id,
                    "job record missing"
                );
                metrics::record_missing();
                return Ok(Disposition::Missing);
            }
            if e.is_transient() {
                warn!(job_id = %job.id, "Failed to refresh job, retrying next cycle: {}", e);
                return Ok(Disposition::Pending(job));
            }
            // Unreadable records are final.
            let failure = JobFailure::new(FailureKind::Unclassified, "unreadable job record")
                .with_detail(e.to_string());
            return Ok(self.abandon(&job, failure));
        }

        match job.status {
            JobStatus::Finished => self.handle_finished(job).await,
            JobStatus::Failed => {
                let failure = job.failure.clone().unwrap_or_else(|| {
                    JobFailure::new(FailureKind::Unclassified, "no failure record")
                });
                Ok(self.abandon(&job, failure))
            }
            JobStatus::Unknown => {
                let failure = JobFailure::new(FailureKind::Unclassified, "unrecognized job status");
                Ok(self.abandon(&job, failure))
            }
            JobStatus::Queued | JobStatus::Running => Ok(Disposition::Pending(job)),
        }
    }

    fn abandon(&self, job: &Job, failure: JobFailure) -> Disposition {
        log_failure(job, &failure);
        metrics::record_failed(failure.kind);
        Disposition::Failed
    }

    async fn handle_finished(&self, mut job: Job) -> CoordinatorResult<Disposition> {
        let payload = job.result.take().unwrap_or_default();

        if payload.is_empty() {
            let failure = JobFailure::new(FailureKind::EmptyResult, "job finished with empty result");
            let disposition = self.abandon(&job, failure);
            self.delete(&job).await;
            return Ok(disposition);
        }

        let path = self.oracle.clip_path(job.clip());
        info!(
            job_id = %job.id,
            source_id = %job.clip().source_id,
            hostname = job.hostname().unwrap_or("unknown"),
            num_bytes = payload.len(),
            path = %path.display(),
            "saving clip"
        );
        write_clip(&path, &payload).await?;

        // Only after the file is durable.
        self.delete(&job).await;
        metrics::record_finished();
        Ok(Disposition::Finished)
    }

    async fn delete(&self, job: &Job) {
        if let Err(e) = self.queue.delete(job).await {
            warn!(job_id = %job.id, "Failed to delete job record: {}", e);
        }
    }
}

fn log_failure(job: &Job, failure: &JobFailure) {
    let hostname = job.hostname().unwrap_or("unknown");
    match failure.kind {
        FailureKind::ContentUnavailable => error!(
            job_id = %job.id,
            source_id = %job.clip().source_id,
            hostname,
            "video unavailable"
        ),
        kind => error!(
            job_id = %job.id,
            source_id = %job.clip().source_id,
            hostname,
            kind = %kind,
            message = %failure.message,
            detail = failure.detail.as_deref().unwrap_or(""),
            "job failed"
        ),
    }
}

/// Write the whole payload next to `path`, sync it, rename it into place
/// and sync the directory entry.
async fn write_clip(path: &Path, payload: &[u8]) -> CoordinatorResult<()> {
    let tmp = path.with_extension("tmp");
    let write = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(payload).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, path).await?;
        sync_parent(path).await
    };

    if let Err(e) = write.await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(CoordinatorError::storage(path, e));
    }
    Ok(())
}

#[cfg(unix)]
async fn sync_parent(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if dir.as_os_str().is_empty() => Path::new("."),
        Some(dir) => dir,
        None => return Ok(()),
    };
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
