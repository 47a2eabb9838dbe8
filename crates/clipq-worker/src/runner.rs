//! Queue consumption loop.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use clipq_models::FailureKind;
use clipq_queue::WorkerQueue;

use crate::error::WorkerResult;
use crate::executor::JobExecutor;

/// Pause after a queue error before polling again.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// What happened to one dequeued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Finished { num_bytes: usize },
    Failed(FailureKind),
}

/// Pulls jobs one at a time and records their outcome on the queue.
pub struct WorkerRunner {
    queue: Arc<dyn WorkerQueue>,
    executor: JobExecutor,
    consumer_name: String,
    shutdown: watch::Sender<bool>,
}

impl WorkerRunner {
    pub fn new(queue: Arc<dyn WorkerQueue>, executor: JobExecutor) -> Self {
        let consumer_name = format!("worker-{}-{}", executor.hostname(), Uuid::new_v4());
        let (shutdown, _) = watch::channel(false);
        Self {
            queue,
            executor,
            consumer_name,
            shutdown,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Signal shutdown; the loop stops before taking its next job.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Consume jobs until shutdown is signalled.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(consumer = %self.consumer_name, "Starting worker loop");
        let shutdown_rx = self.shutdown.subscribe();

        while !*shutdown_rx.borrow() {
            if let Err(e) = self.process_next().await {
                error!("Error consuming jobs: {}", e);
                tokio::time::sleep(QUEUE_ERROR_BACKOFF).await;
            }
        }

        info!(consumer = %self.consumer_name, "Worker loop stopped");
        Ok(())
    }

    /// Take at most one job, execute it and record the outcome.
    ///
    /// Returns `Ok(None)` if nothing was available within the block interval.
    /// Only queue errors are returned; job errors become failure records.
    pub async fn process_next(&self) -> WorkerResult<Option<JobOutcome>> {
        let block = self.executor.config().block;
        let Some(delivery) = self.queue.dequeue(&self.consumer_name, block).await? else {
            return Ok(None);
        };
        let job_id = delivery.job_id().clone();

        let outcome = match self.executor.execute(self.queue.as_ref(), &delivery.job).await {
            Ok(bytes) => {
                let num_bytes = bytes.len();
                self.queue.complete(&delivery, bytes).await?;
                info!(job_id = %job_id, num_bytes, "Job completed");
                JobOutcome::Finished { num_bytes }
            }
            Err(e) => {
                let failure = e.failure();
                match failure.kind {
                    FailureKind::ContentUnavailable => {
                        warn!(job_id = %job_id, "Video unavailable: {}", failure.message)
                    }
                    _ => error!(job_id = %job_id, kind = %failure.kind, "Job failed: {}", e),
                }
                let kind = failure.kind;
                self.queue.fail(&delivery, failure).await?;
                JobOutcome::Failed(kind)
            }
        };

        let label = match &outcome {
            JobOutcome::Finished { .. } => "finished",
            JobOutcome::Failed(kind) => kind.as_str(),
        };
        counter!("clipq_worker_jobs_total", "outcome" => label).increment(1);

        Ok(Some(outcome))
    }
}
