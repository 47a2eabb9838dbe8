//! In-process queue.
//!
//! Mirrors the Redis queue semantics without a server. Running records
//! carry a lease and vanish once it runs out; terminal records are kept
//! until deleted. [`MemoryQueue::expire`] removes one to simulate retention
//! running out.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use clipq_models::{DownloadClipJob, JobFailure, JobId, JobStatus};

use crate::error::{QueueError, QueueResult};
use crate::job::{Delivery, Job};
use crate::queue::{JobQueue, WorkerQueue, DEFAULT_RUNNING_LEASE};

#[derive(Debug)]
struct Record {
    payload: DownloadClipJob,
    status: JobStatus,
    result: Option<Vec<u8>>,
    failure: Option<JobFailure>,
    meta: HashMap<String, String>,
    result_ttl: Duration,
    lease_until: Option<Instant>,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        self.lease_until.is_some_and(|until| now >= until)
    }
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<JobId, Record>,
    pending: VecDeque<JobId>,
    next_message: u64,
}

impl State {
    /// Look up a record, dropping it if its lease has run out.
    fn live(&mut self, id: &JobId) -> Option<&mut Record> {
        if self.records.get(id)?.is_expired(Instant::now()) {
            self.records.remove(id);
            return None;
        }
        self.records.get_mut(id)
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.records.retain(|_, record| !record.is_expired(now));
    }
}

/// Queue held in memory, shared between clones.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    state: Arc<Mutex<State>>,
    available: Arc<Notify>,
    lease: Duration,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            available: Arc::default(),
            lease: DEFAULT_RUNNING_LEASE,
        }
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how long a running record survives without a terminal update.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test thread panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop a job record as if its retention had elapsed.
    pub fn expire(&self, id: &JobId) -> bool {
        self.lock().records.remove(id).is_some()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.lock().live(id).is_some()
    }

    /// Number of job records held.
    pub fn len(&self) -> usize {
        let mut state = self.lock();
        state.purge_expired();
        state.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of jobs waiting for a worker.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn try_take(&self) -> Option<Delivery> {
        let mut state = self.lock();
        while let Some(id) = state.pending.pop_front() {
            state.next_message += 1;
            let message_id = format!("{}-0", state.next_message);
            let lease_until = Instant::now() + self.lease;
            if let Some(record) = state.live(&id) {
                record.status = JobStatus::Running;
                record.lease_until = Some(lease_until);
                return Some(Delivery {
                    message_id,
                    job: record.payload.clone(),
                    result_ttl: record.result_ttl,
                });
            }
        }
        None
    }

    fn settle(
        &self,
        delivery: &Delivery,
        update: impl FnOnce(&mut Record),
    ) -> QueueResult<()> {
        let mut state = self.lock();
        let record = state
            .live(delivery.job_id())
            .ok_or_else(|| QueueError::JobNotFound(delivery.job_id().to_string()))?;
        update(&mut *record);
        record.lease_until = None;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: DownloadClipJob, result_ttl: Duration) -> QueueResult<Job> {
        {
            let mut state = self.lock();
            state.records.insert(
                job.job_id.clone(),
                Record {
                    payload: job.clone(),
                    status: JobStatus::Queued,
                    result: None,
                    failure: None,
                    meta: HashMap::new(),
                    result_ttl,
                    lease_until: None,
                },
            );
            state.pending.push_back(job.job_id.clone());
        }
        self.available.notify_one();
        Ok(Job::queued(job))
    }

    async fn refresh(&self, job: &mut Job) -> QueueResult<()> {
        let mut state = self.lock();
        let record = state
            .live(&job.id)
            .ok_or_else(|| QueueError::JobNotFound(job.id.to_string()))?;
        job.status = record.status;
        job.result = record.result.clone();
        job.failure = record.failure.clone();
        job.meta = record.meta.clone();
        Ok(())
    }

    async fn delete(&self, job: &Job) -> QueueResult<()> {
        self.lock().records.remove(&job.id);
        Ok(())
    }
}

#[async_trait]
impl WorkerQueue for MemoryQueue {
    async fn dequeue(&self, _consumer: &str, block: Duration) -> QueueResult<Option<Delivery>> {
        let deadline = tokio::time::Instant::now() + block;
        loop {
            let notified = self.available.notified();
            if let Some(delivery) = self.try_take() {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.try_take());
            }
        }
    }

    async fn set_meta(&self, job_id: &JobId, key: &str, value: &str) -> QueueResult<()> {
        let mut state = self.lock();
        let record = state
            .live(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        record.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn complete(&self, delivery: &Delivery, result: Vec<u8>) -> QueueResult<()> {
        self.settle(delivery, |record| {
            record.status = JobStatus::Finished;
            record.result = Some(result);
        })
    }

    async fn fail(&self, delivery: &Delivery, failure: JobFailure) -> QueueResult<()> {
        self.settle(delivery, |record| {
            record.status = JobStatus::Failed;
            record.failure = Some(failure);
        })
    }
}
