//! Job queue using Redis hashes and Redis Streams.
//!
//! Every job has a record hash (`clipq:job:{id}`) and a metadata hash
//! (`clipq:job:{id}:meta`). Pending job ids travel through a stream read
//! by a consumer group; workers acknowledge and delete the stream entry
//! once the record is terminal.
//!
//! A running record carries a lease (`EXPIRE`); the terminal update
//! replaces it with the result or failure retention. A record whose worker
//! died therefore disappears and the coordinator counts it as missing.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use clipq_models::{DownloadClipJob, JobFailure, JobId, JobStatus};

use crate::error::{QueueError, QueueResult};
use crate::job::{Delivery, Job};
use crate::queue::{job_key, meta_key, JobQueue, QueueConfig, WorkerQueue};

/// Job queue client.
#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let stream = self.config.stream_key();

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Number of pending stream entries.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(self.config.stream_key()).await?;
        Ok(len)
    }

    /// Acknowledge and drop a stream entry.
    async fn ack(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        message_id: &str,
    ) -> QueueResult<()> {
        let stream = self.config.stream_key();
        redis::pipe()
            .cmd("XACK")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .ignore()
            .cmd("XDEL")
            .arg(&stream)
            .arg(message_id)
            .ignore()
            .query_async::<()>(conn)
            .await?;
        Ok(())
    }

    /// Mark a job terminal, expire its hashes and acknowledge the delivery.
    async fn finish(
        &self,
        delivery: &Delivery,
        fields: &[(&str, Vec<u8>)],
        ttl: Duration,
    ) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let id = delivery.job_id();
        let key = job_key(id);
        let ttl_secs = ttl.as_secs().max(1) as i64;

        redis::pipe()
            .atomic()
            .hset_multiple(&key, fields)
            .ignore()
            .expire(&key, ttl_secs)
            .ignore()
            .expire(meta_key(id), ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(&mut conn, &delivery.message_id).await
    }
}

fn field_str(fields: &HashMap<String, Vec<u8>>, name: &str) -> Option<String> {
    fields
        .get(name)
        .map(|v| String::from_utf8_lossy(v).into_owned())
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: DownloadClipJob, result_ttl: Duration) -> QueueResult<Job> {
        let mut conn = self.connection().await?;
        let key = job_key(&job.job_id);
        let payload = serde_json::to_string(&job)?;

        let fields = [
            ("status", JobStatus::Queued.as_str().to_string()),
            ("payload", payload),
            ("result_ttl", result_ttl.as_secs().to_string()),
            ("enqueued_at", Utc::now().to_rfc3339()),
        ];

        let (message_id,): (String,) = redis::pipe()
            .atomic()
            .hset_multiple(&key, &fields)
            .ignore()
            .cmd("XADD")
            .arg(self.config.stream_key())
            .arg("*")
            .arg("job_id")
            .arg(job.job_id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        debug!(
            job_id = %job.job_id,
            message_id = %message_id,
            "Enqueued job"
        );

        Ok(Job::queued(job))
    }

    async fn refresh(&self, job: &mut Job) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, Vec<u8>> = conn.hgetall(job_key(&job.id)).await?;
        if fields.is_empty() {
            return Err(QueueError::JobNotFound(job.id.to_string()));
        }

        job.status = field_str(&fields, "status")
            .map(|s| s.parse().unwrap_or(JobStatus::Unknown))
            .unwrap_or(JobStatus::Unknown);
        job.result = fields.get("result").cloned();
        job.failure = match fields.get("failure") {
            Some(raw) => Some(
                serde_json::from_slice::<JobFailure>(raw)
                    .map_err(|e| QueueError::serialization(format!("failure record: {}", e)))?,
            ),
            None => None,
        };
        job.meta = conn.hgetall(meta_key(&job.id)).await?;

        Ok(())
    }

    async fn delete(&self, job: &Job) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(&[job_key(&job.id), meta_key(&job.id)])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl WorkerQueue for RedisQueue {
    async fn dequeue(&self, consumer: &str, block: Duration) -> QueueResult<Option<Delivery>> {
        let mut conn = self.connection().await?;

        let reply: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(self.config.stream_key())
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let Some(reply) = reply else {
            return Ok(None);
        };

        for entry in reply.keys.into_iter().flat_map(|k| k.ids) {
            let message_id = entry.id.clone();
            let Some(job_id) = entry.get::<String>("job_id") else {
                warn!(message_id = %message_id, "Stream entry without job id, dropping");
                self.ack(&mut conn, &message_id).await?;
                continue;
            };
            let job_id = JobId::from_string(job_id);
            let key = job_key(&job_id);

            let fields: HashMap<String, Vec<u8>> = conn.hgetall(&key).await?;
            let Some(payload) = fields.get("payload") else {
                warn!(job_id = %job_id, "Job record missing, dropping stream entry");
                self.ack(&mut conn, &message_id).await?;
                continue;
            };

            let job = match serde_json::from_slice::<DownloadClipJob>(payload) {
                Ok(job) => job,
                Err(e) => {
                    warn!(job_id = %job_id, "Failed to parse job payload: {}", e);
                    self.ack(&mut conn, &message_id).await?;
                    continue;
                }
            };

            let result_ttl = field_str(&fields, "result_ttl")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(500));

            let lease_secs = self.config.running_lease.as_secs().max(1) as i64;
            redis::pipe()
                .atomic()
                .hset_multiple(
                    &key,
                    &[
                        ("status", JobStatus::Running.as_str().to_string()),
                        ("started_at", Utc::now().to_rfc3339()),
                    ],
                )
                .ignore()
                .expire(&key, lease_secs)
                .ignore()
                .expire(meta_key(&job_id), lease_secs)
                .ignore()
                .query_async::<()>(&mut conn)
                .await?;

            debug!(job_id = %job_id, consumer, "Dequeued job");
            return Ok(Some(Delivery {
                message_id,
                job,
                result_ttl,
            }));
        }

        Ok(None)
    }

    async fn set_meta(&self, job_id: &JobId, key: &str, value: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let ttl_ms: i64 = conn.pttl(job_key(job_id)).await?;
        if ttl_ms == -2 {
            return Err(QueueError::JobNotFound(job_id.to_string()));
        }

        // The metadata hash lives exactly as long as the record.
        let meta = meta_key(job_id);
        let mut pipe = redis::pipe();
        pipe.atomic().hset(&meta, key, value).ignore();
        if ttl_ms > 0 {
            pipe.pexpire(&meta, ttl_ms).ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn complete(&self, delivery: &Delivery, result: Vec<u8>) -> QueueResult<()> {
        let fields = [
            ("status", JobStatus::Finished.as_str().as_bytes().to_vec()),
            ("result", result),
            ("ended_at", Utc::now().to_rfc3339().into_bytes()),
        ];
        self.finish(delivery, &fields, delivery.result_ttl).await
    }

    async fn fail(&self, delivery: &Delivery, failure: JobFailure) -> QueueResult<()> {
        let fields = [
            ("status", JobStatus::Failed.as_str().as_bytes().to_vec()),
            ("failure", serde_json::to_vec(&failure)?),
            ("ended_at", Utc::now().to_rfc3339().into_bytes()),
        ];
        self.finish(delivery, &fields, self.config.failure_ttl).await
    }
}
