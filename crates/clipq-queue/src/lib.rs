//! Job queue boundary for the clip pipeline.
//!
//! This crate provides:
//! - The coordinator view of the queue (enqueue, refresh, delete)
//! - The worker view of the queue (dequeue, metadata, complete, fail)
//! - A Redis implementation built on hashes and Redis Streams
//! - An in-process implementation for tests and dry runs

pub mod error;
pub mod job;
pub mod memory;
pub mod queue;
pub mod redis_queue;

pub use error::{QueueError, QueueResult};
pub use job::{Delivery, Job, HOSTNAME_META_KEY};
pub use memory::MemoryQueue;
pub use queue::{
    JobQueue, QueueConfig, WorkerQueue, DEFAULT_FAILURE_TTL, DEFAULT_RUNNING_LEASE, LEASE_MARGIN,
};
pub use redis_queue::RedisQueue;
