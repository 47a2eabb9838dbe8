//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// The job record no longer exists (expired or deleted).
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::JobNotFound(_))
    }

    /// Transport failure; the same call may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Redis(_) | QueueError::ConnectionFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(QueueError::JobNotFound("j".into()).is_not_found());
        assert!(QueueError::connection_failed("refused").is_transient());
        assert!(!QueueError::serialization("bad failure record").is_transient());
        assert!(!QueueError::JobNotFound("j".into()).is_transient());
    }
}
