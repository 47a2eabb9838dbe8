//! Coordinator error types.

use std::path::PathBuf;

use thiserror::Error;

use clipq_models::ClipError;
use clipq_queue::QueueError;

pub type CatalogResult<T> = Result<T, CatalogError>;
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Malformed clip catalog. Always fatal to startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog line {line}: {message}")]
    Malformed { line: u64, message: String },

    #[error("Catalog line {line}: {source}")]
    InvalidClip {
        line: u64,
        #[source]
        source: ClipError,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl CatalogError {
    pub fn malformed(line: u64, message: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            message: message.into(),
        }
    }

    /// 1-based line of the offending row, if known.
    pub fn line(&self) -> Option<u64> {
        match self {
            CatalogError::Malformed { line, .. } | CatalogError::InvalidClip { line, .. } => {
                Some(*line)
            }
            CatalogError::Csv(e) => e.position().map(|p| p.line()),
            CatalogError::Read { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to write {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordinatorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}
