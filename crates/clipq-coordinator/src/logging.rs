//! Tracing subscriber setup.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::CoordinatorResult;

/// Install the global subscriber.
///
/// Colored text by default, JSON when `LOG_FORMAT=json`. With `log_path`
/// every event is also appended to that file as plain text.
pub fn init_tracing(log_path: Option<&Path>) -> CoordinatorResult<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,clipq=info"));

    let file_layer = match log_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    if use_json {
        tracing_subscriber::registry()
            .with(file_layer)
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(file_layer)
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_mirrored_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.log");

        init_tracing(Some(&path)).unwrap();
        tracing::info!(job_id = "j-1", "queued job");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("queued job"));
        assert!(contents.contains("j-1"));
    }
}
