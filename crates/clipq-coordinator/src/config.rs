//! Coordinator configuration and command line.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use clipq_models::TranscodeParams;
use clipq_queue::QueueConfig;

use crate::error::{CoordinatorError, CoordinatorResult};

/// Queue clip download jobs and collect their results.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Queue clip download jobs and save their results", long_about = None)]
pub struct Cli {
    /// Redis URL of the job queue
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    pub redis_url: String,

    /// Queue name
    #[arg(long, env = "QUEUE_NAME", default_value = "default")]
    pub queue: String,

    /// Clip catalog (CSV)
    #[arg(long)]
    pub csv: PathBuf,

    /// Seconds a finished result stays fetchable
    #[arg(long, default_value_t = 120)]
    pub ttl: u64,

    /// Directory receiving `{identity}.mp4` files; created if absent
    #[arg(long)]
    pub save_dir: PathBuf,

    /// Also write logs to this file
    #[arg(long)]
    pub log_path: Option<PathBuf>,

    /// Maximum jobs in flight
    #[arg(long, default_value_t = 32)]
    pub max_jobs: usize,

    /// Idle wait when at capacity, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub backoff_ms: u64,

    /// Output width (negative: auto, preserve aspect)
    #[arg(long, default_value_t = -2, allow_negative_numbers = true)]
    pub width: i32,

    /// Output height (negative: auto, preserve aspect)
    #[arg(long, default_value_t = -2, allow_negative_numbers = true)]
    pub height: i32,

    /// Output frame rate
    #[arg(long, default_value_t = 16)]
    pub fps: u32,

    /// Output audio sample rate
    #[arg(long, default_value_t = 16000)]
    pub sample_rate: u32,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

/// Explicit configuration handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub queue: QueueConfig,
    pub catalog_path: PathBuf,
    pub save_dir: PathBuf,
    pub log_path: Option<PathBuf>,
    /// Result retention requested for every job
    pub result_ttl: Duration,
    pub max_in_flight: usize,
    /// Idle wait when at capacity
    pub backoff: Duration,
    pub params: TranscodeParams,
    pub metrics_addr: Option<SocketAddr>,
}

impl CoordinatorConfig {
    /// Config with defaults for everything but the catalog and save dir.
    pub fn new(catalog_path: impl Into<PathBuf>, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue: QueueConfig::default(),
            catalog_path: catalog_path.into(),
            save_dir: save_dir.into(),
            log_path: None,
            result_ttl: Duration::from_secs(120),
            max_in_flight: 32,
            backoff: Duration::from_millis(2000),
            params: TranscodeParams::default(),
            metrics_addr: None,
        }
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn validate(&self) -> CoordinatorResult<()> {
        if self.max_in_flight == 0 {
            return Err(CoordinatorError::config("max in-flight jobs must be at least 1"));
        }
        if self.params.fps == 0 || self.params.sample_rate == 0 {
            return Err(CoordinatorError::config("fps and sample rate must be positive"));
        }
        Ok(())
    }
}

impl TryFrom<Cli> for CoordinatorConfig {
    type Error = CoordinatorError;

    fn try_from(cli: Cli) -> CoordinatorResult<Self> {
        let config = Self {
            queue: QueueConfig::from_env()
                .with_redis_url(cli.redis_url)
                .with_queue_name(cli.queue),
            catalog_path: cli.csv,
            save_dir: cli.save_dir,
            log_path: cli.log_path,
            result_ttl: Duration::from_secs(cli.ttl),
            max_in_flight: cli.max_jobs,
            backoff: Duration::from_millis(cli.backoff_ms),
            params: TranscodeParams {
                width: cli.width,
                height: cli.height,
                fps: cli.fps,
                sample_rate: cli.sample_rate,
            },
            metrics_addr: cli.metrics_addr,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from([
            "clipq-coordinator",
            "--csv",
            "segments.csv",
            "--save-dir",
            "out",
            "--redis-url",
            "redis://queue:6379",
        ])
        .unwrap();
        let config = CoordinatorConfig::try_from(cli).unwrap();

        assert_eq!(config.queue.redis_url, "redis://queue:6379");
        assert_eq!(config.result_ttl, Duration::from_secs(120));
        assert_eq!(config.max_in_flight, 32);
        assert_eq!(config.backoff, Duration::from_millis(2000));
        assert_eq!(config.params, TranscodeParams::default());
        assert!(config.log_path.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "clipq-coordinator",
            "--csv",
            "segments.csv",
            "--save-dir",
            "out",
            "--queue",
            "audioset",
            "--max-jobs",
            "4",
            "--width",
            "-1",
            "--height",
            "224",
            "--log-path",
            "run.log",
        ])
        .unwrap();
        let config = CoordinatorConfig::try_from(cli).unwrap();

        assert_eq!(config.queue.stream_key(), "clipq:queue:audioset");
        assert_eq!(config.max_in_flight, 4);
        assert_eq!((config.params.width, config.params.height), (-1, 224));
        assert_eq!(config.log_path, Some(PathBuf::from("run.log")));
    }

    #[test]
    fn test_save_dir_is_required() {
        assert!(Cli::try_parse_from(["clipq-coordinator", "--csv", "a.csv"]).is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CoordinatorConfig::new("a.csv", "out").with_max_in_flight(0);
        assert!(matches!(config.validate(), Err(CoordinatorError::Config(_))));
    }
}
