//! Clip download worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipq_media::{FfmpegTranscoder, YtDlpProvider};
use clipq_queue::{QueueConfig, RedisQueue};
use clipq_worker::{JobExecutor, WorkerConfig, WorkerRunner};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,clipq=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
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

    info!("Starting clipq-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let queue_config = QueueConfig::from_env().with_job_timeout(config.job_timeout);
    let queue = match RedisQueue::new(queue_config) {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.init().await {
        error!("Failed to initialize job queue: {}", e);
        std::process::exit(1);
    }

    let provider = match &config.cookies_path {
        Some(path) => YtDlpProvider::new().with_cookies(path),
        None => YtDlpProvider::new(),
    };
    let transcoder = FfmpegTranscoder::new().with_timeout(config.job_timeout.as_secs());

    let executor = JobExecutor::new(config, Arc::new(provider), Arc::new(transcoder));
    let runner = Arc::new(WorkerRunner::new(Arc::new(queue), executor));

    let signal_runner = Arc::clone(&runner);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_runner.shutdown();
    });

    if let Err(e) = runner.run().await {
        error!("Worker error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
