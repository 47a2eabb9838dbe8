//! Clip job coordinator binary.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use clipq_coordinator::{logging, metrics, Catalog, Cli, CoordinatorConfig, Dispatcher};
use clipq_queue::RedisQueue;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = CoordinatorConfig::try_from(Cli::parse())?;
    logging::init_tracing(config.log_path.as_deref())?;

    if let Some(addr) = config.metrics_addr {
        metrics::init_metrics(addr)?;
        info!(%addr, "Serving metrics");
    }

    let catalog = Catalog::load(&config.catalog_path)
        .with_context(|| format!("loading catalog {}", config.catalog_path.display()))?;
    info!(num_clips = catalog.len(), "loaded catalog");

    tokio::fs::create_dir_all(&config.save_dir)
        .await
        .with_context(|| format!("creating save dir {}", config.save_dir.display()))?;

    let queue = RedisQueue::new(config.queue.clone())?;
    queue.init().await?;

    let dispatcher = Dispatcher::new(config, Arc::new(queue));
    match dispatcher.run(catalog).await {
        Ok(summary) => {
            info!(
                submitted = summary.submitted,
                peak_in_flight = summary.peak_in_flight,
                "Coordinator finished"
            );
            Ok(())
        }
        Err(e) => {
            error!("Coordinator aborted: {}", e);
            Err(e.into())
        }
    }
}
