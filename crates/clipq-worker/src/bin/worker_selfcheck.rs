use std::path::Path;

use clipq_worker::{host_identity, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting on {} with work_dir={}",
        host_identity(),
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tools()?;
    ensure_env_present(&["REDIS_URL"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let scratch = tempfile::NamedTempFile::new_in(path)
        .map_err(|e| anyhow::anyhow!("work dir {} not writable: {}", path.display(), e))?;
    drop(scratch);
    Ok(())
}

fn ensure_tools() -> anyhow::Result<()> {
    let ffmpeg = clipq_media::check_ffmpeg()?;
    println!("worker-selfcheck: ffmpeg at {}", ffmpeg.display());
    let ytdlp = clipq_media::check_ytdlp()?;
    println!("worker-selfcheck: yt-dlp at {}", ytdlp.display());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
