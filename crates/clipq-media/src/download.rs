//! Stream listing and download using yt-dlp.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::command::check_ytdlp;
use crate::error::{MediaError, MediaResult};
use crate::stream::{StreamHandle, StreamKind, StreamProvider};

/// Browser user agent passed to yt-dlp.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Watch URL for a source id.
pub fn source_url(source_id: &str) -> String {
    format!("https://youtube.com/watch?v={}", source_id)
}

/// Whether yt-dlp output says the video itself is inaccessible.
///
/// Retrying such a clip cannot help: it is removed, private, region-locked,
/// age-restricted, or not a finished upload.
pub fn is_unavailable_message(output: &str) -> bool {
    let msg = output.to_lowercase();

    if msg.contains("age") && (msg.contains("restrict") || msg.contains("verif")) {
        return true;
    }

    const PATTERNS: &[&str] = &[
        "video unavailable",
        "video is unavailable",
        "video not available",
        "private video",
        "video is private",
        "video has been removed",
        "video was deleted",
        "account associated with this video has been terminated",
        "not available in your country",
        "blocked in your country",
        "live stream",
        "live event",
    ];
    if PATTERNS.iter().any(|p| msg.contains(p)) {
        return true;
    }

    (msg.contains("copyright") && msg.contains("block"))
        || (msg.contains("premiere") && msg.contains("will begin"))
}

/// Last non-empty line of tool output, used as a short error message.
fn last_line(output: &str) -> &str {
    output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("Unknown error")
}

#[derive(Debug, Deserialize)]
struct InfoJson {
    #[serde(default)]
    formats: Vec<FormatJson>,
}

#[derive(Debug, Deserialize)]
struct FormatJson {
    format_id: String,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    abr: Option<f64>,
}

impl FormatJson {
    fn into_handle(self) -> Option<StreamHandle> {
        let has = |codec: &Option<String>| codec.as_deref().map_or(false, |c| c != "none");
        let kind = match (has(&self.vcodec), has(&self.acodec)) {
            (true, true) => StreamKind::Combined,
            (true, false) => StreamKind::VideoOnly,
            (false, true) => StreamKind::AudioOnly,
            // storyboards and other non-media entries
            (false, false) => return None,
        };

        Some(StreamHandle {
            tag: self.format_id,
            kind,
            container: self.ext.unwrap_or_else(|| "mp4".to_string()),
            height: self.height,
            audio_bitrate: self.abr,
        })
    }
}

/// Parse the `formats` array of a yt-dlp info JSON document.
pub fn parse_formats(json: &str) -> MediaResult<Vec<StreamHandle>> {
    let info: InfoJson = serde_json::from_str(json)?;
    Ok(info
        .formats
        .into_iter()
        .filter_map(FormatJson::into_handle)
        .collect())
}

/// [`StreamProvider`] backed by the yt-dlp CLI.
#[derive(Debug, Clone, Default)]
pub struct YtDlpProvider {
    cookies_path: Option<PathBuf>,
}

impl YtDlpProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a Netscape cookies file for authentication.
    pub fn with_cookies(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies_path = Some(path.into());
        self
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--user-agent".to_string(),
            USER_AGENT.to_string(),
        ];
        if let Some(cookies) = &self.cookies_path {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().to_string());
        }
        args
    }

    async fn run(&self, args: &[String]) -> MediaResult<std::process::Output> {
        check_ytdlp()?;
        debug!("Running yt-dlp {}", args.join(" "));

        let output = Command::new("yt-dlp")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(output)
    }
}

#[async_trait]
impl StreamProvider for YtDlpProvider {
    async fn list_streams(&self, source_id: &str) -> MediaResult<Vec<StreamHandle>> {
        let url = source_url(source_id);
        let mut args = self.base_args();
        args.push("-J".to_string());
        args.push(url.clone());

        let output = self.run(&args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr);
            let message = last_line(&stderr).to_string();
            if is_unavailable_message(&stderr) {
                return Err(MediaError::content_unavailable(message));
            }
            return Err(MediaError::listing_failed(message));
        }

        let streams = parse_formats(&String::from_utf8_lossy(&output.stdout))?;
        info!(url = %url, num_streams = streams.len(), "Listed streams");
        Ok(streams)
    }

    async fn download(
        &self,
        source_id: &str,
        stream: &StreamHandle,
        dest_dir: &Path,
        stem: &str,
    ) -> MediaResult<PathBuf> {
        let url = source_url(source_id);
        let file_stem = format!("{}.{}", stem, stream.tag);
        let template = dest_dir.join(format!("{}.%(ext)s", file_stem));

        let mut args = self.base_args();
        args.extend([
            "--no-part".to_string(),
            "-f".to_string(),
            stream.tag.clone(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
            url.clone(),
        ]);

        let output = self.run(&args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr);
            return Err(MediaError::download_failed(format!(
                "yt-dlp failed for format {}: {}",
                stream.tag,
                last_line(&stderr)
            )));
        }

        let path = locate_download(dest_dir, &file_stem, &stream.container).await?;
        let size = tokio::fs::metadata(&path).await?.len();
        info!(
            url = %url,
            format = %stream.tag,
            path = %path.display(),
            size_mb = size as f64 / (1024.0 * 1024.0),
            "Downloaded stream"
        );
        Ok(path)
    }
}

/// Find the file yt-dlp wrote for `file_stem`.
async fn locate_download(dest_dir: &Path, file_stem: &str, container: &str) -> MediaResult<PathBuf> {
    let expected = dest_dir.join(format!("{}.{}", file_stem, container));
    if tokio::fs::try_exists(&expected).await? {
        return Ok(expected);
    }

    // The extension may differ from the advertised container
    let prefix = format!("{}.", file_stem);
    let mut entries = tokio::fs::read_dir(dest_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            return Ok(entry.path());
        }
    }

    Err(MediaError::FileNotFound(expected))
}
