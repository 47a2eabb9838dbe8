//! Clip transcode operation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use clipq_models::TranscodeParams;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Output container policy, chosen by the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// H.264 video + AAC audio
    Mp4,
    /// Single still frame
    Jpg,
}

impl OutputFormat {
    /// Resolve the format for `path`, rejecting unsupported extensions.
    pub fn from_path(path: &Path) -> MediaResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("mp4") => Ok(OutputFormat::Mp4),
            Some("jpg") => Ok(OutputFormat::Jpg),
            Some(other) => Err(MediaError::UnsupportedFormat(format!(".{}", other))),
            None => Err(MediaError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Jpg => "jpg",
        }
    }
}

/// Inputs and targets for one transcode.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    /// One combined file, or video then audio
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    /// Clip start in seconds
    pub start: f64,
    /// Clip end in seconds
    pub end: f64,
    pub params: TranscodeParams,
}

impl TranscodeRequest {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Build the FFmpeg command for this request.
    ///
    /// Fails with [`MediaError::UnsupportedFormat`] before anything is spawned.
    pub fn to_command(&self) -> MediaResult<FfmpegCommand> {
        let format = OutputFormat::from_path(&self.output)?;
        if self.inputs.is_empty() || self.inputs.len() > 2 {
            return Err(MediaError::UnsupportedFormat(format!(
                "expected 1 or 2 inputs, got {}",
                self.inputs.len()
            )));
        }

        let duration = self.duration();
        let params = self.params;

        let mut cmd = self
            .inputs
            .iter()
            .fold(FfmpegCommand::new(&self.output), |cmd, input| {
                cmd.input_segment(input, self.start, duration)
            });

        if self.inputs.len() == 2 {
            cmd = cmd.map("0:v:0").map("1:a:0");
        }

        cmd = cmd
            .frame_rate(params.fps)
            .audio_sample_rate(params.sample_rate)
            .video_filter(format!(
                "fps={},scale={}:{}",
                params.fps, params.width, params.height
            ))
            .crf(18)
            .strip_metadata();

        Ok(match format {
            OutputFormat::Mp4 => cmd.video_codec("libx264").audio_codec("aac"),
            OutputFormat::Jpg => cmd.single_frame(),
        })
    }
}

/// Opaque transcode step.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, request: &TranscodeRequest) -> MediaResult<()>;
}

/// [`Transcoder`] that shells out to ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, request: &TranscodeRequest) -> MediaResult<()> {
        let cmd = request.to_command()?;
        let total_secs = request.duration();

        info!(
            inputs = request.inputs.len(),
            output = %request.output.display(),
            start = request.start,
            duration = total_secs,
            "Transcoding clip"
        );

        self.runner
            .run_with_progress(&cmd, move |progress| {
                debug!(
                    percent = progress.percentage(total_secs),
                    speed = progress.speed,
                    "Transcode progress"
                );
            })
            .await?;

        if !tokio::fs::try_exists(&request.output).await? {
            return Err(MediaError::FileNotFound(request.output.clone()));
        }
        Ok(())
    }
}
