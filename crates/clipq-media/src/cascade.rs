//! Stream acquisition cascade.
//!
//! Strategies are tried in a fixed priority order until one yields a usable
//! local file. Each strategy walks its own candidate list:
//!
//! 1. [`Strategy::Direct`]: one known-good combined audio+video format.
//! 2. [`Strategy::Progressive`]: every combined format, mp4 first, tallest first.
//! 3. [`Strategy::Adaptive`]: best separate video-only and audio-only streams.
//!    Disabled unless explicitly enabled.
//!
//! A transient error on one candidate is logged and the next candidate is
//! tried. The cascade only fails once every strategy is exhausted.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use metrics::counter;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::stream::{StreamHandle, StreamKind, StreamProvider};

/// Combined 360p mp4 format; almost always present.
pub const DEFAULT_DIRECT_TAG: &str = "18";

/// One acquisition strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// A single specific combined format
    Direct { tag: String },
    /// All combined formats
    Progressive,
    /// Separate video-only and audio-only streams
    Adaptive,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Direct { .. } => "direct",
            Strategy::Progressive => "progressive",
            Strategy::Adaptive => "adaptive",
        }
    }
}

/// Local media obtained by the cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquiredSource {
    /// One file with both audio and video
    Single(PathBuf),
    /// Separate video and audio files
    Split { video: PathBuf, audio: PathBuf },
}

impl AcquiredSource {
    /// Input files in transcode order (video first).
    pub fn inputs(&self) -> Vec<&Path> {
        match self {
            AcquiredSource::Single(path) => vec![path.as_path()],
            AcquiredSource::Split { video, audio } => vec![video.as_path(), audio.as_path()],
        }
    }
}

/// Ordered set of fallback strategies.
#[derive(Debug, Clone)]
pub struct AcquisitionCascade {
    strategies: Vec<Strategy>,
}

impl Default for AcquisitionCascade {
    fn default() -> Self {
        Self::new(vec![
            Strategy::Direct {
                tag: DEFAULT_DIRECT_TAG.to_string(),
            },
            Strategy::Progressive,
        ])
    }
}

impl AcquisitionCascade {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    /// Replace the tag used by the direct strategy.
    pub fn with_direct_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        for strategy in &mut self.strategies {
            if let Strategy::Direct { tag: current } = strategy {
                *current = tag.clone();
            }
        }
        self
    }

    /// Append or remove the adaptive fallback.
    pub fn with_adaptive(mut self, enabled: bool) -> Self {
        self.strategies.retain(|s| *s != Strategy::Adaptive);
        if enabled {
            self.strategies.push(Strategy::Adaptive);
        }
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Obtain a usable local source for `source_id` inside `dest_dir`.
    ///
    /// Listing errors propagate unchanged; they are not per-candidate.
    pub async fn acquire(
        &self,
        provider: &dyn StreamProvider,
        source_id: &str,
        dest_dir: &Path,
        stem: &str,
    ) -> MediaResult<AcquiredSource> {
        let streams = provider.list_streams(source_id).await?;
        let mut attempt = Attempt {
            provider,
            source_id,
            dest_dir,
            stem,
            tried: HashSet::new(),
        };

        for strategy in &self.strategies {
            debug!(strategy = strategy.name(), source_id, "Trying acquisition strategy");

            let acquired = match strategy {
                Strategy::Direct { tag } => {
                    let candidates: Vec<_> = streams.iter().filter(|s| &s.tag == tag).collect();
                    attempt.first_success(strategy, &candidates).await.map(AcquiredSource::Single)
                }
                Strategy::Progressive => {
                    let candidates = progressive_candidates(&streams);
                    attempt.first_success(strategy, &candidates).await.map(AcquiredSource::Single)
                }
                Strategy::Adaptive => {
                    let (videos, audios) = adaptive_candidates(&streams);
                    match attempt.first_success(strategy, &videos).await {
                        Some(video) => attempt
                            .first_success(strategy, &audios)
                            .await
                            .map(|audio| AcquiredSource::Split { video, audio }),
                        None => None,
                    }
                }
            };

            if let Some(source) = acquired {
                info!(strategy = strategy.name(), source_id, "Acquired media source");
                return Ok(source);
            }

            debug!(strategy = strategy.name(), source_id, "Strategy exhausted");
        }

        Err(MediaError::NoStreamAcquirable {
            source_id: source_id.to_string(),
            attempts: attempt.tried.len(),
        })
    }
}

/// State of one cascade run.
struct Attempt<'a> {
    provider: &'a dyn StreamProvider,
    source_id: &'a str,
    dest_dir: &'a Path,
    stem: &'a str,
    /// Tags already attempted in this run
    tried: HashSet<String>,
}

impl Attempt<'_> {
    /// Download candidates in order, returning the first success.
    async fn first_success(
        &mut self,
        strategy: &Strategy,
        candidates: &[&StreamHandle],
    ) -> Option<PathBuf> {
        for candidate in candidates {
            if !self.tried.insert(candidate.tag.clone()) {
                debug!(format = %candidate.tag, "Skipping already attempted format");
                continue;
            }

            match self
                .provider
                .download(self.source_id, candidate, self.dest_dir, self.stem)
                .await
            {
                Ok(path) => return Some(path),
                Err(e) => {
                    counter!("clipq_stream_candidate_failures_total", "strategy" => strategy.name())
                        .increment(1);
                    warn!(
                        source_id = self.source_id,
                        format = %candidate,
                        transient = e.is_transient(),
                        error = %e,
                        "Stream candidate failed, trying next"
                    );
                }
            }
        }
        None
    }
}

/// Combined streams, mp4 containers first, then tallest first.
fn progressive_candidates(streams: &[StreamHandle]) -> Vec<&StreamHandle> {
    let mut candidates: Vec<_> = streams
        .iter()
        .filter(|s| s.kind == StreamKind::Combined)
        .collect();
    candidates.sort_by(|a, b| {
        let a_mp4 = a.container == "mp4";
        let b_mp4 = b.container == "mp4";
        b_mp4
            .cmp(&a_mp4)
            .then_with(|| b.height.unwrap_or(0).cmp(&a.height.unwrap_or(0)))
    });
    candidates
}

/// Video-only streams tallest first, audio-only streams highest bitrate first.
fn adaptive_candidates(streams: &[StreamHandle]) -> (Vec<&StreamHandle>, Vec<&StreamHandle>) {
    let mut videos: Vec<_> = streams
        .iter()
        .filter(|s| s.kind == StreamKind::VideoOnly)
        .collect();
    videos.sort_by(|a, b| b.height.unwrap_or(0).cmp(&a.height.unwrap_or(0)));

    let mut audios: Vec<_> = streams
        .iter()
        .filter(|s| s.kind == StreamKind::AudioOnly)
        .collect();
    audios.sort_by(|a, b| {
        b.audio_bitrate
            .unwrap_or(0.0)
            .partial_cmp(&a.audio_bitrate.unwrap_or(0.0))
            .unwrap_or(Ordering::Equal)
    });

    (videos, audios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Provider with scripted per-tag outcomes that records every download.
    struct ScriptedProvider {
        streams: Vec<StreamHandle>,
        failing: HashMap<String, bool>,
        listing_error: Option<String>,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(streams: Vec<StreamHandle>) -> Self {
            Self {
                streams,
                failing: HashMap::new(),
                listing_error: None,
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn fail(mut self, tag: &str) -> Self {
            self.failing.insert(tag.to_string(), true);
            self
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StreamProvider for ScriptedProvider {
        async fn list_streams(&self, _source_id: &str) -> MediaResult<Vec<StreamHandle>> {
            match &self.listing_error {
                Some(msg) => Err(MediaError::content_unavailable(msg.clone())),
                None => Ok(self.streams.clone()),
            }
        }

        async fn download(
            &self,
            _source_id: &str,
            stream: &StreamHandle,
            dest_dir: &Path,
            stem: &str,
        ) -> MediaResult<PathBuf> {
            self.attempts.lock().unwrap().push(stream.tag.clone());
            if self.failing.contains_key(&stream.tag) {
                return Err(MediaError::download_failed("HTTP Error 403: Forbidden"));
            }
            Ok(dest_dir.join(format!("{}.{}.{}", stem, stream.tag, stream.container)))
        }
    }

    fn combined(tag: &str, container: &str, height: u32) -> StreamHandle {
        StreamHandle::new(tag, StreamKind::Combined, container).with_height(height)
    }

    fn standard_streams() -> Vec<StreamHandle> {
        vec![
            combined("43", "webm", 360),
            combined("18", "mp4", 360),
            combined("22", "mp4", 720),
            StreamHandle::new("137", StreamKind::VideoOnly, "mp4").with_height(1080),
            StreamHandle::new("136", StreamKind::VideoOnly, "mp4").with_height(720),
            StreamHandle::new("140", StreamKind::AudioOnly, "m4a").with_audio_bitrate(129.0),
            StreamHandle::new("139", StreamKind::AudioOnly, "m4a").with_audio_bitrate(48.0),
        ]
    }

    #[tokio::test]
    async fn test_direct_success_short_circuits() {
        let provider = ScriptedProvider::new(standard_streams());
        let cascade = AcquisitionCascade::default();

        let source = cascade
            .acquire(&provider, "vid", Path::new("/tmp/x"), "clip")
            .await
            .unwrap();

        assert_eq!(source, AcquiredSource::Single(PathBuf::from("/tmp/x/clip.18.mp4")));
        assert_eq!(provider.attempts(), vec!["18"]);
    }

    #[tokio::test]
    async fn test_falls_back_to_progressive() {
        let provider = ScriptedProvider::new(standard_streams()).fail("18").fail("22");
        let cascade = AcquisitionCascade::default();

        let source = cascade
            .acquire(&provider, "vid", Path::new("/tmp/x"), "clip")
            .await
            .unwrap();

        // 18 is not retried by the progressive strategy; mp4 before webm
        assert_eq!(provider.attempts(), vec!["18", "22", "43"]);
        assert_eq!(source, AcquiredSource::Single(PathBuf::from("/tmp/x/clip.43.webm")));
    }

    #[tokio::test]
    async fn test_missing_direct_tag_falls_through() {
        let provider = ScriptedProvider::new(vec![combined("22", "mp4", 720)]);
        let cascade = AcquisitionCascade::default();

        let source = cascade
            .acquire(&provider, "vid", Path::new("/tmp"), "clip")
            .await
            .unwrap();
        assert_eq!(source.inputs(), vec![Path::new("/tmp/clip.22.mp4")]);
    }

    #[tokio::test]
    async fn test_exhaustion_fails_loudly() {
        let provider = ScriptedProvider::new(standard_streams())
            .fail("18")
            .fail("22")
            .fail("43");
        let cascade = AcquisitionCascade::default();

        let err = cascade
            .acquire(&provider, "vid", Path::new("/tmp"), "clip")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MediaError::NoStreamAcquirable { ref source_id, attempts: 3 } if source_id == "vid"
        ));
        // adaptive is disabled by default
        assert!(!provider.attempts().contains(&"137".to_string()));
    }

    #[tokio::test]
    async fn test_adaptive_when_enabled() {
        let provider = ScriptedProvider::new(standard_streams())
            .fail("18")
            .fail("22")
            .fail("43")
            .fail("137")
            .fail("140");
        let cascade = AcquisitionCascade::default().with_adaptive(true);

        let source = cascade
            .acquire(&provider, "vid", Path::new("/tmp"), "clip")
            .await
            .unwrap();

        assert_eq!(
            source,
            AcquiredSource::Split {
                video: PathBuf::from("/tmp/clip.136.mp4"),
                audio: PathBuf::from("/tmp/clip.139.m4a"),
            }
        );
        assert_eq!(source.inputs().len(), 2);
    }

    #[tokio::test]
    async fn test_listing_error_propagates() {
        let mut provider = ScriptedProvider::new(standard_streams());
        provider.listing_error = Some("Video unavailable".to_string());

        let err = AcquisitionCascade::default()
            .acquire(&provider, "vid", Path::new("/tmp"), "clip")
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::ContentUnavailable { .. }));
        assert!(provider.attempts().is_empty());
    }

    #[test]
    fn test_builder_options() {
        let cascade = AcquisitionCascade::default()
            .with_direct_tag("22")
            .with_adaptive(true)
            .with_adaptive(true);
        assert_eq!(
            cascade.strategies(),
            &[
                Strategy::Direct { tag: "22".to_string() },
                Strategy::Progressive,
                Strategy::Adaptive
            ]
        );
        assert_eq!(cascade.with_adaptive(false).strategies().len(), 2);
    }
}
