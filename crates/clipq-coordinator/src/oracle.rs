//! Completion oracle.

use std::path::{Path, PathBuf};

use clipq_models::Clip;

/// Decides whether a clip's output already exists.
///
/// A clip is done iff `{save_dir}/{identity}.mp4` exists. This is the only
/// idempotence mechanism: a rerun over the same catalog skips every clip
/// that already has a file.
#[derive(Debug, Clone)]
pub struct CompletionOracle {
    save_dir: PathBuf,
}

impl CompletionOracle {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
        }
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Deterministic output path for `clip`.
    pub fn clip_path(&self, clip: &Clip) -> PathBuf {
        self.save_dir.join(clip.identity().file_name("mp4"))
    }

    pub fn is_done(&self, clip: &Clip) -> bool {
        self.clip_path(clip).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_iff_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = CompletionOracle::new(dir.path());
        let clip = Clip::new("abc", 30.0, 40.0, "").unwrap();

        let path = oracle.clip_path(&clip);
        assert_eq!(path, dir.path().join("abc_30.0_40.0.mp4"));
        assert!(!oracle.is_done(&clip));

        std::fs::write(&path, b"x").unwrap();
        assert!(oracle.is_done(&clip));
        assert!(oracle.is_done(&clip));
    }
}
