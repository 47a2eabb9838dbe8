//! Clip descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised when a clip descriptor is invalid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClipError {
    #[error("source id is empty")]
    EmptySourceId,

    #[error("clip bounds are not finite: start={start}, end={end}")]
    NonFinite { start: f64, end: f64 },

    #[error("clip end ({end}) must be greater than start ({start})")]
    EmptyRange { start: f64, end: f64 },
}

/// A time-bounded segment of a source video.
///
/// Clips are immutable once constructed; every downstream component reads
/// them by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Source video id (e.g. a YouTube video id)
    pub source_id: String,
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds
    pub end: f64,
    /// Opaque label passthrough
    #[serde(default)]
    pub labels: String,
}

impl Clip {
    /// Create a validated clip.
    pub fn new(
        source_id: impl Into<String>,
        start: f64,
        end: f64,
        labels: impl Into<String>,
    ) -> Result<Self, ClipError> {
        let source_id = source_id.into();
        if source_id.is_empty() {
            return Err(ClipError::EmptySourceId);
        }
        if !start.is_finite() || !end.is_finite() {
            return Err(ClipError::NonFinite { start, end });
        }
        if end <= start {
            return Err(ClipError::EmptyRange { start, end });
        }

        Ok(Self {
            source_id,
            start,
            end,
            labels: labels.into(),
        })
    }

    /// Clip duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Deterministic identity derived from `(source_id, start, end)`.
    pub fn identity(&self) -> ClipIdentity {
        ClipIdentity(format!(
            "{}_{}_{}",
            self.source_id,
            float_repr(self.start),
            float_repr(self.end)
        ))
    }
}

/// Shortest round-trip rendering with a signed, two-digit exponent
/// (`1e+16`, `1.5e-07`), matching the names existing datasets use.
fn float_repr(value: f64) -> String {
    let repr = format!("{:?}", value);
    match repr.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => repr,
    }
}

impl fmt::Display for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity())
    }
}

/// Textual clip identity, used as output filename stem and dedup key.
///
/// Floats render in their shortest round-trip form with at least one
/// fractional digit, so `30` becomes `30.0`. Magnitudes below `1e-4` or
/// from `1e16` up use exponent form (`1e+16`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipIdentity(String);

impl ClipIdentity {
    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name for an artifact of this clip with the given extension.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0, extension)
    }
}

impl fmt::Display for ClipIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
