//! Clip catalog parsing.
//!
//! One record per line: `sourceId, start, end, "labels"`. Fields are quoted,
//! whitespace after a delimiter is skipped and there is no header row.
//! Lines starting with `#` are comments.

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use clipq_models::Clip;

use crate::error::{CatalogError, CatalogResult};

/// Ordered clips to process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    clips: Vec<Clip>,
}

impl Catalog {
    pub fn new(clips: Vec<Clip>) -> Self {
        Self { clips }
    }

    /// Read and parse a catalog file.
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse catalog text. The first malformed row aborts parsing.
    pub fn parse(text: &str) -> CatalogResult<Self> {
        let normalized = normalize(text);
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(normalized.as_bytes());

        let mut clips = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.get(0).is_some_and(|f| f.starts_with('#')) {
                continue;
            }
            clips.push(parse_record(&record, line)?);
        }

        debug!(num_clips = clips.len(), "Parsed catalog");
        Ok(Self { clips })
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

impl IntoIterator for Catalog {
    type Item = Clip;
    type IntoIter = std::vec::IntoIter<Clip>;

    fn into_iter(self) -> Self::IntoIter {
        self.clips.into_iter()
    }
}

fn parse_record(record: &StringRecord, line: u64) -> CatalogResult<Clip> {
    if record.len() < 4 {
        return Err(CatalogError::malformed(
            line,
            format!("expected 4 fields, found {}", record.len()),
        ));
    }

    let seconds = |idx: usize, name: &str| -> CatalogResult<f64> {
        let raw = &record[idx];
        raw.parse::<f64>()
            .map_err(|_| CatalogError::malformed(line, format!("invalid {} '{}'", name, raw)))
    };
    let start = seconds(1, "start")?;
    let end = seconds(2, "end")?;

    Clip::new(&record[0], start, end, &record[3])
        .map_err(|source| CatalogError::InvalidClip { line, source })
}

/// Collapse comment lines to a bare `#` and drop whitespace that follows
/// a delimiter outside quotes, so a quote after `, ` still opens a quoted
/// field. Line structure is preserved for error positions.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            out.push('#');
            if line.ends_with('\n') {
                out.push('\n');
            }
            continue;
        }

        let mut in_quotes = false;
        let mut after_delimiter = false;
        for c in line.chars() {
            if after_delimiter && (c == ' ' || c == '\t') {
                continue;
            }
            after_delimiter = false;
            match c {
                '"' => in_quotes = !in_quotes,
                ',' if !in_quotes => after_delimiter = true,
                _ => {}
            }
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUDIOSET: &str = "\
# Segments csv created Sun Mar  5 10:54:31 2017
# num_ytids=22160, num_segs=22160, num_unique_labels=527, num_positive_labels=52882
# YTID, start_seconds, end_seconds, positive_labels
--PJHxphWEs, 30.000, 40.000, \"/m/09x0r,/t/dd00088\"
--ZhevVpy1s, 50.000, 60.000, \"/m/012xff\"
--aE2O5G5WE, 0.000, 10.000, \"/m/03fwl,/m/04rlf,/m/09x0r\"
";

    #[test]
    fn test_parse_audioset_segments() {
        let catalog = Catalog::parse(AUDIOSET).unwrap();
        assert_eq!(catalog.len(), 3);

        let first = &catalog.clips()[0];
        assert_eq!(first.source_id, "--PJHxphWEs");
        assert_eq!(first.start, 30.0);
        assert_eq!(first.end, 40.0);
        assert_eq!(first.labels, "/m/09x0r,/t/dd00088");
        assert_eq!(first.identity().as_str(), "--PJHxphWEs_30.0_40.0");

        assert_eq!(catalog.clips()[2].labels, "/m/03fwl,/m/04rlf,/m/09x0r");
    }

    #[test]
    fn test_fully_quoted_rows() {
        let catalog = Catalog::parse("\"abc\",\"1.5\",\"2.5\",\"x\"\n").unwrap();
        assert_eq!(catalog.clips()[0].start, 1.5);
        assert_eq!(catalog.clips()[0].labels, "x");
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = Catalog::parse("# only comments\n").unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_missing_field_reports_line() {
        let err = Catalog::parse("# header\nabc, 1.0, 2.0, \"x\"\ndef, 1.0\n").unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { .. }));
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_bad_number_is_fatal() {
        let err = Catalog::parse("abc, soon, 2.0, \"x\"\n").unwrap_err();
        assert_eq!(err.line(), Some(1));
        assert!(err.to_string().contains("invalid start"));
    }

    #[test]
    fn test_inverted_range_is_fatal() {
        let err = Catalog::parse("abc, 5.0, 2.0, \"x\"\n").unwrap_err();
        assert!(matches!(err, CatalogError::InvalidClip { line: 1, .. }));
    }

    #[test]
    fn test_normalize_keeps_quoted_spaces() {
        assert_eq!(normalize("a, \"b, c\",  d"), "a,\"b, c\",d");
        assert_eq!(normalize("# x, \"y\n1, 2"), "#\n1,2");
    }
}
