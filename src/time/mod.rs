//! Capture time resolution
//!
//! A file's capture time is looked up through an ordered chain of
//! extractors; the first one that yields a date wins:
//! - EXIF metadata in images (JPEG, HEIF, RAW formats)
//! - the external `exiftool` binary (optional)
//! - filename patterns
//! - file system modification time
//!
//! Extraction never fails. Any error inside an extractor means "no date
//! here" and the next extractor is tried; when all of them come up empty
//! the file is `CaptureTime::Unknown`.

pub mod exif;
pub mod exiftool;
pub mod filename;

use crate::config::Config;
use crate::error::Result;
use chrono::{DateTime, Local, NaiveDateTime};
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

pub use self::exif::ExifExtractor;
pub use self::exiftool::ExiftoolExtractor;
pub use self::filename::FilenameExtractor;

/// Source of the extracted timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeSource {
    /// Extracted from embedded EXIF metadata
    Exif,
    /// Reported by exiftool
    Exiftool,
    /// Parsed from filename
    Filename,
    /// From file system modification time
    FileSystem,
}

/// A resolved capture time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTime {
    /// Capture time at second precision
    pub timestamp: NaiveDateTime,
    /// Sub-second digits as recorded by the camera, if any
    pub subseconds: Option<String>,
    /// Source of the timestamp
    pub source: TimeSource,
}

impl ExtractedTime {
    pub fn new(timestamp: NaiveDateTime, source: TimeSource) -> Self {
        Self {
            timestamp,
            subseconds: None,
            source,
        }
    }

    /// Keeps the leading digits only, since they end up in a file name
    pub fn with_subseconds(mut self, subseconds: Option<String>) -> Self {
        self.subseconds = subseconds
            .map(|s| s.chars().take_while(char::is_ascii_digit).collect::<String>())
            .filter(|s| !s.is_empty());
        self
    }
}

/// Capture time of a file, or `Unknown` when nothing usable was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTime {
    Known(ExtractedTime),
    Unknown,
}

impl CaptureTime {
    pub fn known(&self) -> Option<&ExtractedTime> {
        match self {
            CaptureTime::Known(time) => Some(time),
            CaptureTime::Unknown => None,
        }
    }
}

/// One strategy for finding a capture time
pub trait TimeExtractor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Return the capture time, or `None` if this source has nothing
    fn extract(&self, path: &Path) -> Option<ExtractedTime>;
}

/// Falls back to the file's last-modified time
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTimeExtractor;

impl TimeExtractor for FileTimeExtractor {
    fn name(&self) -> &'static str {
        "mtime"
    }

    fn extract(&self, path: &Path) -> Option<ExtractedTime> {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
        let local: DateTime<Local> = modified.into();
        Some(ExtractedTime::new(local.naive_local(), TimeSource::FileSystem))
    }
}

/// Ordered chain of extractors
pub struct TimeResolver {
    extractors: Vec<Box<dyn TimeExtractor>>,
}

impl TimeResolver {
    pub fn new(extractors: Vec<Box<dyn TimeExtractor>>) -> Self {
        Self { extractors }
    }

    /// Build the default chain for a configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut extractors: Vec<Box<dyn TimeExtractor>> = Vec::new();

        let mut exif_extensions = config.image_extensions.clone();
        exif_extensions.extend(config.raw_extensions.iter().cloned());
        extractors.push(Box::new(ExifExtractor::new(exif_extensions)));

        if config.exiftool {
            extractors.push(Box::new(ExiftoolExtractor::new(config.date_fields.clone())));
        }

        let filename = match &config.date_regex {
            Some(pattern) => FilenameExtractor::with_pattern(pattern)?,
            None => FilenameExtractor::default(),
        };
        extractors.push(Box::new(filename));

        if config.file_timestamp_fallback {
            extractors.push(Box::new(FileTimeExtractor));
        }

        Ok(Self::new(extractors))
    }

    /// Resolve the capture time of a file
    pub fn resolve(&self, path: &Path) -> CaptureTime {
        for extractor in &self.extractors {
            if let Some(time) = extractor.extract(path) {
                debug!(
                    ?path,
                    extractor = extractor.name(),
                    timestamp = %time.timestamp,
                    "Resolved capture time"
                );
                return CaptureTime::Known(time);
            }
            trace!(?path, extractor = extractor.name(), "No capture time from extractor");
        }

        debug!(?path, "No capture time found");
        CaptureTime::Unknown
    }
}

/// Reject all-zero camera dates such as "0000:00:00 00:00:00"
pub(crate) fn is_placeholder_date(s: &str) -> bool {
    s.trim().trim_matches('"').starts_with("0000")
}
