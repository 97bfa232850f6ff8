//! Capture time extraction through the external `exiftool` binary
//!
//! Covers containers the built-in EXIF reader does not understand (most
//! video formats, PSD). Dates are read from a configurable list of fields
//! and taken as local wall-clock time; any UTC offset suffix is dropped.

use super::{ExtractedTime, TimeExtractor, TimeSource, is_placeholder_date};
use chrono::NaiveDateTime;
use regex::Regex;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, trace, warn};

/// Cached availability check for exiftool
static EXIFTOOL_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Trailing "+HH:MM" / "-HH:MM" offset
static OFFSET_SUFFIX: OnceLock<Regex> = OnceLock::new();

fn offset_suffix() -> &'static Regex {
    OFFSET_SUFFIX.get_or_init(|| Regex::new(r"^(.*?)([+-]\d{2}:\d{2})$").expect("valid regex"))
}

/// Check if exiftool is available (cached)
fn is_exiftool_available() -> bool {
    *EXIFTOOL_AVAILABLE.get_or_init(|| {
        let available = Command::new("exiftool").arg("-ver").output().is_ok();
        if !available {
            warn!("exiftool not found in PATH, skipping exiftool date lookup");
        }
        available
    })
}

/// Queries exiftool for the configured date fields
#[derive(Debug, Clone)]
pub struct ExiftoolExtractor {
    date_fields: Vec<String>,
}

impl ExiftoolExtractor {
    pub fn new(date_fields: Vec<String>) -> Self {
        Self { date_fields }
    }

    fn run(&self, path: &Path) -> Option<serde_json::Value> {
        let output = Command::new("exiftool")
            .args(["-time:all", "-mimetype", "-json"])
            .arg(path)
            .output()
            .map_err(|e| debug!(?path, error = %e, "Failed to execute exiftool"))
            .ok()?;

        if !output.status.success() {
            debug!(
                ?path,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "exiftool failed"
            );
            return None;
        }

        trace!(?path, "exiftool output: {}", String::from_utf8_lossy(&output.stdout));

        // exiftool prints a one-element array per file
        let json: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| debug!(?path, error = %e, "Failed to parse exiftool JSON"))
            .ok()?;
        json.as_array()?.first().cloned()
    }

    /// Pick the first configured field holding a valid date
    fn date_from_metadata(&self, metadata: &serde_json::Value) -> Option<ExtractedTime> {
        self.date_fields.iter().find_map(|field| {
            let value = metadata.get(field)?.as_str()?;
            if is_placeholder_date(value) {
                return None;
            }
            let (timestamp, subseconds) = parse_exiftool_date(value)?;
            Some(ExtractedTime::new(timestamp, TimeSource::Exiftool).with_subseconds(subseconds))
        })
    }
}

impl TimeExtractor for ExiftoolExtractor {
    fn name(&self) -> &'static str {
        "exiftool"
    }

    fn extract(&self, path: &Path) -> Option<ExtractedTime> {
        if !is_exiftool_available() {
            return None;
        }
        let metadata = self.run(path)?;
        self.date_from_metadata(&metadata)
    }
}

/// Parse "YYYY:MM:DD HH:MM:SS[.sub][+HH:MM]" into a timestamp and subseconds
pub fn parse_exiftool_date(value: &str) -> Option<(NaiveDateTime, Option<String>)> {
    let value = value.trim();
    let (date, subseconds) = match value.split_once('.') {
        Some((date, rest)) => (date, Some(rest)),
        None => (value, None),
    };

    let strip_offset = |s: &str| -> String {
        match offset_suffix().captures(s) {
            Some(caps) => caps[1].to_string(),
            None => s.to_string(),
        }
    };

    let date = strip_offset(date);
    let timestamp = NaiveDateTime::parse_from_str(&date, "%Y:%m:%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&date, "%Y-%m-%d %H:%M:%S"))
        .ok()?;

    // Only the leading digits are subseconds; the rest is an offset or junk
    let subseconds = subseconds
        .map(|s| s.chars().take_while(char::is_ascii_digit).collect::<String>())
        .filter(|s| !s.is_empty());
    Some((timestamp, subseconds))
}
