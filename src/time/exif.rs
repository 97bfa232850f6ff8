//! EXIF time extraction for images

use super::{ExtractedTime, TimeExtractor, TimeSource, is_placeholder_date};
use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, trace};

/// EXIF date tags with their sub-second companions, in priority order
const DATE_TAGS: &[(Tag, Tag)] = &[
    (Tag::DateTimeOriginal, Tag::SubSecTimeOriginal), // When the original image was taken
    (Tag::DateTimeDigitized, Tag::SubSecTimeDigitized), // When the image was digitized
    (Tag::DateTime, Tag::SubSecTime),                 // File modification date/time
];

/// Reads capture times embedded in image containers
#[derive(Debug, Clone)]
pub struct ExifExtractor {
    extensions: Vec<String>,
}

impl ExifExtractor {
    /// Only files with one of these (lowercase) extensions are opened
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    fn handles(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|x| *x == e))
    }
}

impl TimeExtractor for ExifExtractor {
    fn name(&self) -> &'static str {
        "exif"
    }

    fn extract(&self, path: &Path) -> Option<ExtractedTime> {
        if !self.handles(path) {
            return None;
        }

        let exif = match read_exif(path) {
            Ok(exif) => exif,
            Err(e) => {
                debug!(error = %e, "Failed to read EXIF data");
                return None;
            }
        };

        for (tag, subsec_tag) in DATE_TAGS {
            let Some(field) = exif.get_field(*tag, In::PRIMARY) else {
                continue;
            };
            let raw = field.display_value().to_string();
            if is_placeholder_date(&raw) {
                continue;
            }
            if let Some(datetime) = parse_exif_datetime(&raw) {
                trace!(?path, ?tag, "Found EXIF date");
                let subseconds = exif
                    .get_field(*subsec_tag, In::PRIMARY)
                    .and_then(|f| ascii_value(&f.value));
                return Some(
                    ExtractedTime::new(datetime, TimeSource::Exif).with_subseconds(subseconds),
                );
            }
        }

        None
    }
}

fn read_exif(path: &Path) -> Result<Exif> {
    let unavailable = |message: String| Error::MetadataUnavailable {
        path: path.to_path_buf(),
        message,
    };
    let file = File::open(path).map_err(|e| unavailable(e.to_string()))?;
    let mut reader = BufReader::new(file);
    Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| unavailable(e.to_string()))
}

/// Digits of an ASCII field such as SubSecTimeOriginal
fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts.first().map(|bytes| {
            String::from_utf8_lossy(bytes)
                .trim()
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect()
        }),
        _ => None,
    }
}

/// Parse EXIF datetime string format: "YYYY:MM:DD HH:MM:SS"
fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    // EXIF format: "2024:01:15 14:30:00" or with quotes
    let s = s.trim().trim_matches('"');

    let formats = [
        "%Y:%m:%d %H:%M:%S",
        "%Y:%m:%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
    ];

    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}
