//! Filename timestamp parsing

use super::{ExtractedTime, TimeExtractor, TimeSource};
use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};
use std::path::Path;
use tracing::trace;

/// Pattern: IMG_20160915_123456.jpg, VID-20160915-123456.mp4, PANO_20160915123456.jpg
pub const DEFAULT_FILENAME_PATTERN: &str = r".*[_-](?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})[_-]?(?P<hour>\d{2})(?P<minute>\d{2})(?P<second>\d{2})";

/// Named groups a date regex must provide
const REQUIRED_GROUPS: &[&str] = &["year", "month", "day"];

/// Reads capture times from file names using a regex with named groups
#[derive(Debug, Clone)]
pub struct FilenameExtractor {
    regex: Regex,
}

impl Default for FilenameExtractor {
    fn default() -> Self {
        Self {
            regex: Regex::new(DEFAULT_FILENAME_PATTERN).unwrap(),
        }
    }
}

impl FilenameExtractor {
    /// Use a custom pattern
    ///
    /// The pattern must contain the named groups `year`, `month` and `day`;
    /// `hour`, `minute` and `second` are optional and default to 0.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)?;
        let names: Vec<&str> = regex.capture_names().flatten().collect();
        for group in REQUIRED_GROUPS {
            if !names.contains(group) {
                return Err(Error::ConfigurationInvalid(format!(
                    "date regex '{}' has no named group '{}'",
                    pattern, group
                )));
            }
        }
        Ok(Self { regex })
    }

    /// Parse a timestamp out of a file name
    pub fn parse(&self, filename: &str) -> Option<NaiveDateTime> {
        let caps = self.regex.captures(filename)?;
        let datetime = build_datetime(&caps);
        if datetime.is_some() {
            trace!(filename, "Matched filename date pattern");
        }
        datetime
    }
}

impl TimeExtractor for FilenameExtractor {
    fn name(&self) -> &'static str {
        "filename"
    }

    fn extract(&self, path: &Path) -> Option<ExtractedTime> {
        let filename = path.file_name()?.to_str()?;
        self.parse(filename)
            .map(|ts| ExtractedTime::new(ts, TimeSource::Filename))
    }
}

fn build_datetime(caps: &Captures<'_>) -> Option<NaiveDateTime> {
    let field = |name: &str| -> Option<u32> {
        match caps.name(name) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };

    let year = i32::try_from(field("year")?).ok()?;
    if year == 0 {
        return None;
    }

    NaiveDate::from_ymd_opt(year, field("month")?, field("day")?)?.and_hms_opt(
        field("hour")?,
        field("minute")?,
        field("second")?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_default_pattern() {
        let extractor = FilenameExtractor::default();

        let dt = extractor.parse("IMG_20160915_123456.jpg").unwrap();
        assert_eq!(dt.year(), 2016);
        assert_eq!(dt.month(), 9);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.minute(), 34);
        assert_eq!(dt.second(), 56);

        let dt = extractor.parse("VID-20170102-030405.mp4").unwrap();
        assert_eq!(dt.year(), 2017);

        let dt = extractor.parse("PANO_20170102030405.jpg").unwrap();
        assert_eq!(dt.second(), 5);
    }

    #[test]
    fn test_default_pattern_rejects_invalid_dates() {
        let extractor = FilenameExtractor::default();
        assert!(extractor.parse("IMG_20161345_123456.jpg").is_none());
        assert!(extractor.parse("holiday.jpg").is_none());
        assert!(extractor.parse("IMG_00000000_000000.jpg").is_none());
    }

    #[test]
    fn test_custom_pattern_with_optional_time() {
        let extractor = FilenameExtractor::with_pattern(
            r"(?P<day>\d{2})\.(?P<month>\d{2})\.(?P<year>\d{4})",
        )
        .unwrap();
        let dt = extractor.parse("IMG_27.01.2015.jpg").unwrap();
        assert_eq!(dt.year(), 2015);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 27);
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_custom_pattern_requires_date_groups() {
        let err = FilenameExtractor::with_pattern(r"(?P<year>\d{4})").unwrap_err();
        assert!(matches!(err, Error::ConfigurationInvalid(_)));
        assert!(FilenameExtractor::with_pattern(r"(").is_err());
    }

    #[test]
    fn test_extract_uses_file_name_only() {
        let extractor = FilenameExtractor::default();
        let time = extractor
            .extract(Path::new("/photos/IMG_20160915_123456/holiday.jpg"))
            .map(|t| t.timestamp);
        assert!(time.is_none());
    }
}
