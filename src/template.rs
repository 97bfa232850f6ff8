//! Destination naming
//!
//! A [`NamingTemplate`] turns a capture time into a relative directory
//! (one chrono format per path segment) and a base file name. Files with an
//! unknown capture time go into a single fallback directory and keep their
//! original name.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::time::CaptureTime;
use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::warn;

/// Separator between a base name and its disambiguation counter
pub const COUNTER_SEPARATOR: char = '-';

/// Relative destination of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub dir_parts: Vec<String>,
    pub base_name: String,
}

impl Placement {
    pub fn relative_dir(&self) -> PathBuf {
        self.dir_parts.iter().collect()
    }

    pub fn relative_path(&self) -> PathBuf {
        self.relative_dir().join(&self.base_name)
    }
}

/// Directory layout plus file name pattern
#[derive(Debug, Clone)]
pub struct NamingTemplate {
    dir_segments: Vec<String>,
    file_format: String,
    unknown_segment: String,
    original_names: bool,
}

impl NamingTemplate {
    /// Parse and check a template
    ///
    /// Every directory segment and the file pattern must be valid chrono
    /// format strings whose output can never escape the destination root.
    pub fn new(
        dir_format: &str,
        file_format: &str,
        unknown_segment: &str,
        original_names: bool,
    ) -> Result<Self> {
        let dir_segments: Vec<String> = dir_format
            .replace('\\', "/")
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        for segment in &dir_segments {
            check_format(segment, dir_format)?;
        }
        check_format(file_format, file_format)?;

        if !is_safe_component(unknown_segment) {
            return Err(Error::ConfigurationInvalid(format!(
                "unknown directory name '{}' must be a single path segment",
                unknown_segment
            )));
        }

        Ok(Self {
            dir_segments,
            file_format: file_format.to_string(),
            unknown_segment: unknown_segment.to_string(),
            original_names,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.dir_format,
            &config.file_format,
            &config.unknown_segment,
            config.original_names,
        )
    }

    /// Compute the relative directory and base name for a file
    pub fn build(&self, time: &CaptureTime, original_name: &str) -> Placement {
        match time {
            CaptureTime::Known(extracted) => {
                let ts = &extracted.timestamp;
                let dir_parts = self
                    .dir_segments
                    .iter()
                    .map(|segment| ts.format(segment).to_string())
                    .collect();

                let base_name = if self.original_names {
                    original_name.to_string()
                } else {
                    let mut name = ts.format(&self.file_format).to_string();
                    if let Some(subseconds) = &extracted.subseconds {
                        if subseconds.bytes().all(|b| b.is_ascii_digit()) {
                            name.push_str(subseconds);
                        } else {
                            warn!(subseconds, "Ignoring subseconds that are not digits");
                        }
                    }
                    if let Some(ext) = normalized_extension(original_name) {
                        name.push('.');
                        name.push_str(&ext);
                    }
                    name
                };

                Placement {
                    dir_parts,
                    base_name,
                }
            }
            CaptureTime::Unknown => Placement {
                dir_parts: vec![self.unknown_segment.clone()],
                base_name: original_name.to_string(),
            },
        }
    }
}

/// Insert a counter before the extension: `a.jpg` -> `a-1.jpg`
pub fn with_counter(base_name: &str, counter: u32) -> String {
    let path = Path::new(base_name);
    match (path.file_stem().and_then(|s| s.to_str()), path.extension().and_then(|e| e.to_str())) {
        (Some(stem), Some(ext)) => format!("{}{}{}.{}", stem, COUNTER_SEPARATOR, counter, ext),
        _ => format!("{}{}{}", base_name, COUNTER_SEPARATOR, counter),
    }
}

/// Lowercase extension of a file name, if it has one
pub fn normalized_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase)
}

/// Translate the human directory format (`YYYY/MM/DD`) into chrono syntax
///
/// `YYYY` 2016, `YY` 16, `MM` 07, `M` July, `m` Jul, `DDD` day of year,
/// `DD` day of month. Other characters are kept literally.
pub fn translate_human_format(format: &str) -> String {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    let tokens = TOKENS.get_or_init(|| Regex::new(r"YYYY|YY|DDD|DD|MM|M|m").unwrap());

    tokens
        .replace_all(&format.replace('\\', "/"), |caps: &regex::Captures<'_>| {
            match &caps[0] {
                "YYYY" => "%Y",
                "YY" => "%y",
                "DDD" => "%j",
                "DD" => "%d",
                "MM" => "%m",
                "M" => "%B",
                _ => "%b",
            }
        })
        .into_owned()
}

fn check_format(format: &str, context: &str) -> Result<()> {
    let invalid = |message: &str| {
        Error::ConfigurationInvalid(format!("naming template '{}': {}", context, message))
    };

    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(invalid("invalid date format specifier"));
    }

    // Specifiers such as %z need a time zone a capture time does not carry
    for sample in sample_dates() {
        let mut rendered = String::new();
        write!(rendered, "{}", sample.format(format))
            .map_err(|_| invalid("uses a specifier that needs a time zone"))?;
        if !is_safe_component(&rendered) {
            return Err(invalid(&format!(
                "renders to '{}', which is not a single path segment",
                rendered
            )));
        }
    }

    Ok(())
}

/// Dates covering short and long month/day names and single-digit fields
fn sample_dates() -> [NaiveDateTime; 3] {
    let at = |y, m, d, h, min, s| {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, s))
            .unwrap_or_default()
    };
    [
        at(2023, 4, 7, 10, 15, 0),
        at(1999, 12, 31, 23, 59, 59),
        at(2008, 9, 3, 1, 2, 3),
    ]
}

fn is_safe_component(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && !s.contains('/')
        && !s.contains('\\')
        && !s.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_DIR_FORMAT, DEFAULT_FILE_FORMAT};
    use crate::time::{ExtractedTime, TimeSource};

    fn default_template() -> NamingTemplate {
        NamingTemplate::new(DEFAULT_DIR_FORMAT, DEFAULT_FILE_FORMAT, "unknown", false).unwrap()
    }

    fn known(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> CaptureTime {
        let ts = NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap();
        CaptureTime::Known(ExtractedTime::new(ts, TimeSource::Exif))
    }

    #[test]
    fn test_known_time_placement() {
        let placement = default_template().build(&known(2023, 4, 7, 10, 15, 0), "DSC0001.JPG");
        assert_eq!(placement.dir_parts, vec!["2023", "04", "07"]);
        assert_eq!(placement.base_name, "20230407-101500.jpg");
        assert_eq!(
            placement.relative_path(),
            PathBuf::from("2023/04/07/20230407-101500.jpg")
        );
    }

    #[test]
    fn test_unknown_time_keeps_original_name() {
        let placement = default_template().build(&CaptureTime::Unknown, "Holiday Pic.JPG");
        assert_eq!(placement.dir_parts, vec!["unknown"]);
        assert_eq!(placement.base_name, "Holiday Pic.JPG");
    }

    #[test]
    fn test_subseconds_are_appended() {
        let CaptureTime::Known(time) = known(2017, 1, 1, 1, 1, 1) else {
            unreachable!()
        };
        let time = CaptureTime::Known(time.with_subseconds(Some("20".into())));
        let placement = default_template().build(&time, "a.jpg");
        assert_eq!(placement.base_name, "20170101-01010120.jpg");
    }

    #[test]
    fn test_original_names_and_no_extension() {
        let template =
            NamingTemplate::new("%Y/%m", DEFAULT_FILE_FORMAT, "unknown", true).unwrap();
        let placement = template.build(&known(2011, 7, 17, 0, 0, 0), "IMG_1.JPG");
        assert_eq!(placement.dir_parts, vec!["2011", "07"]);
        assert_eq!(placement.base_name, "IMG_1.JPG");

        let placement = default_template().build(&known(2011, 7, 17, 0, 0, 0), "README");
        assert_eq!(placement.base_name, "20110717-000000");
    }

    #[test]
    fn test_build_is_deterministic() {
        let template = default_template();
        let time = known(2020, 2, 29, 23, 59, 59);
        assert_eq!(template.build(&time, "x.mov"), template.build(&time, "x.mov"));
    }

    #[test]
    fn test_with_counter() {
        assert_eq!(with_counter("20230407-101500.jpg", 1), "20230407-101500-1.jpg");
        assert_eq!(with_counter("archive.tar.gz", 2), "archive.tar-2.gz");
        assert_eq!(with_counter("noext", 3), "noext-3");
    }

    #[test]
    fn test_templates_cannot_escape_destination() {
        assert!(NamingTemplate::new("%Y/../%m", DEFAULT_FILE_FORMAT, "unknown", false).is_err());
        assert!(NamingTemplate::new("%D", DEFAULT_FILE_FORMAT, "unknown", false).is_err());
        assert!(NamingTemplate::new("%Y", "%Y/%m", "unknown", false).is_err());
        assert!(NamingTemplate::new("%Y", DEFAULT_FILE_FORMAT, "..", false).is_err());
        assert!(NamingTemplate::new("%Y", DEFAULT_FILE_FORMAT, "a/b", false).is_err());
        assert!(NamingTemplate::new("%Y", "", "unknown", false).is_err());
        assert!(NamingTemplate::new("%Q", DEFAULT_FILE_FORMAT, "unknown", false).is_err());
    }

    #[test]
    fn test_time_zone_specifiers_are_rejected() {
        for format in ["%z", "%Z", "%:z", "%Y%z"] {
            let err = NamingTemplate::new(format, DEFAULT_FILE_FORMAT, "unknown", false).unwrap_err();
            assert!(err.is_fatal(), "{format}");
            let err = NamingTemplate::new(DEFAULT_DIR_FORMAT, format, "unknown", false).unwrap_err();
            assert!(err.is_fatal(), "{format}");
        }
    }

    #[test]
    fn test_subseconds_cannot_add_path_segments() {
        let CaptureTime::Known(time) = known(2017, 1, 1, 1, 1, 1) else {
            unreachable!()
        };
        let time = CaptureTime::Known(ExtractedTime {
            subseconds: Some("/../../../../tmp/evil".into()),
            ..time
        });
        let placement = default_template().build(&time, "a.jpg");
        assert_eq!(placement.base_name, "20170101-010101.jpg");
        assert_eq!(placement.relative_path(), PathBuf::from("2017/01/01/20170101-010101.jpg"));
    }

    #[test]
    fn test_leading_separator_stays_relative() {
        let template = NamingTemplate::new("/%Y//%m", DEFAULT_FILE_FORMAT, "unknown", false).unwrap();
        let placement = template.build(&known(2023, 4, 7, 0, 0, 0), "a.jpg");
        assert_eq!(placement.dir_parts, vec!["2023", "04"]);
        assert!(placement.relative_path().is_relative());
    }

    #[test]
    fn test_translate_human_format() {
        assert_eq!(translate_human_format("YYYY/MM/DD"), "%Y/%m/%d");
        assert_eq!(translate_human_format("YYYY/M/DD"), "%Y/%B/%d");
        assert_eq!(translate_human_format("YY/m-DD"), "%y/%b-%d");
        assert_eq!(translate_human_format("YYYY\\DDD"), "%Y/%j");

        let template =
            NamingTemplate::new(&translate_human_format("YYYY/m/DD"), DEFAULT_FILE_FORMAT, "unknown", false)
                .unwrap();
        let placement = template.build(&known(2011, 7, 17, 0, 0, 0), "a.jpg");
        assert_eq!(placement.dir_parts, vec!["2011", "Jul", "17"]);
    }
}
