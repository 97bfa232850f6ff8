//! Configuration types for phockup

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default directory layout: YYYY/MM/DD
pub const DEFAULT_DIR_FORMAT: &str = "%Y/%m/%d";

/// Default file name pattern: YYYYMMDD-HHMMSS
pub const DEFAULT_FILE_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Directory for files without a usable capture time
pub const DEFAULT_UNKNOWN_SEGMENT: &str = "unknown";

/// Upper bound on `-1`, `-2`, ... suffixes tried for one file
pub const DEFAULT_MAX_DISAMBIGUATION_ATTEMPTS: u32 = 1000;

/// File operation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    /// Copy files to destination, leaving the source untouched
    #[default]
    Copy,
    /// Move files to destination (copy-then-delete across filesystems)
    Move,
    /// Create hard links in the destination
    Link,
}

/// Configuration for a sorting run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input files or directories to scan for media files
    pub input_paths: Vec<PathBuf>,

    /// Output directory for organized files
    pub output_dir: PathBuf,

    /// File operation mode
    pub operation: FileOperation,

    /// Directory layout, one chrono format per path segment ("%Y/%m/%d")
    pub dir_format: String,

    /// File name pattern for files with a known capture time
    pub file_format: String,

    /// Keep original file names instead of renaming by capture time
    pub original_names: bool,

    /// Directory name used for files without a capture time
    pub unknown_segment: String,

    /// Maximum number of disambiguation suffixes tried per file
    pub max_disambiguation_attempts: u32,

    /// Dry run mode - report what would happen without touching files
    pub dry_run: bool,

    /// Also query the external `exiftool` binary for capture times
    pub exiftool: bool,

    /// Exiftool date fields, tried in order
    pub date_fields: Vec<String>,

    /// Regex with named groups (year, month, day, hour, minute, second)
    /// used to read a date from file names
    pub date_regex: Option<String>,

    /// Fall back to the file's modification time when no other date exists
    pub file_timestamp_fallback: bool,

    /// File name regexes to exclude
    pub exclude_regex: Vec<String>,

    /// Case-sensitive UNIX glob patterns to exclude
    pub exclude: Vec<String>,

    /// File containing one glob pattern per line to exclude
    pub exclude_file: Option<PathBuf>,

    /// Number of threads for parallel processing (0 = auto)
    pub threads: usize,

    /// Verbose output
    pub verbose: bool,

    /// Supported image extensions
    pub image_extensions: Vec<String>,

    /// Supported video extensions
    pub video_extensions: Vec<String>,

    /// Supported RAW extensions
    pub raw_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_paths: vec![],
            output_dir: PathBuf::from("output"),
            operation: FileOperation::default(),
            dir_format: DEFAULT_DIR_FORMAT.into(),
            file_format: DEFAULT_FILE_FORMAT.into(),
            original_names: false,
            unknown_segment: DEFAULT_UNKNOWN_SEGMENT.into(),
            max_disambiguation_attempts: DEFAULT_MAX_DISAMBIGUATION_ATTEMPTS,
            dry_run: false,
            exiftool: false,
            date_fields: vec![
                "SubSecCreateDate".into(),
                "SubSecDateTimeOriginal".into(),
                "CreateDate".into(),
                "DateTimeOriginal".into(),
            ],
            date_regex: None,
            file_timestamp_fallback: true,
            exclude_regex: vec![r"\.DS_Store".into(), r"Thumbs\.db".into()],
            exclude: vec![],
            exclude_file: None,
            threads: 0, // Auto-detect
            verbose: false,
            image_extensions: vec![
                "jpg".into(), "jpeg".into(), "png".into(), "gif".into(),
                "bmp".into(), "webp".into(), "heic".into(), "heif".into(),
                "avif".into(), "tiff".into(), "tif".into(), "psd".into(),
            ],
            video_extensions: vec![
                "mp4".into(), "mov".into(), "avi".into(), "mkv".into(),
                "wmv".into(), "flv".into(), "m4v".into(), "3gp".into(),
                "mts".into(), "m2ts".into(),
            ],
            raw_extensions: vec![
                "raw".into(), "arw".into(), "cr2".into(), "cr3".into(),
                "nef".into(), "orf".into(), "rw2".into(), "dng".into(),
                "raf".into(), "srw".into(), "pef".into(),
            ],
        }
    }
}

impl Config {
    /// Check if a file extension is a supported image format (RAW included)
    pub fn is_image(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.image_extensions.iter().any(|e| e == &ext_lower)
            || self.raw_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Check if a file extension is a supported video format
    pub fn is_video(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.video_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Check if a file extension is supported
    pub fn is_supported(&self, ext: &str) -> bool {
        self.is_image(ext) || self.is_video(ext)
    }

    /// Check settings that can be verified without touching the filesystem
    ///
    /// Template, regex and glob problems are reported by the types that
    /// compile them.
    pub fn validate(&self) -> Result<()> {
        if self.input_paths.is_empty() {
            return Err(Error::ConfigurationInvalid(
                "no input files or directories were provided".into(),
            ));
        }

        if !self.input_paths.iter().any(|p| p.exists()) {
            return Err(Error::ConfigurationInvalid(
                "there was no valid file or directory on the input".into(),
            ));
        }

        if self.max_disambiguation_attempts == 0 {
            return Err(Error::ConfigurationInvalid(
                "max_disambiguation_attempts must be at least 1".into(),
            ));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::ConfigurationInvalid("output directory is empty".into()));
        }

        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(Error::ConfigurationInvalid(format!(
                "output path {} is not a directory",
                self.output_dir.display()
            )));
        }

        Ok(())
    }

    /// Expand a leading `~` in input and output paths
    pub fn expand_paths(&mut self) {
        for path in &mut self.input_paths {
            *path = expand_tilde(path);
        }
        self.output_dir = expand_tilde(&self.output_dir);
        if let Some(exclude_file) = &self.exclude_file {
            self.exclude_file = Some(expand_tilde(exclude_file));
        }
    }

    /// Create the output directory (unless dry run) and check it is writable
    pub fn ensure_output_dir(&self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }

        fs::create_dir_all(&self.output_dir).map_err(|e| {
            Error::ConfigurationInvalid(format!(
                "cannot create output directory {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;

        tempfile::tempfile_in(&self.output_dir).map_err(|e| {
            Error::ConfigurationInvalid(format!(
                "output directory {} is not writable: {}",
                self.output_dir.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Serialize this configuration as TOML
    pub fn to_toml(&self) -> std::result::Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError { source: e })
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# phockup configuration file
# This file uses TOML format (https://toml.io)

# Input files or directories to scan for media files
input_paths = [
    "~/Pictures/camera",
]

# Output directory for organized files
output_dir = "~/Pictures/sorted"

# File operation: "copy", "move" or "link"
operation = "copy"

# Directory layout, one chrono format per path segment
# - "%Y/%m/%d" -> 2023/04/07 (default)
# - "%Y/%B"    -> 2023/April
# - "%y/%b-%d" -> 23/Apr-07
dir_format = "%Y/%m/%d"

# File name for files with a known capture time (extension is appended)
file_format = "%Y%m%d-%H%M%S"

# Keep original file names, only sort into directories
original_names = false

# Directory for files without any usable date
unknown_segment = "unknown"

# Give up after this many "-1", "-2", ... suffixes for one name
max_disambiguation_attempts = 1000

# Dry run mode - show what would be done without actually doing it
dry_run = false

# Also ask the exiftool binary for dates (needs exiftool in PATH)
exiftool = false
date_fields = ["SubSecCreateDate", "SubSecDateTimeOriginal", "CreateDate", "DateTimeOriginal"]

# Regex with named groups to read dates from file names
# date_regex = '(?P<day>\d{2})\.(?P<month>\d{2})\.(?P<year>\d{4})[_-]?(?P<hour>\d{2})\.(?P<minute>\d{2})\.(?P<second>\d{2})'

# Use the file modification time when nothing else is available
file_timestamp_fallback = true

# Exclusions
exclude_regex = ['\.DS_Store', 'Thumbs\.db']
exclude = ["*.txt"]
# exclude_file = "ignore.txt"

# Number of threads for parallel processing (0 = auto-detect)
threads = 0

# Verbose output - show detailed processing information
verbose = false

image_extensions = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "heic", "heif", "avif", "tiff", "tif", "psd"]
video_extensions = ["mp4", "mov", "avi", "mkv", "wmv", "flv", "m4v", "3gp", "mts", "m2ts"]
raw_extensions = ["raw", "arw", "cr2", "cr3", "nef", "orf", "rw2", "dng", "raf", "srw", "pef"]
"#
        .to_string()
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Errors that can occur when loading or saving configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read configuration file
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse configuration file
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to serialize configuration
    SerializeError {
        source: toml::ser::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
            ConfigError::SerializeError { source } => {
                write!(f, "Failed to serialize config: {}", source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::SerializeError { source } => Some(source),
        }
    }
}
