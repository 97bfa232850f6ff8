//! Input discovery
//!
//! Walks input directories (and accepts individual files), drops anything
//! that is not a supported media file or matches an exclusion rule, and
//! returns the result sorted by path so runs process files in a fixed order.

use crate::config::Config;
use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Compiled exclusion rules, matched against file names
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    regexes: Vec<Regex>,
    globs: Vec<Pattern>,
}

impl Exclusions {
    pub fn new(regexes: &[String], globs: &[String]) -> Result<Self> {
        Ok(Self {
            regexes: regexes
                .iter()
                .map(|r| Regex::new(&format!("^(?:{})", r)))
                .collect::<std::result::Result<_, _>>()?,
            globs: globs
                .iter()
                .map(|g| Pattern::new(g))
                .collect::<std::result::Result<_, _>>()?,
        })
    }

    /// Compile the rules of a configuration, including its exclusion file
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut globs = config.exclude.clone();

        if let Some(exclude_file) = &config.exclude_file {
            let content = fs::read_to_string(exclude_file).map_err(|e| {
                Error::ConfigurationInvalid(format!(
                    "cannot read exclusion file {}: {}",
                    exclude_file.display(),
                    e
                ))
            })?;
            globs.extend(
                content
                    .lines()
                    .map(str::trim_end)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }

        Self::new(&config.exclude_regex, &globs)
    }

    /// Regexes match from the start of the name; globs are case-sensitive
    pub fn is_excluded(&self, file_name: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        if let Some(regex) = self.regexes.iter().find(|r| r.is_match(file_name)) {
            debug!(file_name, pattern = regex.as_str(), "Excluded by regex");
            return true;
        }
        if let Some(glob) = self.globs.iter().find(|g| g.matches_with(file_name, options)) {
            debug!(file_name, pattern = glob.as_str(), "Excluded by pattern");
            return true;
        }
        false
    }
}

/// Collect all media files from the configured inputs, sorted by path
pub fn collect_files(config: &Config, exclusions: &Exclusions) -> Vec<PathBuf> {
    let output_dir = fs::canonicalize(&config.output_dir).unwrap_or_else(|_| config.output_dir.clone());
    let mut files = Vec::new();

    let accept = |path: &Path| -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(?path, "Skipping file with a non UTF-8 name");
            return false;
        };
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        if ext.eq_ignore_ascii_case("xmp") || !config.is_supported(ext) {
            return false;
        }
        !exclusions.is_excluded(file_name)
    };

    for input in &config.input_paths {
        if input.is_file() {
            if accept(input) {
                files.push(input.clone());
            }
            continue;
        }
        if !input.is_dir() {
            warn!(?input, "Input is not a regular file or directory, skipping");
            continue;
        }

        for entry in WalkDir::new(input)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_output_dir(e.path(), &output_dir))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable input entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && accept(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files.dedup();

    info!(count = files.len(), "Found media files");
    files
}

fn is_output_dir(path: &Path, output_dir: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    let excluded = fs::canonicalize(path).is_ok_and(|p| p == output_dir);
    if excluded {
        debug!(?path, "Not descending into the output directory");
    }
    excluded
}
