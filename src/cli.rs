//! CLI argument parsing with clap

use crate::config::{Config, FileOperation};
use crate::template::translate_human_format;
use clap::Parser;
use std::path::PathBuf;

/// phockup - organize photos and videos by capture date
///
/// Copies (or moves, or hard-links) media files into a YYYY/MM/DD tree and
/// renames them after their capture time, read from EXIF data, file names
/// or file system timestamps. Re-running over the same inputs never
/// duplicates or overwrites anything.
#[derive(Parser, Debug)]
#[command(name = "phockup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Input files or directories followed by the output directory
    ///
    /// May be omitted when the configuration file names both.
    #[arg(value_name = "INPUT... OUTPUT", num_args = 2..)]
    pub paths: Vec<PathBuf>,

    /// Path to configuration file (TOML format)
    ///
    /// When specified, settings from the config file are used as defaults.
    /// CLI arguments will override config file settings.
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Move files instead of copying them
    #[arg(short = 'm', long = "move", conflicts_with = "link")]
    pub move_files: bool,

    /// Hard-link files instead of copying them
    #[arg(short = 'l', long)]
    pub link: bool,

    /// Directory layout in human form, e.g. YYYY/MM/DD, YYYY/M, YYYY/DDD
    #[arg(short = 'd', long = "date", conflicts_with = "dir_format")]
    pub date: Option<String>,

    /// Directory layout as chrono format segments, e.g. %Y/%m-%b
    #[arg(long)]
    pub dir_format: Option<String>,

    /// File name pattern as a chrono format, e.g. %Y%m%d-%H%M%S
    #[arg(long)]
    pub file_format: Option<String>,

    /// Keep original file names, only sort into directories
    #[arg(short = 'o', long)]
    pub original_names: bool,

    /// Directory name for files without a capture time
    #[arg(long = "unknown-dir")]
    pub unknown_dir: Option<String>,

    /// Maximum number of -N suffixes tried before a file is skipped
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Dry run mode - show what would be done without doing it
    #[arg(short = 'y', long)]
    pub dry_run: bool,

    /// Also ask the external exiftool binary for capture times
    #[arg(long)]
    pub exiftool: bool,

    /// Exiftool date field to use (repeatable, tried in order)
    #[arg(short = 'f', long = "date-field", requires = "exiftool")]
    pub date_fields: Vec<String>,

    /// Regex with named groups year, month, day, hour, minute, second for
    /// reading dates from file names
    #[arg(short = 'r', long = "regex")]
    pub date_regex: Option<String>,

    /// Do not fall back to the file modification time
    #[arg(long)]
    pub no_file_timestamp: bool,

    /// Skip files whose name matches this regex (repeatable)
    #[arg(long)]
    pub exclude_regex: Vec<String>,

    /// Skip files matching this case-sensitive glob (repeatable)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// File with one glob pattern per line to skip
    #[arg(long)]
    pub exclude_file: Option<PathBuf>,

    /// Number of threads for parallel processing (0 = auto)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output log format as JSON
    #[arg(long)]
    pub json_log: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    fn operation(&self) -> Option<FileOperation> {
        if self.move_files {
            Some(FileOperation::Move)
        } else if self.link {
            Some(FileOperation::Link)
        } else {
            None
        }
    }

    /// Merge CLI arguments with config from file
    /// CLI arguments take precedence over config file settings
    pub fn merge_with_config(&self, mut config: Config) -> Config {
        if let Some((output, inputs)) = self.paths.split_last() {
            config.input_paths = inputs.to_vec();
            config.output_dir = output.clone();
        }
        if let Some(operation) = self.operation() {
            config.operation = operation;
        }
        if let Some(ref date) = self.date {
            config.dir_format = translate_human_format(date);
        }
        if let Some(ref dir_format) = self.dir_format {
            config.dir_format = dir_format.clone();
        }
        if let Some(ref file_format) = self.file_format {
            config.file_format = file_format.clone();
        }
        if self.original_names {
            config.original_names = true;
        }
        if let Some(ref unknown_dir) = self.unknown_dir {
            config.unknown_segment = unknown_dir.clone();
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_disambiguation_attempts = max_attempts;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if self.exiftool {
            config.exiftool = true;
        }
        if !self.date_fields.is_empty() {
            config.date_fields = self.date_fields.clone();
        }
        if let Some(ref date_regex) = self.date_regex {
            config.date_regex = Some(date_regex.clone());
        }
        if self.no_file_timestamp {
            config.file_timestamp_fallback = false;
        }
        // Exclusions add to the configured ones
        config.exclude_regex.extend(self.exclude_regex.iter().cloned());
        config.exclude.extend(self.exclude.iter().cloned());
        if let Some(ref exclude_file) = self.exclude_file {
            config.exclude_file = Some(exclude_file.clone());
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if self.verbose {
            config.verbose = true;
        }

        config
    }

    /// Convert CLI arguments to Config (when no config file is used)
    pub fn to_config(&self) -> Config {
        self.merge_with_config(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_inputs_and_output() {
        let cli = Cli::try_parse_from(["phockup", "a", "b", "out", "--move"]).unwrap();
        let config = cli.to_config();
        assert_eq!(config.input_paths, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.operation, FileOperation::Move);
    }

    #[test]
    fn test_single_path_is_rejected() {
        assert!(Cli::try_parse_from(["phockup", "out"]).is_err());
    }

    #[test]
    fn test_move_and_link_conflict() {
        assert!(Cli::try_parse_from(["phockup", "in", "out", "-m", "-l"]).is_err());
    }

    #[test]
    fn test_human_date_format() {
        let cli = Cli::try_parse_from(["phockup", "in", "out", "-d", "YYYY/M"]).unwrap();
        assert_eq!(cli.to_config().dir_format, "%Y/%B");
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let file_config = Config {
            input_paths: vec![PathBuf::from("from-file")],
            output_dir: PathBuf::from("file-out"),
            threads: 8,
            ..Config::default()
        };

        let cli = Cli::try_parse_from(["phockup", "-t", "2", "--exclude", "*.png", "-y"]).unwrap();
        let config = cli.merge_with_config(file_config);
        assert_eq!(config.input_paths, vec![PathBuf::from("from-file")]);
        assert_eq!(config.threads, 2);
        assert!(config.dry_run);
        assert_eq!(config.exclude, vec!["*.png".to_string()]);
        assert_eq!(config.exclude_regex.len(), 2);
    }

    #[test]
    fn test_no_file_timestamp() {
        let cli = Cli::try_parse_from(["phockup", "in", "out", "--no-file-timestamp"]).unwrap();
        assert!(!cli.to_config().file_timestamp_fallback);
    }
}
