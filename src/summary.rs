//! Run summary and report

use crate::error::{ErrorKind, Result};
use crate::transfer::{Outcome, TransferResult};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Exit status of a run that finished without per-file errors
pub const EXIT_OK: u8 = 0;
/// Exit status when at least one file ended in `SkippedError`
pub const EXIT_FILE_ERRORS: u8 = 1;
/// Exit status when the run could not start
pub const EXIT_FATAL: u8 = 2;
/// Exit status when an interrupt left files unprocessed
pub const EXIT_INTERRUPTED: u8 = 130;

/// Per-outcome tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub moved: usize,
    pub copied: usize,
    pub linked: usize,
    pub skipped_duplicate: usize,
    pub skipped_error: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Moved => self.moved += 1,
            Outcome::Copied => self.copied += 1,
            Outcome::Linked => self.linked += 1,
            Outcome::SkippedDuplicate => self.skipped_duplicate += 1,
            Outcome::SkippedError => self.skipped_error += 1,
        }
    }

    /// Files placed in the destination tree (or that would be, in a dry run)
    pub fn placed(&self) -> usize {
        self.moved + self.copied + self.linked
    }

    pub fn total(&self) -> usize {
        self.placed() + self.skipped_duplicate + self.skipped_error
    }
}

/// A file that could not be processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub source: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

/// A file that was placed but left something behind, such as a sidecar
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWarning {
    pub source: PathBuf,
    pub message: String,
}

/// Everything a finished run reports
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub counts: OutcomeCounts,
    pub errors: Vec<FailedFile>,
    pub warnings: Vec<FileWarning>,
    pub dry_run: bool,
    /// Files discovered but never reached because the run was interrupted
    pub not_processed: usize,
    pub interrupted: bool,
    pub results: Vec<TransferResult>,
}

impl RunSummary {
    /// Tally a list of per-file results, in processing order
    pub fn from_results(results: Vec<TransferResult>, dry_run: bool) -> Self {
        let mut counts = OutcomeCounts::default();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for result in &results {
            counts.record(result.outcome);
            if let Some(error) = &result.error {
                errors.push(FailedFile {
                    source: result.source.clone(),
                    kind: error.kind,
                    message: error.message.clone(),
                });
            }
            warnings.extend(result.warnings.iter().map(|message| FileWarning {
                source: result.source.clone(),
                message: message.clone(),
            }));
        }

        Self {
            counts,
            errors,
            warnings,
            dry_run,
            not_processed: 0,
            interrupted: false,
            results,
        }
    }

    /// Mark the run as cancelled with `remaining` files untouched
    pub fn interrupted(mut self, remaining: usize) -> Self {
        self.interrupted = true;
        self.not_processed = remaining;
        self
    }

    pub fn has_errors(&self) -> bool {
        self.counts.skipped_error > 0
    }

    /// An interrupted run that left files behind reports that first, since
    /// the tree is incomplete whatever else happened
    pub fn exit_code(&self) -> u8 {
        if self.interrupted && self.not_processed > 0 {
            EXIT_INTERRUPTED
        } else if self.has_errors() {
            EXIT_FILE_ERRORS
        } else {
            EXIT_OK
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the summary as JSON to `path`
    pub fn write_report(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// One-line summary for logs
    pub fn line(&self) -> String {
        format!(
            "Total: {}, Moved: {}, Copied: {}, Linked: {}, Duplicates: {}, Failed: {}",
            self.counts.total(),
            self.counts.moved,
            self.counts.copied,
            self.counts.linked,
            self.counts.skipped_duplicate,
            self.counts.skipped_error
        )
    }
}
