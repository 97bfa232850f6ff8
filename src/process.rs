//! Run orchestrator
//!
//! Drives one run through its phases:
//! - Discovering: collect input files in a fixed order
//! - Processing: resolve capture times and placements in parallel, claim
//!   destination names sequentially in that order, then transfer in parallel
//! - Summarizing: tally outcomes and per-file errors
//!
//! Claims are the only step that decides which file gets which name, so
//! running them in sorted order makes the result independent of scheduling.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::DestinationIndex;
use crate::media::MediaFile;
use crate::scan::{Exclusions, collect_files};
use crate::summary::RunSummary;
use crate::template::{NamingTemplate, Placement};
use crate::time::{CaptureTime, TimeResolver};
use crate::transfer::{Outcome, TransferExecutor, TransferResult, sidecar_candidates};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{Level, debug, error, info, span, warn};

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Discovering,
    Processing,
    Summarizing,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Discovering => "discovering",
            RunPhase::Processing => "processing",
            RunPhase::Summarizing => "summarizing",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Live counters, readable while a run is in progress
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub total_files: AtomicUsize,
    pub placed: AtomicUsize,
    pub duplicates: AtomicUsize,
    pub failed: AtomicUsize,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files that reached a final outcome so far
    pub fn finished(&self) -> usize {
        self.placed.load(Ordering::Relaxed)
            + self.duplicates.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Moved | Outcome::Copied | Outcome::Linked => &self.placed,
            Outcome::SkippedDuplicate => &self.duplicates,
            Outcome::SkippedError => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A file whose destination has been decided
enum Plan {
    Transfer {
        file: Arc<MediaFile>,
        relative_path: PathBuf,
        duplicate: bool,
        /// Source that must be placed for this duplicate verdict to hold
        claimant: Option<PathBuf>,
        /// `(sidecar source, reserved relative path)`
        sidecars: Vec<(PathBuf, PathBuf)>,
        /// Sidecars that will be left behind
        warnings: Vec<String>,
    },
    Failed(TransferResult),
}

impl Plan {
    fn source(&self) -> &Path {
        match self {
            Plan::Transfer { file, .. } => file.path(),
            Plan::Failed(result) => &result.source,
        }
    }

    fn claimant(&self) -> Option<&Path> {
        match self {
            Plan::Transfer { claimant, .. } => claimant.as_deref(),
            Plan::Failed(_) => None,
        }
    }
}

/// Organizes one set of inputs into the destination tree
pub struct Processor {
    config: Config,
    template: NamingTemplate,
    resolver: TimeResolver,
    exclusions: Exclusions,
    executor: TransferExecutor,
    pool: rayon::ThreadPool,
    phase: RunPhase,
    stats: Arc<ProcessingStats>,
    cancel: Arc<AtomicBool>,
}

impl Processor {
    /// Validate the configuration and prepare a run
    ///
    /// Every fatal configuration problem is reported here, before any file
    /// is touched.
    pub fn new(config: Config) -> Result<Self> {
        let resolver = TimeResolver::from_config(&config)?;
        Self::with_resolver(config, resolver)
    }

    /// Like [`Processor::new`] with a custom capture time resolver
    pub fn with_resolver(config: Config, resolver: TimeResolver) -> Result<Self> {
        config.validate()?;
        let template = NamingTemplate::from_config(&config)?;
        let exclusions = Exclusions::from_config(&config)?;
        config.ensure_output_dir()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| Error::ConfigurationInvalid(format!("cannot start worker threads: {e}")))?;

        Ok(Self {
            executor: TransferExecutor::new(config.operation, config.dry_run),
            config,
            template,
            resolver,
            exclusions,
            pool,
            phase: RunPhase::Discovering,
            stats: Arc::new(ProcessingStats::new()),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn stats_arc(&self) -> Arc<ProcessingStats> {
        Arc::clone(&self.stats)
    }

    /// Flag that stops the run before the next transfer once set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(from = %self.phase, to = %phase, "Run phase transition");
        self.phase = phase;
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run the whole pipeline
    ///
    /// Per-file failures end up in the summary; only problems that prevent
    /// the run from starting are returned as errors.
    pub fn run(&mut self) -> Result<RunSummary> {
        let _span = span!(Level::INFO, "processor_run", output = ?self.config.output_dir).entered();

        self.enter(RunPhase::Discovering);
        info!("Scanning inputs...");
        let files = collect_files(&self.config, &self.exclusions);
        self.stats.total_files.store(files.len(), Ordering::Relaxed);

        self.enter(RunPhase::Processing);
        let index = DestinationIndex::open(
            &self.config.output_dir,
            self.config.max_disambiguation_attempts,
        )?;

        let plans = self.plan(&files, &index);
        let results = self.execute_all(plans, &index);

        self.enter(RunPhase::Summarizing);
        let not_processed = results.iter().filter(|r| r.is_none()).count();
        let results: Vec<TransferResult> = results.into_iter().flatten().collect();
        let mut summary = RunSummary::from_results(results, self.config.dry_run);
        if not_processed > 0 || self.cancelled() {
            warn!(not_processed, "Run interrupted, remaining files were left untouched");
            summary = summary.interrupted(not_processed);
        }
        info!("{}", summary.line());

        self.enter(RunPhase::Done);
        Ok(summary)
    }

    /// Decide the final destination of every file
    fn plan(&self, files: &[PathBuf], index: &DestinationIndex) -> Vec<Plan> {
        let prepared: Vec<Result<(Arc<MediaFile>, Placement)>> = self.pool.install(|| {
            files
                .par_iter()
                .map(|path| -> Result<(Arc<MediaFile>, Placement)> {
                    let file = MediaFile::open(path, &self.resolver)?;
                    let placement = self.template.build(file.capture_time(), file.file_name());
                    Ok((Arc::new(file), placement))
                })
                .collect()
        });

        // Claims run in sorted order so earlier files win base names
        files
            .iter()
            .zip(prepared)
            .map(|(path, prepared)| {
                let outcome = prepared.and_then(|(file, placement)| {
                    let claim = index.claim(&placement, &file)?;
                    Ok((file, claim))
                });
                match outcome {
                    Ok((file, claim)) => {
                        let (sidecars, warnings) = if claim.duplicate {
                            (Vec::new(), Vec::new())
                        } else {
                            self.reserve_sidecars(&file, &claim.relative_path, index)
                        };
                        Plan::Transfer {
                            file,
                            relative_path: claim.relative_path,
                            duplicate: claim.duplicate,
                            claimant: claim.claimant,
                            sidecars,
                            warnings,
                        }
                    }
                    Err(e) => {
                        error!(source = ?path, error = %e, "Cannot place file");
                        Plan::Failed(TransferResult::failed(path, None, &e))
                    }
                }
            })
            .collect()
    }

    /// Claim names next to the file's final path for its XMP sidecars
    ///
    /// Sidecars that cannot get a name are left in place and reported.
    fn reserve_sidecars(
        &self,
        file: &MediaFile,
        relative_path: &Path,
        index: &DestinationIndex,
    ) -> (Vec<(PathBuf, PathBuf)>, Vec<String>) {
        let mut sidecars = Vec::new();
        let mut warnings = Vec::new();
        let (Some(relative_dir), Some(final_name)) = (
            relative_path.parent(),
            relative_path.file_name().and_then(|n| n.to_str()),
        ) else {
            return (sidecars, warnings);
        };

        for (sidecar, names) in sidecar_candidates(file.path(), final_name) {
            let Ok(meta) = fs::metadata(&sidecar) else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let sidecar_file = Arc::new(MediaFile::new(sidecar.clone(), meta.len(), CaptureTime::Unknown));
            match index.reserve(relative_dir, &names, &sidecar_file) {
                Ok(Some(claim)) if claim.duplicate => {
                    debug!(?sidecar, destination = ?claim.relative_path, "Sidecar already in place");
                }
                Ok(Some(claim)) => sidecars.push((sidecar, claim.relative_path)),
                Ok(None) => {
                    warn!(?sidecar, "No free name for sidecar, leaving it in place");
                    warnings.push(format!(
                        "sidecar {}: every name next to {} is taken",
                        sidecar.display(),
                        final_name
                    ));
                }
                Err(e) => {
                    warn!(?sidecar, error = %e, "Cannot place sidecar");
                    warnings.push(format!("sidecar {}: {}", sidecar.display(), e));
                }
            }
        }

        (sidecars, warnings)
    }

    /// Run every plan, keeping the input order in the results
    ///
    /// Duplicates of a name claimed in this run wait for the file that
    /// claimed it: they are only skipped once that file is in place.
    fn execute_all(&self, plans: Vec<Plan>, index: &DestinationIndex) -> Vec<Option<TransferResult>> {
        let (dependent, independent): (Vec<_>, Vec<_>) = plans
            .into_iter()
            .enumerate()
            .partition(|(_, plan)| plan.claimant().is_some());

        let mut results: Vec<(usize, PathBuf, Option<TransferResult>)> = self.pool.install(|| {
            independent
                .into_par_iter()
                .map(|(i, plan)| {
                    let source = plan.source().to_path_buf();
                    (i, source, self.execute(plan, index))
                })
                .collect()
        });

        // Some(placed) per claimant; None when it never ran
        let placed: HashMap<PathBuf, Option<bool>> = results
            .iter()
            .map(|(_, source, result)| (source.clone(), result.as_ref().map(|r| !r.is_error())))
            .collect();

        for (i, plan) in dependent {
            let source = plan.source().to_path_buf();
            let claimant_placed = plan
                .claimant()
                .and_then(|claimant| placed.get(claimant).copied())
                .unwrap_or(Some(false));
            let result = match claimant_placed {
                Some(true) => self.execute(plan, index),
                Some(false) => Some(self.claimant_failed(plan, index)),
                None => None,
            };
            results.push((i, source, result));
        }

        results.sort_by_key(|(i, _, _)| *i);
        results.into_iter().map(|(_, _, result)| result).collect()
    }

    /// A duplicate whose claimant was not placed: its content is nowhere
    /// in the destination, so it fails instead of being skipped
    fn claimant_failed(&self, plan: Plan, index: &DestinationIndex) -> TransferResult {
        let source = plan.source().to_path_buf();
        let result = match plan {
            Plan::Transfer {
                file,
                relative_path,
                claimant: Some(claimant),
                ..
            } => {
                let error = Error::ClaimantNotPlaced {
                    path: file.path().to_path_buf(),
                    claimant,
                };
                error!(source = ?file.path(), error = %error, "Cannot place file");
                TransferResult::failed(file.path(), Some(index.root().join(relative_path)), &error)
                    .with_time_source(file.capture_time().known().map(|t| t.source))
            }
            Plan::Transfer { .. } | Plan::Failed(_) => {
                let error = Error::ConfigurationInvalid("duplicate without a claimant".into());
                TransferResult::failed(&source, None, &error)
            }
        };
        self.stats.record(result.outcome);
        result
    }

    /// Carry out one plan; `None` when the run was cancelled first
    fn execute(&self, plan: Plan, index: &DestinationIndex) -> Option<TransferResult> {
        let result = match plan {
            Plan::Failed(result) => result,
            Plan::Transfer {
                file,
                relative_path,
                duplicate,
                sidecars,
                warnings,
                ..
            } => {
                let release = || {
                    if !duplicate {
                        index.release(&relative_path);
                        for (_, sidecar_path) in &sidecars {
                            index.release(sidecar_path);
                        }
                    }
                };

                if self.cancelled() {
                    release();
                    return None;
                }

                let _file_span = span!(Level::DEBUG, "process_file", source = ?file.path()).entered();
                let destination = index.root().join(&relative_path);
                let sidecars: Vec<(PathBuf, PathBuf)> = sidecars
                    .iter()
                    .map(|(source, relative)| (source.clone(), index.root().join(relative)))
                    .collect();
                let result = self
                    .executor
                    .execute_with_sidecars(file.path(), &destination, duplicate, &sidecars)
                    .with_time_source(file.capture_time().known().map(|t| t.source));

                if result.is_error() {
                    release();
                    result
                } else {
                    result.with_warnings(warnings)
                }
            }
        };

        self.stats.record(result.outcome);
        Some(result)
    }
}
