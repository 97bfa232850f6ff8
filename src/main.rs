//! phockup - sort photos and videos by capture date
//!
//! Command line front end: parses arguments, sets up logging, runs the
//! processor and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use phockup::summary::{EXIT_FATAL, EXIT_INTERRUPTED, RunSummary};
use phockup::{Cli, Config, Outcome, Processor};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli_output {
    //! Colored terminal output for the run summary

    use crossterm::{
        ExecutableCommand,
        style::{Color, Print, Stylize, style},
    };
    use std::io::stdout;

    pub struct CliTheme;

    impl CliTheme {
        pub const SUCCESS: Color = Color::Green;
        pub const WARNING: Color = Color::Yellow;
        pub const ERROR: Color = Color::Red;
        pub const HINT: Color = Color::DarkGrey;
        pub const ACCENT: Color = Color::Cyan;
    }

    pub fn print_separator() {
        let _ = stdout().execute(Print(format!("{}\n", "─".repeat(60))));
    }

    pub fn print_title(title: &str) {
        let padding = 60usize.saturating_sub(title.len()) / 2;
        let _ = stdout().execute(Print(" ".repeat(padding)));
        let _ = stdout().execute(Print(style(title).bold()));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_warning(msg: &str) {
        let _ = stdout().execute(Print(style("⚠ ").with(CliTheme::WARNING).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_error(msg: &str) {
        let _ = stdout().execute(Print(style("✗ ").with(CliTheme::ERROR).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_stat(key: &str, value: usize, color: Color) {
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(style(key).with(CliTheme::HINT)));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(style(value.to_string()).with(color).bold()));
        let _ = stdout().execute(Print("\n"));
    }

    /// One line per file: icon, source, destination or error message
    pub fn print_result(status_icon: &str, status_color: Color, source: &str, detail: &str) {
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(style(status_icon).with(status_color).bold()));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(style(source).italic()));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(style(detail).with(CliTheme::HINT)));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_blank() {
        let _ = stdout().execute(Print("\n"));
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Run aborted");
            cli_output::print_error(&format!("{:#}", e));
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(cli: &Cli) -> Result<u8> {
    info!(version = env!("CARGO_PKG_VERSION"), "phockup starting");

    if cli.print_config && cli.config.is_none() && cli.paths.is_empty() {
        print!("{}", Config::sample_config());
        return Ok(0);
    }

    let config = load_config(cli)?;
    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(0);
    }
    if cli.verbose {
        info!(?config, "Configuration loaded");
    }

    let mut processor = Processor::new(config).context("Invalid configuration")?;

    let cancel = processor.cancel_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        if is_repeated_interrupt(&cancel) {
            eprintln!("Interrupted again, exiting now");
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
        eprintln!("Interrupted, finishing files in progress... press Ctrl-C again to exit now");
    }) {
        warn!(error = %e, "Cannot install interrupt handler");
    }

    let summary = processor.run().context("Processing failed")?;

    print_summary(&summary, cli.verbose);

    if let Some(report) = &cli.report {
        summary
            .write_report(report)
            .with_context(|| format!("Cannot write report to {}", report.display()))?;
        info!(report = %report.display(), "Report written");
    }

    Ok(summary.exit_code())
}

/// Set the cancel flag; true when it was already set by an earlier interrupt
fn is_repeated_interrupt(cancel: &AtomicBool) -> bool {
    cancel.swap(true, Ordering::SeqCst)
}

fn print_summary(summary: &RunSummary, verbose: bool) {
    use cli_output::*;

    print_separator();
    print_title("Processing complete");
    print_separator();

    let counts = &summary.counts;
    print_blank();
    print_stat("Moved", counts.moved, CliTheme::SUCCESS);
    print_stat("Copied", counts.copied, CliTheme::SUCCESS);
    print_stat("Linked", counts.linked, CliTheme::SUCCESS);
    print_stat("Duplicates", counts.skipped_duplicate, CliTheme::ACCENT);
    print_stat("Failed", counts.skipped_error, CliTheme::ERROR);
    print_blank();

    if verbose {
        print_separator();
        for result in &summary.results {
            let source = result.source.display().to_string();
            let destination = result
                .destination
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            match result.outcome {
                Outcome::Moved | Outcome::Copied | Outcome::Linked => {
                    print_result("✓", CliTheme::SUCCESS, &source, &format!("→ {}", destination));
                }
                Outcome::SkippedDuplicate => {
                    print_result("≡", CliTheme::ACCENT, &source, &format!("duplicate of {}", destination));
                }
                Outcome::SkippedError => {}
            }
        }
    }

    if !summary.errors.is_empty() {
        print_separator();
        print_error(&format!("{} files failed", summary.errors.len()));
        print_blank();
        for failed in &summary.errors {
            print_result(
                "✗",
                CliTheme::ERROR,
                &failed.source.display().to_string(),
                &failed.message,
            );
        }
    }

    if !summary.warnings.is_empty() {
        print_separator();
        print_warning(&format!("{} warnings", summary.warnings.len()));
        print_blank();
        for warning in &summary.warnings {
            print_result(
                "⚠",
                CliTheme::WARNING,
                &warning.source.display().to_string(),
                &warning.message,
            );
        }
    }

    if summary.interrupted {
        print_separator();
        print_warning(&format!(
            "Interrupted: {} files were not processed",
            summary.not_processed
        ));
    }

    if summary.dry_run {
        print_separator();
        print_warning("Dry run: no files were changed");
    }
}

/// Accept `name` for `name.toml`
fn resolve_config_path(config_path: &Path) -> PathBuf {
    if config_path.exists() || config_path.extension().is_some() {
        return config_path.to_path_buf();
    }
    let with_extension = config_path.with_extension("toml");
    if with_extension.exists() {
        with_extension
    } else {
        config_path.to_path_buf()
    }
}

/// Load configuration from file and/or CLI arguments
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(ref config_path) = cli.config {
        let resolved_path = resolve_config_path(config_path);
        info!(config_file = %resolved_path.display(), "Loading configuration from file");
        let file_config = Config::load_from_file(&resolved_path)?;
        cli.merge_with_config(file_config)
    } else {
        cli.to_config()
    };

    config.expand_paths();

    if config.input_paths.is_empty() {
        anyhow::bail!("No input given: pass INPUT... OUTPUT or set input_paths in the config file");
    }

    Ok(config)
}

/// Console logging plus an optional log file
fn setup_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let (file_layer, guard) = match &cli.log_file {
        Some(log_path) => {
            if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .with_context(|| format!("Cannot open log file {}", log_path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            (
                Some(fmt::layer().with_ansi(false).with_writer(non_blocking)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if cli.json_log {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(guard)
}
