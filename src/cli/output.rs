//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying progress bars, status
//! lines and run summaries, honoring `--quiet` and `--json`.

use std::path::Path;
use std::sync::OnceLock;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::core::package::Package;
use crate::core::report::{BuildOutcome, BuildRecord, RunSummary};
use crate::core::scheduler::RunObserver;

static OUTPUT: OnceLock<OutputConfig> = OnceLock::new();

/// Output mode selected on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Only errors are printed
    pub quiet: bool,
    /// Machine-readable output on stdout
    pub json: bool,
    /// Verbosity level (`-v` count)
    pub verbose: u8,
}

impl OutputConfig {
    /// Create an output configuration
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Make this configuration the one returned by [`OutputConfig::current`]
    ///
    /// Only the first call has an effect.
    pub fn apply_global(self) {
        let _ = OUTPUT.set(self);
    }

    /// Configuration applied at startup, or the default
    pub fn current() -> Self {
        OUTPUT.get().copied().unwrap_or_default()
    }

    /// Default log level for the tracing subscriber
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 if self.quiet => tracing::Level::ERROR,
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            _ => tracing::Level::DEBUG,
        }
    }

    /// Whether human-readable text goes to stdout
    pub fn show_text(&self) -> bool {
        !self.quiet && !self.json
    }
}

/// Print a line of human-readable output
pub fn print_line(message: impl AsRef<str>) {
    if OutputConfig::current().show_text() {
        println!("{}", message.as_ref());
    }
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Report a fatal error on stderr
pub fn display_error(error: &anyhow::Error) {
    if OutputConfig::current().json {
        let body = serde_json::json!({ "error": format!("{error:#}") });
        eprintln!("{body}");
    } else {
        eprintln!("{} Error: {error:#}", status::ERROR);
    }
}

/// Create a progress bar for build steps
pub fn create_build_bar(total: u64) -> ProgressBar {
    if !OutputConfig::current().show_text() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} packages ({msg})")
            .expect("Invalid progress bar template")
            .progress_chars("█▓▒░"),
    );
    pb
}

/// Drives a progress bar from scheduler events
pub struct BuildProgress {
    bar: ProgressBar,
}

impl BuildProgress {
    /// Create a progress observer
    pub fn new() -> Self {
        Self {
            bar: create_build_bar(0),
        }
    }

    /// Remove the bar from the terminal
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl RunObserver for BuildProgress {
    fn planned(&self, packages: &[&Package]) {
        self.bar.set_length(packages.len() as u64);
    }

    fn started(&self, package: &Package) {
        self.bar.set_message(package.name.clone());
    }

    fn finished(&self, record: &BuildRecord) {
        self.bar.inc(1);
        if record.outcome == BuildOutcome::Failed {
            self.bar
                .println(format!("{} {} failed", status::ERROR, record.name));
        }
    }
}

/// Glyph for a build outcome
pub fn outcome_glyph(outcome: BuildOutcome) -> &'static str {
    match outcome {
        BuildOutcome::Succeeded => status::SUCCESS,
        BuildOutcome::Failed => status::ERROR,
        BuildOutcome::SkippedDependencyFailed | BuildOutcome::SkippedCancelled => status::WARNING,
        BuildOutcome::SkippedNotStale => status::INFO,
    }
}

/// Machine-readable result of a build run
#[derive(Debug, Serialize)]
struct BuildReport<'a> {
    summary: &'a RunSummary,
    log: &'a Path,
}

/// Print the summary banner of a run
pub fn print_summary(summary: &RunSummary, log: &Path) -> anyhow::Result<()> {
    let config = OutputConfig::current();
    if config.json {
        return print_json(&BuildReport { summary, log });
    }
    if config.quiet {
        return Ok(());
    }

    println!();
    if let Some(reason) = &summary.aborted {
        println!("{} Build run aborted: {reason}", status::ERROR);
    } else if summary.is_success() {
        println!("{} Build run complete", status::SUCCESS);
    } else {
        println!("{} Build run finished with problems", status::ERROR);
    }
    println!("  Built:      {}", summary.succeeded);
    println!("  Up to date: {}", summary.up_to_date);
    if !summary.failed.is_empty() {
        println!("  Failed:     {}", summary.failed.join(", "));
    }
    if !summary.skipped.is_empty() {
        println!("  Skipped:    {}", summary.skipped.join(", "));
    }
    for exclusion in &summary.excluded {
        println!("  {} {}: {}", status::WARNING, exclusion.name, exclusion.reason);
    }
    println!("  Run log:    {}", log.display());
    Ok(())
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}
