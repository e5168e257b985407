//! Build command implementation
//!
//! Implements `repoforge build` to rebuild out-of-date packages in
//! dependency order.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use crate::cli::output::{self, BuildProgress, OutputConfig};
use crate::core::report::RunReport;
use crate::core::scheduler::BuildScheduler;
use crate::core::supervisor::{BuildSupervisor, SupervisorConfig};
use crate::error::{BuildError, RepoforgeError};
use crate::infra::executor::ProcessExecutor;

/// Build options
pub struct BuildOptions {
    /// Build only these packages and their dependencies
    pub packages: Vec<String>,
    /// Number of parallel jobs
    pub jobs: Option<usize>,
    /// Per-package time limit in seconds
    pub timeout: Option<u64>,
    /// Show the plan without building
    pub dry_run: bool,
}

/// Execute the build command
pub async fn execute(project_dir: &Path, options: BuildOptions) -> Result<()> {
    let mut settings = super::load_settings(project_dir)?;
    if let Some(jobs) = options.jobs {
        if jobs == 0 {
            bail!("--jobs must be at least 1");
        }
        settings.jobs = jobs;
    }
    if let Some(timeout) = options.timeout {
        if timeout == 0 {
            bail!("--timeout must be at least 1 second");
        }
        settings.timeout = Duration::from_secs(timeout);
    }

    let repo = super::open_repository(settings)?;
    let graph = repo.select(&options.packages)?;
    let assessment = repo
        .assess(&graph)
        .context("Failed to evaluate package versions")?;

    if options.dry_run {
        return super::plan::print_plan(&graph, &assessment);
    }

    let settings = repo.settings();
    let executor = ProcessExecutor::new(settings.command.clone());
    executor.check_available()?;

    let supervisor = BuildSupervisor::new(
        executor,
        repo.store(),
        SupervisorConfig {
            logs_dir: settings.logs_dir.clone(),
            timeout: settings.timeout,
            honor_failure_markers: settings.honor_failure_markers,
        },
    );

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, waiting for running builds to finish");
                cancel.cancel();
            }
        })
    };

    let progress = Arc::new(BuildProgress::new());
    let scheduler = BuildScheduler::new(supervisor)
        .with_jobs(settings.jobs)
        .with_cancellation(cancel.clone())
        .with_observer(progress.clone());

    let result = scheduler.run(&graph, &assessment).await;
    interrupt.abort();
    progress.finish();
    let (run, fatal) = match result {
        Ok(run) => (run, None),
        Err(RepoforgeError::RunAborted { run, source }) => (*run, Some(source)),
        Err(e) => return Err(e).context("Build run aborted"),
    };

    let log_path = run
        .save(&settings.logs_dir)
        .context("Failed to write run log")?;
    if OutputConfig::current().verbose > 0 {
        for record in run.records() {
            output::print_line(format!(
                "{} {} {} {}",
                output::outcome_glyph(record.outcome),
                record.name,
                record.version,
                record.outcome
            ));
        }
    }

    let summary = RunReport::finalize(&run);
    output::print_summary(&summary, &log_path)?;

    if let Some(e) = fatal {
        return Err(e).context("Build run aborted");
    }
    if !summary.failed.is_empty() {
        return Err(BuildError::BuildFailed {
            package: summary.failed.join(", "),
            reason: format!("see build logs in {}", settings.logs_dir.display()),
        }
        .into());
    }
    if cancel.is_cancelled() {
        bail!("Build interrupted, {} packages not built", summary.skipped.len());
    }
    Ok(())
}
