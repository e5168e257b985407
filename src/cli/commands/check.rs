//! Check command implementation
//!
//! Implements `repoforge check` to report the staleness of every package
//! without building anything.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::output::{self, status, OutputConfig};
use crate::core::package::Exclusion;
use crate::core::staleness::{Evaluation, StalenessVerdict};

#[derive(Serialize)]
struct CheckReport<'a> {
    packages: Vec<&'a Evaluation>,
    excluded: &'a [Exclusion],
}

fn glyph(verdict: StalenessVerdict) -> &'static str {
    match verdict {
        StalenessVerdict::Fresh => status::SUCCESS,
        StalenessVerdict::Stale | StalenessVerdict::MissingLocally => status::WARNING,
        StalenessVerdict::MissingUpstream | StalenessVerdict::Unknown => status::INFO,
    }
}

fn display_version(version: Option<&impl std::fmt::Display>) -> String {
    version.map_or_else(|| "-".to_string(), ToString::to_string)
}

/// Execute the check command
pub async fn execute(project_dir: &Path, packages: &[String]) -> Result<()> {
    let settings = super::load_settings(project_dir)?;
    let repo = super::open_repository(settings)?;
    let graph = repo.select(packages)?;
    let assessment = repo
        .assess(&graph)
        .context("Failed to evaluate package versions")?;

    if OutputConfig::current().json {
        return output::print_json(&CheckReport {
            packages: assessment.evaluations.values().collect(),
            excluded: &assessment.excluded,
        });
    }

    for evaluation in assessment.evaluations.values() {
        output::print_line(format!(
            "{} {:<32} {:>16} -> {:<16} {}",
            glyph(evaluation.verdict),
            evaluation.name,
            display_version(evaluation.local.as_ref()),
            display_version(evaluation.reference.as_ref()),
            evaluation.verdict
        ));
    }
    for exclusion in &assessment.excluded {
        output::print_line(format!(
            "{} {}: {}",
            status::WARNING,
            exclusion.name,
            exclusion.reason
        ));
    }

    let candidates = assessment.count(StalenessVerdict::Stale)
        + assessment.count(StalenessVerdict::MissingLocally);
    output::print_line(format!(
        "\n{candidates} of {} packages need a build",
        assessment.evaluations.len()
    ));
    Ok(())
}
