//! Plan command implementation
//!
//! Implements `repoforge plan` to show the build order of out-of-date
//! packages without building them.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::output::{self, status, OutputConfig};
use crate::core::graph::PackageGraph;
use crate::core::scheduler;
use crate::core::staleness::{Assessment, StalenessVerdict};
use crate::core::version::VersionRecord;

#[derive(Serialize)]
struct PlannedPackage<'a> {
    name: &'a str,
    version: &'a VersionRecord,
    verdict: Option<StalenessVerdict>,
}

/// Print the build plan for an assessed graph
pub fn print_plan(graph: &PackageGraph, assessment: &Assessment) -> Result<()> {
    let verdicts = assessment.verdicts();
    let order = scheduler::plan(graph, &verdicts).context("Cannot determine build order")?;

    if OutputConfig::current().json {
        let planned: Vec<PlannedPackage<'_>> = order
            .iter()
            .map(|p| PlannedPackage {
                name: &p.name,
                version: &p.version,
                verdict: verdicts.get(&p.name).copied(),
            })
            .collect();
        return output::print_json(&planned);
    }

    if order.is_empty() {
        output::print_line(format!("{} Everything is up to date", status::SUCCESS));
        return Ok(());
    }

    output::print_line("Packages that would be built:");
    for (index, package) in order.iter().enumerate() {
        let verdict = verdicts
            .get(&package.name)
            .map(ToString::to_string)
            .unwrap_or_default();
        output::print_line(format!(
            "  {:>3}. {} {} ({verdict})",
            index + 1,
            package.name,
            package.version
        ));
    }
    Ok(())
}

/// Execute the plan command
pub async fn execute(project_dir: &Path, packages: &[String]) -> Result<()> {
    let settings = super::load_settings(project_dir)?;
    let repo = super::open_repository(settings)?;
    let graph = repo.select(packages)?;
    let assessment = repo
        .assess(&graph)
        .context("Failed to evaluate package versions")?;

    print_plan(&graph, &assessment)
}
