//! Build outcomes, run log and summary

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core::package::Exclusion;
use crate::core::version::VersionRecord;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Current time as seconds since the Unix epoch
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Terminal outcome of one package in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildOutcome {
    /// Built and recorded
    Succeeded,
    /// Build process failed, timed out or crashed
    Failed,
    /// Not attempted because a dependency failed
    SkippedDependencyFailed,
    /// Not a build candidate
    SkippedNotStale,
    /// Not attempted because the run was aborted
    SkippedCancelled,
}

impl BuildOutcome {
    /// Whether the package was skipped without building
    pub fn is_skipped(self) -> bool {
        matches!(
            self,
            Self::SkippedDependencyFailed | Self::SkippedNotStale | Self::SkippedCancelled
        )
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::SkippedDependencyFailed => "skipped-dependency-failed",
            Self::SkippedNotStale => "skipped-not-stale",
            Self::SkippedCancelled => "skipped-cancelled",
        };
        f.write_str(s)
    }
}

/// One entry of the run log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Package name
    pub name: String,
    /// Declared version at the time of the run
    pub version: VersionRecord,
    /// Outcome
    pub outcome: BuildOutcome,
    /// When the build unit started (absent if it never ran)
    #[serde(default)]
    pub started_at: Option<u64>,
    /// When the outcome was decided
    pub finished_at: u64,
    /// Captured build output
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Short explanation for failures and skips
    #[serde(default)]
    pub reason: Option<String>,
}

impl BuildRecord {
    /// Record for a package that never ran
    pub fn skipped(
        name: impl Into<String>,
        version: VersionRecord,
        outcome: BuildOutcome,
        reason: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            outcome,
            started_at: None,
            finished_at: unix_now(),
            output: None,
            reason,
        }
    }
}

/// Append-only log of a run in progress
#[derive(Debug, Clone)]
pub struct RunLog {
    started_at: u64,
    records: Vec<BuildRecord>,
    excluded: Vec<Exclusion>,
}

impl RunLog {
    /// Start a new run
    pub fn start() -> Self {
        Self {
            started_at: unix_now(),
            records: Vec::new(),
            excluded: Vec::new(),
        }
    }

    /// Append an outcome
    pub fn record(&mut self, record: BuildRecord) {
        tracing::debug!("{} -> {}", record.name, record.outcome);
        self.records.push(record);
    }

    /// Note packages that were kept out of the run
    pub fn exclude<I>(&mut self, excluded: I)
    where
        I: IntoIterator<Item = Exclusion>,
    {
        self.excluded.extend(excluded);
    }

    /// Records so far
    pub fn records(&self) -> &[BuildRecord] {
        &self.records
    }

    /// Close the run; the result cannot be changed
    pub fn finish(self) -> BuildRun {
        self.close(None)
    }

    /// Close a run that was stopped by a fatal error
    pub fn abort(self, reason: impl Into<String>) -> BuildRun {
        self.close(Some(reason.into()))
    }

    fn close(self, aborted: Option<String>) -> BuildRun {
        BuildRun {
            started_at: self.started_at,
            finished_at: unix_now(),
            records: self.records,
            excluded: self.excluded,
            aborted,
        }
    }
}

/// A finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRun {
    started_at: u64,
    finished_at: u64,
    records: Vec<BuildRecord>,
    #[serde(default)]
    excluded: Vec<Exclusion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aborted: Option<String>,
}

impl BuildRun {
    /// Run start time
    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    /// Run end time
    pub fn finished_at(&self) -> u64 {
        self.finished_at
    }

    /// Records in the order outcomes were decided
    pub fn records(&self) -> &[BuildRecord] {
        &self.records
    }

    /// Packages kept out of the run
    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }

    /// Why the run stopped early, if it did
    pub fn aborted(&self) -> Option<&str> {
        self.aborted.as_deref()
    }

    /// Outcome of a package, if it took part in the run
    pub fn outcome_of(&self, name: &str) -> Option<BuildOutcome> {
        self.records
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.outcome)
    }

    /// Write the run as JSON into `dir`
    ///
    /// Each run gets its own file; existing files are never rewritten.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, FilesystemError> {
        filesystem::create_dir_all(dir)?;
        let mut path = dir.join(format!("run-{}.json", self.started_at));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("run-{}-{n}.json", self.started_at));
            n += 1;
        }
        let content =
            serde_json::to_string_pretty(self).map_err(|e| FilesystemError::WriteFile {
                path: path.clone(),
                error: e.to_string(),
            })?;
        filesystem::write_file(&path, &content)?;
        Ok(path)
    }
}

/// Aggregated outcome of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of packages built successfully
    pub succeeded: usize,
    /// Packages whose build failed
    pub failed: Vec<String>,
    /// Packages skipped because a dependency failed or the run was aborted
    pub skipped: Vec<String>,
    /// Packages that did not need a build
    pub up_to_date: usize,
    /// Packages kept out of comparison
    pub excluded: Vec<Exclusion>,
    /// Fatal error that stopped the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunSummary {
    /// Whether the run completed with nothing failed or skipped
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Run summary aggregation
pub struct RunReport;

impl RunReport {
    /// Summarize a finished run
    pub fn finalize(run: &BuildRun) -> RunSummary {
        let mut summary = RunSummary {
            excluded: run.excluded().to_vec(),
            aborted: run.aborted().map(str::to_string),
            ..RunSummary::default()
        };

        for record in run.records() {
            match record.outcome {
                BuildOutcome::Succeeded => summary.succeeded += 1,
                BuildOutcome::Failed => summary.failed.push(record.name.clone()),
                BuildOutcome::SkippedDependencyFailed | BuildOutcome::SkippedCancelled => {
                    summary.skipped.push(record.name.clone());
                }
                BuildOutcome::SkippedNotStale => summary.up_to_date += 1,
            }
        }

        summary.failed.sort();
        summary.skipped.sort();
        summary
    }
}
