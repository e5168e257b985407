//! Staleness evaluation
//!
//! Decides, per package, whether the last built version is behind the
//! version reported by the reference sources. Sources are consulted in
//! the configured order and the first one that knows the package wins.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::graph::PackageGraph;
use crate::core::package::{Exclusion, Package};
use crate::core::state::VersionStore;
use crate::core::version::{self, VersionRecord};
use crate::error::{StorageError, VersionError};

/// Staleness of one package for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalenessVerdict {
    /// Last build matches or is ahead of the reference
    Fresh,
    /// Last build is behind the reference
    Stale,
    /// Never built, but a reference exists
    MissingLocally,
    /// Built before, but no source knows the package anymore
    MissingUpstream,
    /// Neither built nor known to any source
    Unknown,
}

impl StalenessVerdict {
    /// Whether the package should be (re)built
    pub fn is_build_candidate(self) -> bool {
        matches!(self, Self::Stale | Self::MissingLocally)
    }

    /// Verdict from a local record and a reference answer
    pub fn from_records(local: Option<&VersionRecord>, reference: Option<&VersionRecord>) -> Self {
        match (local, reference) {
            (None, None) => Self::Unknown,
            (Some(_), None) => Self::MissingUpstream,
            (None, Some(_)) => Self::MissingLocally,
            (Some(local), Some(reference)) => {
                if version::is_stale(local, reference) {
                    Self::Stale
                } else {
                    Self::Fresh
                }
            }
        }
    }
}

impl fmt::Display for StalenessVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::MissingLocally => "missing-locally",
            Self::MissingUpstream => "missing-upstream",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A source of reference versions
pub trait ReferenceSource: Send + Sync {
    /// Short name used in reports
    fn name(&self) -> &str;

    /// Reference version of a package, if this source knows it
    fn lookup(&self, package: &str) -> Result<Option<VersionRecord>, VersionError>;
}

/// Answers with each package's own declared version
#[derive(Debug, Clone, Default)]
pub struct DeclaredSource {
    versions: BTreeMap<String, VersionRecord>,
}

impl DeclaredSource {
    /// Collect declared versions from packages
    pub fn new<'a, I>(packages: I) -> Self
    where
        I: IntoIterator<Item = &'a Package>,
    {
        Self {
            versions: packages
                .into_iter()
                .map(|p| (p.name.clone(), p.version.clone()))
                .collect(),
        }
    }
}

impl ReferenceSource for DeclaredSource {
    fn name(&self) -> &str {
        "declared"
    }

    fn lookup(&self, package: &str) -> Result<Option<VersionRecord>, VersionError> {
        Ok(self.versions.get(package).cloned())
    }
}

/// Fixed set of raw versions, parsed on lookup
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    name: String,
    versions: BTreeMap<String, String>,
}

impl InMemorySource {
    /// Create a named source from `(package, raw version)` pairs
    pub fn new<I, K, V>(name: impl Into<String>, versions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            versions: versions
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ReferenceSource for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, package: &str) -> Result<Option<VersionRecord>, VersionError> {
        self.versions
            .get(package)
            .map(|raw| VersionRecord::parse(raw))
            .transpose()
    }
}

/// Full result of evaluating one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Package name
    pub name: String,
    /// Verdict for this run
    pub verdict: StalenessVerdict,
    /// Last built version
    pub local: Option<VersionRecord>,
    /// Winning reference version
    pub reference: Option<VersionRecord>,
    /// Source that supplied the reference
    pub source: Option<String>,
    /// Set when the package is kept out of automatic builds
    pub excluded: Option<String>,
}

/// Evaluations for every package of a graph
#[derive(Debug, Clone, Default)]
pub struct Assessment {
    /// Evaluations keyed by package name
    pub evaluations: BTreeMap<String, Evaluation>,
    /// Packages left out of comparison, with the reason
    pub excluded: Vec<Exclusion>,
}

impl Assessment {
    /// Verdict per package
    pub fn verdicts(&self) -> BTreeMap<String, StalenessVerdict> {
        self.evaluations
            .iter()
            .map(|(name, e)| (name.clone(), e.verdict))
            .collect()
    }

    /// Number of packages with the given verdict
    pub fn count(&self, verdict: StalenessVerdict) -> usize {
        self.evaluations
            .values()
            .filter(|e| e.verdict == verdict)
            .count()
    }
}

/// Compares packages against ordered reference sources
pub struct StalenessEvaluator<'a> {
    sources: Vec<Box<dyn ReferenceSource + 'a>>,
    store: &'a dyn VersionStore,
    include_vcs: bool,
}

impl<'a> StalenessEvaluator<'a> {
    /// Create an evaluator; `sources` are consulted in order
    pub fn new(sources: Vec<Box<dyn ReferenceSource + 'a>>, store: &'a dyn VersionStore) -> Self {
        Self {
            sources,
            store,
            include_vcs: false,
        }
    }

    /// Allow VCS packages to become build candidates
    #[must_use]
    pub fn include_vcs(mut self, include: bool) -> Self {
        self.include_vcs = include;
        self
    }

    /// Names of the configured sources, in priority order
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Evaluate one package
    ///
    /// A malformed reference version or a VCS package yields `unknown` with
    /// the reason recorded in `excluded`.
    ///
    /// # Errors
    ///
    /// Only store failures are returned; they are fatal to the run.
    pub fn evaluate(&self, package: &Package) -> Result<Evaluation, StorageError> {
        let local = self.store.get(&package.name)?.map(|s| s.version);
        let mut evaluation = Evaluation {
            name: package.name.clone(),
            verdict: StalenessVerdict::Unknown,
            local,
            reference: None,
            source: None,
            excluded: None,
        };

        if package.is_vcs() && !self.include_vcs {
            evaluation.excluded = Some("VCS package, not auto-built".to_string());
            return Ok(evaluation);
        }

        for source in &self.sources {
            match source.lookup(&package.name) {
                Ok(Some(reference)) => {
                    evaluation.reference = Some(reference);
                    evaluation.source = Some(source.name().to_string());
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    evaluation.excluded = Some(format!("source '{}': {e}", source.name()));
                    return Ok(evaluation);
                }
            }
        }

        evaluation.verdict = StalenessVerdict::from_records(
            evaluation.local.as_ref(),
            evaluation.reference.as_ref(),
        );
        if evaluation.verdict == StalenessVerdict::Unknown {
            tracing::warn!(
                "{} is unknown to every source and was never built, not building",
                package.name
            );
        }
        Ok(evaluation)
    }

    /// Evaluate every package of a graph
    ///
    /// # Errors
    ///
    /// Fails on the first store error.
    pub fn evaluate_all(&self, graph: &PackageGraph) -> Result<Assessment, StorageError> {
        let mut assessment = Assessment::default();
        for package in graph.packages() {
            let evaluation = self.evaluate(package)?;
            tracing::debug!("{}: {}", evaluation.name, evaluation.verdict);
            if let Some(reason) = &evaluation.excluded {
                tracing::warn!("Excluding {}: {reason}", evaluation.name);
                assessment.excluded.push(Exclusion {
                    name: evaluation.name.clone(),
                    reason: reason.clone(),
                });
            }
            assessment
                .evaluations
                .insert(evaluation.name.clone(), evaluation);
        }
        Ok(assessment)
    }
}
