//! Repository workspace
//!
//! Ties the configured package tree, version store and reference sources
//! together for one invocation.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::graph::PackageGraph;
use crate::core::package::{load_package_tree, Exclusion, Package};
use crate::core::settings::{Settings, SourceConfig};
use crate::core::staleness::{Assessment, DeclaredSource, ReferenceSource, StalenessEvaluator};
use crate::core::state::JsonFileStore;
use crate::error::{LoadError, RepoforgeError};
use crate::infra::sources::ListingSource;

/// A loaded repository
pub struct Repository {
    settings: Settings,
    graph: PackageGraph,
    excluded: Vec<Exclusion>,
    store: Arc<JsonFileStore>,
}

impl Repository {
    /// Load the package tree, build the graph and open the store
    ///
    /// Packages whose definition was excluded take their dependents with
    /// them, since those cannot be ordered.
    ///
    /// # Errors
    ///
    /// Fails on loader, graph or store errors.
    pub fn open(settings: Settings) -> Result<Self, RepoforgeError> {
        let tree = load_package_tree(&settings.packages_dir, &settings.external)?;
        let (packages, excluded) = drop_orphans(tree.packages, tree.excluded);
        let graph = PackageGraph::build(packages)?;
        let store = Arc::new(JsonFileStore::open(&settings.state_path)?);

        Ok(Self {
            settings,
            graph,
            excluded,
            store,
        })
    }

    /// Effective settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Dependency graph of every loaded package
    pub fn graph(&self) -> &PackageGraph {
        &self.graph
    }

    /// Packages excluded while loading
    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }

    /// Version store
    pub fn store(&self) -> Arc<JsonFileStore> {
        Arc::clone(&self.store)
    }

    /// Graph narrowed to the requested packages and their dependencies
    ///
    /// An empty request selects the whole graph.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPackage` for a name not in the tree.
    pub fn select(&self, requested: &[String]) -> Result<PackageGraph, RepoforgeError> {
        if requested.is_empty() {
            return Ok(self.graph.clone());
        }
        Ok(self.graph.subgraph_reachable_from(requested)?)
    }

    /// Reference sources in configured priority order
    ///
    /// Without configuration the declared versions are the only source.
    ///
    /// # Errors
    ///
    /// Fails if a listing cannot be loaded.
    pub fn sources(&self) -> Result<Vec<Box<dyn ReferenceSource>>, LoadError> {
        if self.settings.sources.is_empty() {
            return Ok(vec![Box::new(DeclaredSource::new(self.graph.packages()))]);
        }

        let mut sources: Vec<Box<dyn ReferenceSource>> = Vec::new();
        for source in &self.settings.sources {
            match source {
                SourceConfig::Declared => {
                    sources.push(Box::new(DeclaredSource::new(self.graph.packages())));
                }
                SourceConfig::Listing { path } => {
                    sources.push(Box::new(ListingSource::load(path)?));
                }
            }
        }
        Ok(sources)
    }

    /// Evaluate staleness of every package in `graph`
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be loaded or the store cannot be read.
    pub fn assess(&self, graph: &PackageGraph) -> Result<Assessment, RepoforgeError> {
        let evaluator = StalenessEvaluator::new(self.sources()?, self.store.as_ref())
            .include_vcs(self.settings.include_vcs);
        tracing::debug!("Reference sources: {:?}", evaluator.source_names());

        let mut assessment = evaluator.evaluate_all(graph)?;
        let mut excluded = self.excluded.clone();
        excluded.append(&mut assessment.excluded);
        assessment.excluded = excluded;
        Ok(assessment)
    }
}

/// Remove packages depending, directly or not, on an excluded one
fn drop_orphans(
    mut packages: Vec<Package>,
    mut excluded: Vec<Exclusion>,
) -> (Vec<Package>, Vec<Exclusion>) {
    let mut gone: BTreeSet<String> = excluded.iter().map(|e| e.name.clone()).collect();

    loop {
        let (orphans, kept): (Vec<Package>, Vec<Package>) = packages
            .into_iter()
            .partition(|p| p.all_dependencies().iter().any(|d| gone.contains(*d)));
        packages = kept;
        if orphans.is_empty() {
            break;
        }

        for orphan in orphans {
            let missing: Vec<&str> = orphan
                .all_dependencies()
                .into_iter()
                .filter(|d| gone.contains(*d))
                .collect();
            let reason = format!("depends on excluded {}", missing.join(", "));
            tracing::warn!("Excluding {}: {reason}", orphan.name);
            gone.insert(orphan.name.clone());
            excluded.push(Exclusion {
                name: orphan.name,
                reason,
            });
        }
    }

    (packages, excluded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::{GlobalConfig, ProjectConfig};
    use crate::core::staleness::StalenessVerdict;
    use crate::core::version::VersionRecord;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_package(root: &Path, name: &str, version: &str, depends: &[&str]) {
        let dir = root.join("packages").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let depends: Vec<String> = depends.iter().map(|d| format!("\"{d}\"")).collect();
        std::fs::write(
            dir.join("package.toml"),
            format!(
                "[package]\nname = \"{name}\"\nversion = \"{version}\"\ndepends = [{}]\n",
                depends.join(", ")
            ),
        )
        .unwrap();
    }

    fn open(root: &Path) -> Repository {
        let settings =
            Settings::merge(root, &GlobalConfig::default(), ProjectConfig::default()).unwrap();
        Repository::open(settings).unwrap()
    }

    #[test]
    fn test_open_builds_graph() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "a", "1.0", &[]);
        write_package(temp.path(), "b", "1.0", &["a"]);

        let repo = open(temp.path());
        assert_eq!(repo.graph().len(), 2);
        assert!(repo.excluded().is_empty());
    }

    #[test]
    fn test_malformed_version_excludes_dependents() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "a", "bad version", &[]);
        write_package(temp.path(), "b", "1.0", &["a"]);
        write_package(temp.path(), "c", "1.0", &["b"]);
        write_package(temp.path(), "d", "1.0", &[]);

        let repo = open(temp.path());
        assert_eq!(repo.graph().len(), 1);
        let names: Vec<&str> = repo.excluded().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_assess_with_declared_source() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "a", "1.0", &[]);

        let repo = open(temp.path());
        let assessment = repo.assess(repo.graph()).unwrap();
        assert_eq!(
            assessment.evaluations["a"].verdict,
            StalenessVerdict::MissingLocally
        );
        assert_eq!(
            assessment.evaluations["a"].reference,
            Some(VersionRecord::new(0, "1.0", 1))
        );
    }

    #[test]
    fn test_select_unknown_package() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "a", "1.0", &[]);

        let repo = open(temp.path());
        assert!(repo.select(&["nope".to_string()]).is_err());
        assert_eq!(repo.select(&[]).unwrap().len(), 1);
    }
}
