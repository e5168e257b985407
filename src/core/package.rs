//! Package definition handling
//!
//! A [`Package`] is the immutable unit the rest of the core works with.
//! Definitions are read from `package.toml` files in the package tree;
//! loading is deliberately thin, the files are expected to already be
//! structurally valid.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::core::version::VersionRecord;
use crate::error::LoadError;
use crate::infra::filesystem;

/// File name of a package definition inside the package tree
pub const DEFINITION_FILE: &str = "package.toml";

/// Name suffixes of packages built from version control checkouts
const VCS_SUFFIXES: &[&str] = &["-cvs", "-svn", "-hg", "-darcs", "-bzr", "-git"];

/// A buildable package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Package identity
    pub name: String,
    /// Declared version and release
    pub version: VersionRecord,
    /// Runtime and build dependencies (package names)
    pub depends: BTreeSet<String>,
    /// Build-time only dependencies (package names)
    pub makedepends: BTreeSet<String>,
    /// Source URLs
    pub sources: Vec<String>,
    /// Directory holding the definition, used as the build working directory
    pub path: Option<PathBuf>,
}

impl Package {
    /// Create a package without dependencies
    pub fn new(name: impl Into<String>, version: VersionRecord) -> Self {
        Self {
            name: name.into(),
            version,
            depends: BTreeSet::new(),
            makedepends: BTreeSet::new(),
            sources: Vec::new(),
            path: None,
        }
    }

    /// Set runtime dependencies
    #[must_use]
    pub fn with_depends<I, S>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = depends.into_iter().map(Into::into).collect();
        self
    }

    /// Set build-time only dependencies
    #[must_use]
    pub fn with_makedepends<I, S>(mut self, makedepends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.makedepends = makedepends.into_iter().map(Into::into).collect();
        self
    }

    /// Set source URLs
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Set the definition directory
    #[must_use]
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// All dependency edges, runtime and build-time
    pub fn all_dependencies(&self) -> BTreeSet<&str> {
        self.depends
            .iter()
            .chain(self.makedepends.iter())
            .map(String::as_str)
            .collect()
    }

    /// Whether the package is built from a VCS checkout
    pub fn is_vcs(&self) -> bool {
        is_vcs_name(&self.name)
    }
}

/// Whether a package name carries a VCS suffix
pub fn is_vcs_name(name: &str) -> bool {
    VCS_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Strip a version constraint from a dependency (`foo>=1.2` -> `foo`)
pub fn dependency_name(raw: &str) -> &str {
    raw.find(['<', '>', '='])
        .map_or(raw, |idx| &raw[..idx])
        .trim()
}

/// On-disk package definition (`package.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageDefinition {
    /// Package metadata
    pub package: PackageMetadata,
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageMetadata {
    /// Package name
    pub name: String,

    /// Upstream version
    pub version: String,

    /// Package release
    #[serde(default = "default_release")]
    pub release: u32,

    /// Epoch
    #[serde(default)]
    pub epoch: Option<u64>,

    /// Dependencies
    #[serde(default)]
    pub depends: Vec<String>,

    /// Build-time only dependencies
    #[serde(default)]
    pub makedepends: Vec<String>,

    /// Source URLs
    #[serde(default)]
    pub source: Vec<String>,
}

fn default_release() -> u32 {
    1
}

impl PackageDefinition {
    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Raw `[epoch:]version-release` string of this definition
    pub fn raw_version(&self) -> String {
        let meta = &self.package;
        match meta.epoch {
            Some(epoch) if epoch > 0 => format!("{epoch}:{}-{}", meta.version, meta.release),
            _ => format!("{}-{}", meta.version, meta.release),
        }
    }

    /// Convert into a [`Package`], dropping edges to externally provided names
    ///
    /// # Errors
    ///
    /// Returns `VersionError::MalformedVersion` if the declared version does not parse.
    pub fn into_package(
        self,
        dir: &Path,
        external: &BTreeSet<String>,
    ) -> Result<Package, crate::error::VersionError> {
        let version = VersionRecord::parse(&self.raw_version())?;
        let keep = |deps: Vec<String>| -> Vec<String> {
            deps.iter()
                .map(|d| dependency_name(d).to_string())
                .filter(|d| !d.is_empty() && !external.contains(d))
                .collect()
        };
        let meta = self.package;
        Ok(Package::new(meta.name, version)
            .with_depends(keep(meta.depends))
            .with_makedepends(keep(meta.makedepends))
            .with_sources(meta.source)
            .with_path(dir.to_path_buf()))
    }
}

/// A package left out of the run, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    /// Package name (or definition path when the name is unknown)
    pub name: String,
    /// Why it was excluded
    pub reason: String,
}

/// Result of loading a package tree
#[derive(Debug, Default)]
pub struct LoadedTree {
    /// Successfully loaded packages
    pub packages: Vec<Package>,
    /// Definitions excluded because their version is malformed
    pub excluded: Vec<Exclusion>,
}

/// Load every `package.toml` below `dir`
///
/// Definitions are visited in path order so repeated loads yield the same
/// sequence.
///
/// # Errors
///
/// Fails if the directory is missing or a definition is not valid TOML.
pub fn load_package_tree(dir: &Path, external: &BTreeSet<String>) -> Result<LoadedTree, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut tree = LoadedTree::default();
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == DEFINITION_FILE)
    {
        let path = entry.path();
        let content = filesystem::read_file(path)?;
        let definition =
            PackageDefinition::from_toml(&content).map_err(|e| LoadError::ParseError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        let name = definition.package.name.clone();
        let pkg_dir = path.parent().unwrap_or(dir);
        match definition.into_package(pkg_dir, external) {
            Ok(package) => {
                tracing::debug!("Loaded package {} {}", package.name, package.version);
                tree.packages.push(package);
            }
            Err(e) => {
                tracing::warn!("Excluding {name}: {e}");
                tree.excluded.push(Exclusion {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        "Loaded {} package definitions from {}",
        tree.packages.len(),
        dir.display()
    );
    Ok(tree)
}
