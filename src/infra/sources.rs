//! File-backed reference sources
//!
//! A listing is a text snapshot of a package database. Two line shapes are
//! understood:
//!
//! - `repo name version [installed]` as printed by `pacman -Sl`
//! - `name version`
//!
//! Blank lines and lines starting with `#` are ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::staleness::ReferenceSource;
use crate::core::version::VersionRecord;
use crate::error::{LoadError, VersionError};
use crate::infra::filesystem;

/// Parse listing text into raw versions keyed by package name
///
/// Versions are kept unparsed so that one malformed entry only affects its
/// own package. When a name appears twice, the later line wins.
///
/// # Errors
///
/// Returns `InvalidListing` for a line with too few fields.
pub fn parse_listing(content: &str, path: &Path) -> Result<BTreeMap<String, String>, LoadError> {
    let mut versions = BTreeMap::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let (name, version) = match fields.as_slice() {
            [name, version] => (*name, *version),
            [name, version, flag, ..] if flag.starts_with('[') => (*name, *version),
            [_repo, name, version, ..] => (*name, *version),
            _ => {
                return Err(LoadError::InvalidListing {
                    path: path.to_path_buf(),
                    line: index + 1,
                    error: "expected `name version` or `repo name version`".to_string(),
                })
            }
        };
        versions.insert(name.to_string(), version.to_string());
    }

    Ok(versions)
}

/// Reference source answering from a listing file
#[derive(Debug, Clone)]
pub struct ListingSource {
    name: String,
    path: PathBuf,
    versions: BTreeMap<String, String>,
}

impl ListingSource {
    /// Load a listing file
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or has an invalid line.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = filesystem::read_file(path)?;
        let versions = parse_listing(&content, path)?;
        tracing::debug!("Loaded {} entries from {}", versions.len(), path.display());

        Ok(Self {
            name: format!("listing:{}", path.display()),
            path: path.to_path_buf(),
            versions,
        })
    }

    /// The file this source was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of packages in the listing
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether the listing is empty
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl ReferenceSource for ListingSource {
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
