//! Configuration management
//!
//! Two optional TOML files feed the effective settings of a run:
//!
//! - the global `config.toml` in the config directory, with default build
//!   options shared by every repository on the machine
//! - the project `repoforge.toml` at the repository root
//!
//! Project values override global values, which override the built-in
//! defaults. Command-line flags are applied on top by the CLI.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::error::ConfigError;
use crate::infra::dirs::RepoforgeDirs;
use crate::infra::filesystem;

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default build options
    #[serde(default)]
    pub build: BuildOptions,
}

/// Build options, shared by the global and project files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Build command line
    pub command: Option<String>,

    /// Number of concurrent builds
    pub jobs: Option<usize>,

    /// Per-package time limit in seconds
    pub timeout_secs: Option<u64>,

    /// Build VCS packages too
    pub include_vcs: Option<bool>,

    /// Fail packages with a failure marker without building them
    pub honor_failure_markers: Option<bool>,
}

impl BuildOptions {
    /// Fill unset values from `fallback`
    fn or(self, fallback: &Self) -> Self {
        Self {
            command: self.command.or_else(|| fallback.command.clone()),
            jobs: self.jobs.or(fallback.jobs),
            timeout_secs: self.timeout_secs.or(fallback.timeout_secs),
            include_vcs: self.include_vcs.or(fallback.include_vcs),
            honor_failure_markers: self
                .honor_failure_markers
                .or(fallback.honor_failure_markers),
        }
    }
}

/// Repository layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoOptions {
    /// Package definition tree
    pub packages_dir: Option<PathBuf>,

    /// Version store file
    pub state_path: Option<PathBuf>,

    /// Build log directory
    pub logs_dir: Option<PathBuf>,
}

/// Graph options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphOptions {
    /// Dependencies provided outside the tree
    #[serde(default)]
    pub external: BTreeSet<String>,
}

/// A configured reference source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Versions declared in the package tree
    Declared,
    /// Listing snapshot file
    Listing {
        /// Path to the listing, relative to the project root
        path: PathBuf,
    },
}

/// Project configuration (`repoforge.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Repository layout
    #[serde(default)]
    pub repo: RepoOptions,

    /// Build options
    #[serde(default)]
    pub build: BuildOptions,

    /// Graph options
    #[serde(default)]
    pub graph: GraphOptions,

    /// Reference sources in priority order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn load_toml<T>(path: &Path) -> Result<T, ConfigError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if !path.exists() {
        return Ok(T::default());
    }

    let content = filesystem::read_file(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}

impl GlobalConfig {
    /// Load the global configuration; a missing file yields defaults
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the file exists but is not valid TOML.
    pub fn load(dirs: &RepoforgeDirs) -> Result<Self, ConfigError> {
        Self::load_from_path(&dirs.global_config_path())
    }

    /// Load global configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        load_toml(path)
    }
}

impl ProjectConfig {
    /// Load `repoforge.toml` from a project root; a missing file yields defaults
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        Self::load_from_path(&root.join(defaults::PROJECT_CONFIG_FILE))
    }

    /// Load project configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        load_toml(path)
    }
}

/// Effective settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    /// Project root
    pub root: PathBuf,
    /// Package definition tree
    pub packages_dir: PathBuf,
    /// Version store file
    pub state_path: PathBuf,
    /// Build log directory
    pub logs_dir: PathBuf,
    /// Build command line
    pub command: String,
    /// Number of concurrent builds
    pub jobs: usize,
    /// Per-package time limit
    pub timeout: Duration,
    /// Build VCS packages too
    pub include_vcs: bool,
    /// Fail marked packages without building
    pub honor_failure_markers: bool,
    /// Dependencies provided outside the tree
    pub external: BTreeSet<String>,
    /// Reference sources in priority order, paths resolved
    pub sources: Vec<SourceConfig>,
}

impl Settings {
    /// Load and merge both configuration files for a project
    ///
    /// # Errors
    ///
    /// Fails if either file is unreadable or holds invalid values.
    pub fn load(root: &Path, dirs: &RepoforgeDirs) -> Result<Self, ConfigError> {
        let global = GlobalConfig::load(dirs)?;
        let project = ProjectConfig::load(root)?;
        Self::merge(root, &global, project)
    }

    /// Merge configuration layers over the built-in defaults
    ///
    /// # Errors
    ///
    /// Returns `Invalid` for zero jobs, a zero timeout or an empty command.
    pub fn merge(
        root: &Path,
        global: &GlobalConfig,
        project: ProjectConfig,
    ) -> Result<Self, ConfigError> {
        let build = project.build.or(&global.build);
        let resolve = |path: Option<PathBuf>, default: &str| {
            root.join(path.unwrap_or_else(|| PathBuf::from(default)))
        };

        let jobs = build.jobs.unwrap_or_else(num_cpus::get);
        if jobs == 0 {
            return Err(ConfigError::Invalid {
                message: "build.jobs must be at least 1".to_string(),
            });
        }

        let timeout_secs = build.timeout_secs.unwrap_or(defaults::DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "build.timeout_secs must be at least 1".to_string(),
            });
        }

        let command = build
            .command
            .unwrap_or_else(|| defaults::DEFAULT_BUILD_COMMAND.to_string());
        if command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "build.command must not be empty".to_string(),
            });
        }

        let sources = project
            .sources
            .into_iter()
            .map(|source| match source {
                SourceConfig::Listing { path } => SourceConfig::Listing {
                    path: root.join(path),
                },
                SourceConfig::Declared => SourceConfig::Declared,
            })
            .collect();

        Ok(Self {
            root: root.to_path_buf(),
            packages_dir: resolve(project.repo.packages_dir, defaults::DEFAULT_PACKAGES_DIR),
            state_path: resolve(project.repo.state_path, defaults::DEFAULT_STATE_PATH),
            logs_dir: resolve(project.repo.logs_dir, defaults::DEFAULT_LOGS_DIR),
            command,
            jobs,
            timeout: Duration::from_secs(timeout_secs),
            include_vcs: build.include_vcs.unwrap_or(false),
            honor_failure_markers: build.honor_failure_markers.unwrap_or(false),
            external: project.graph.external,
            sources,
        })
    }
}
