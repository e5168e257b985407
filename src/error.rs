//! Error types for repoforge
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::report::BuildRun;

/// Version parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Version string cannot be split into epoch, version and release
    #[error("Malformed version '{raw}': {reason}")]
    MalformedVersion { raw: String, reason: String },
}

/// Package graph errors
///
/// All of these are fatal to planning: no build starts when the graph is invalid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Edge target missing from the package set
    #[error("Unknown dependency: '{dependency}' required by '{package}'")]
    UnknownDependency { package: String, dependency: String },

    /// Package lists itself as a dependency
    #[error("Package '{package}' depends on itself")]
    SelfDependency { package: String },

    /// Circular dependency detected
    #[error("Circular dependency detected: {}", format_cycle(cycle))]
    CycleDetected { cycle: Vec<String> },

    /// Same package name defined twice
    #[error("Package '{package}' is defined more than once")]
    DuplicatePackage { package: String },

    /// Requested seed package does not exist
    #[error("Package '{package}' not found in the package tree")]
    UnknownPackage { package: String },
}

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {first}", cycle.join(" -> ")),
        None => String::new(),
    }
}

/// Persisted version store errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Store cannot be read or written
    #[error("Version store at '{path}' is unavailable: {error}")]
    StorageUnavailable { path: PathBuf, error: String },

    /// Store contents are not valid
    #[error("Version store at '{path}' is corrupt: {error}")]
    Corrupt { path: PathBuf, error: String },

    /// A store write was cut short by runtime shutdown
    #[error("Recording the build of '{package}' was interrupted")]
    Interrupted { package: String },
}

/// Build errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Build process exited unsuccessfully
    #[error("Build failed for package '{package}': {reason}")]
    BuildFailed { package: String, reason: String },

    /// Build command not found
    #[error("Build command not found: {command}")]
    CommandNotFound { command: String },
}

/// Package definition loading errors
#[derive(Error, Debug)]
pub enum LoadError {
    /// Package definition could not be parsed
    #[error("Failed to parse package definition '{path}': {error}")]
    ParseError { path: PathBuf, error: String },

    /// Package tree missing
    #[error("Package directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// Listing snapshot could not be parsed
    #[error("Invalid listing '{path}' at line {line}: {error}")]
    InvalidListing {
        path: PathBuf,
        line: usize,
        error: String,
    },

    /// Filesystem error while loading
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: String, error: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to rename file
    #[error("Failed to rename '{from}' to '{to}': {error}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },

    /// Failed to remove file
    #[error("Failed to remove file '{path}': {error}")]
    RemoveFile { path: PathBuf, error: String },
}

/// Top-level repoforge error type
#[derive(Error, Debug)]
pub enum RepoforgeError {
    /// Version error
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// Graph error
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Build error
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Load error
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Config error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// A run stopped by a storage failure after builds had started
    #[error("Run aborted: {source}")]
    RunAborted {
        /// Outcomes decided before the run stopped
        run: Box<BuildRun>,
        /// The storage failure
        source: StorageError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_closes_the_loop() {
        let err = GraphError::CycleDetected {
            cycle: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Circular dependency detected: a -> b -> c -> a"
        );
    }

    #[test]
    fn test_errors_convert_to_top_level() {
        let err: RepoforgeError = GraphError::SelfDependency {
            package: "zlib".to_string(),
        }
        .into();
        assert!(matches!(err, RepoforgeError::Graph(_)));
    }
}
