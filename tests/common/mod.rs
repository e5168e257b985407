//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary repository with a package tree and an isolated
/// global config directory.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        let project = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        };
        project.create_dir("packages");
        project.create_dir("global-config");
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Add a package definition under `packages/<name>/package.toml`
    pub fn add_package(&self, name: &str, version: &str, depends: &[&str]) {
        let depends: Vec<String> = depends.iter().map(|d| format!("\"{d}\"")).collect();
        self.create_file(
            &format!("packages/{name}/package.toml"),
            &format!(
                "[package]\nname = \"{name}\"\nversion = \"{version}\"\ndepends = [{}]\n",
                depends.join(", ")
            ),
        );
    }

    /// Write `repoforge.toml` with the given build command and extra content
    pub fn write_config(&self, command: &str, extra: &str) {
        self.create_file(
            "repoforge.toml",
            &format!("[build]\ncommand = '''{command} '''\njobs = 2\n{extra}"),
        );
    }

    /// Run the repoforge binary in the project directory
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_repoforge"))
            .current_dir(self.dir.path())
            .env("REPOFORGE_CONFIG_DIR", self.dir.path().join("global-config"))
            .env_remove("RUST_LOG")
            .args(args)
            .output()
            .expect("Failed to execute repoforge")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Build command failing for packages named `broken`
pub const FAIL_BROKEN: &str =
    r#"sh -c 'echo building $REPOFORGE_PACKAGE; [ "$REPOFORGE_PACKAGE" != broken ]'"#;

/// Stdout of a finished command as a string
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Stderr of a finished command as a string
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
