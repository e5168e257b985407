//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod check;
pub mod import;
pub mod plan;
pub mod status;
pub mod vercmp;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::core::repository::Repository;
use crate::core::settings::Settings;
use crate::infra::dirs::RepoforgeDirs;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the staleness verdict of every package
    Check {
        /// Check only these packages and their dependencies
        #[arg(short, long)]
        package: Vec<String>,
    },

    /// Show what would be built, in build order
    Plan {
        /// Plan only these packages and their dependencies
        #[arg(short, long)]
        package: Vec<String>,
    },

    /// Build out-of-date packages
    Build {
        /// Build only these packages and their dependencies
        #[arg(short, long)]
        package: Vec<String>,

        /// Number of parallel jobs
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Per-package time limit in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Show the plan without building
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the last built version of every package
    Status,

    /// Seed the version store from a package listing
    Import {
        /// Listing file (`pacman -Sl` output or `name version` lines)
        listing: PathBuf,
    },

    /// Compare two version strings (prints -1, 0 or 1)
    Vercmp {
        /// First version
        a: String,
        /// Second version
        b: String,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self) -> Result<()> {
        match self {
            Self::Check { package } => {
                let current_dir = std::env::current_dir()?;
                check::execute(&current_dir, &package).await
            }
            Self::Plan { package } => {
                let current_dir = std::env::current_dir()?;
                plan::execute(&current_dir, &package).await
            }
            Self::Build {
                package,
                jobs,
                timeout,
                dry_run,
            } => {
                let current_dir = std::env::current_dir()?;
                let options = build::BuildOptions {
                    packages: package,
                    jobs,
                    timeout,
                    dry_run,
                };
                build::execute(&current_dir, options).await
            }
            Self::Status => {
                let current_dir = std::env::current_dir()?;
                status::execute(&current_dir).await
            }
            Self::Import { listing } => {
                let current_dir = std::env::current_dir()?;
                import::execute(&current_dir, &listing).await
            }
            Self::Vercmp { a, b } => vercmp::execute(&a, &b),
        }
    }
}

/// Load settings for a project directory
fn load_settings(project_dir: &Path) -> Result<Settings> {
    Settings::load(project_dir, &RepoforgeDirs::new()).context("Failed to load configuration")
}

/// Open the repository of a project directory
fn open_repository(settings: Settings) -> Result<Repository> {
    Repository::open(settings).context("Failed to load repository")
}
