//! Status command implementation
//!
//! Implements `repoforge status` to list the last built version of every
//! package recorded in the version store.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::{self, OutputConfig};
use crate::core::state::{JsonFileStore, VersionStore};

/// Execute the status command
pub async fn execute(project_dir: &Path) -> Result<()> {
    let settings = super::load_settings(project_dir)?;
    let store = JsonFileStore::open(&settings.state_path)
        .with_context(|| format!("Failed to open {}", settings.state_path.display()))?;
    let recorded = store.all()?;

    if OutputConfig::current().json {
        return output::print_json(&recorded);
    }

    if recorded.is_empty() {
        output::print_line("No builds recorded yet");
        return Ok(());
    }
    for (name, stored) in &recorded {
        output::print_line(format!(
            "{name:<32} {:<20} built at {}",
            stored.version.to_string(),
            stored.built_at
        ));
    }
    Ok(())
}
