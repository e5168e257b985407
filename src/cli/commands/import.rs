//! Import command implementation
//!
//! Implements `repoforge import` to seed the version store from a package
//! database listing, so an existing repository is not rebuilt from scratch.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::{self, status, OutputConfig};
use crate::core::report::unix_now;
use crate::core::state::{JsonFileStore, StoredVersion, VersionStore};
use crate::core::version::VersionRecord;
use crate::infra::{filesystem, sources};

/// Execute the import command
pub async fn execute(project_dir: &Path, listing: &Path) -> Result<()> {
    let settings = super::load_settings(project_dir)?;
    let listing = project_dir.join(listing);
    let content = filesystem::read_file(&listing)?;
    let entries = sources::parse_listing(&content, &listing)?;

    let store = JsonFileStore::open(&settings.state_path)
        .with_context(|| format!("Failed to open {}", settings.state_path.display()))?;
    store.check_available()?;

    let built_at = unix_now();
    let mut imported = 0;
    let mut rejected = Vec::new();
    for (name, raw) in entries {
        match VersionRecord::parse(&raw) {
            Ok(version) => {
                store.put(&name, StoredVersion { version, built_at })?;
                imported += 1;
            }
            Err(e) => {
                tracing::warn!("Not importing {name}: {e}");
                rejected.push(name);
            }
        }
    }

    if OutputConfig::current().json {
        return output::print_json(&serde_json::json!({
            "imported": imported,
            "rejected": rejected,
        }));
    }
    output::print_line(format!(
        "{} Imported {imported} packages into {}",
        status::SUCCESS,
        settings.state_path.display()
    ));
    if !rejected.is_empty() {
        output::print_line(format!(
            "{} Skipped malformed versions: {}",
            status::WARNING,
            rejected.join(", ")
        ));
    }
    Ok(())
}
