//! Platform-specific directory management
//!
//! Resolves where the global configuration lives. Follows the XDG Base
//! Directory Specification on Linux and the standard locations elsewhere.
//!
//! `REPOFORGE_CONFIG_DIR` overrides the default config directory.

use std::env;
use std::path::PathBuf;

/// Environment variable name for the config directory override
pub const ENV_CONFIG_DIR: &str = "REPOFORGE_CONFIG_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "repoforge";

/// Global config file name
const CONFIG_FILE: &str = "config.toml";

/// Platform-specific directory provider for repoforge
#[derive(Debug, Clone)]
pub struct RepoforgeDirs {
    config_dir: PathBuf,
}

impl RepoforgeDirs {
    /// Create a new `RepoforgeDirs` instance
    ///
    /// Checks the environment first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_dir: Self::resolve_config_dir(),
        }
    }

    /// Get the config directory path
    ///
    /// - Linux: `$XDG_CONFIG_HOME/repoforge` or `~/.config/repoforge`
    /// - macOS: `~/Library/Application Support/repoforge`
    /// - Windows: `%APPDATA%\repoforge`
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Get the global config file path
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    fn resolve_config_dir() -> PathBuf {
        if let Ok(path) = env::var(ENV_CONFIG_DIR) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                // Fallback to home directory
                dirs::home_dir()
                    .map(|h| h.join(".config").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".config").join(APP_NAME))
            })
    }
}

impl Default for RepoforgeDirs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_not_empty() {
        let dirs = RepoforgeDirs::new();
        assert!(!dirs.config_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_global_config_path_is_under_config_dir() {
        let dirs = RepoforgeDirs::new();
        assert!(dirs.global_config_path().starts_with(dirs.config_dir()));
        assert!(dirs.global_config_path().ends_with("config.toml"));
    }
}
