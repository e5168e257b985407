//! Default configuration values

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "repoforge.toml";

/// Default package definition tree, relative to the project root
pub const DEFAULT_PACKAGES_DIR: &str = "packages";

/// Default version store location, relative to the project root
pub const DEFAULT_STATE_PATH: &str = ".repoforge/state.json";

/// Default build log directory, relative to the project root
pub const DEFAULT_LOGS_DIR: &str = ".repoforge/logs";

/// Default build command, run once per package in its definition directory
pub const DEFAULT_BUILD_COMMAND: &str =
    "makepkg-mingw --noconfirm --noprogressbar --skippgpcheck --nocheck --syncdeps --rmdeps --cleanbuild -f";

/// Default build timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 3 * 60 * 60;
