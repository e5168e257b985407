//! Persisted build state
//!
//! Records the last successfully built version of every package. This is
//! the only durable state the build core owns. The file form
//! (`state.json`) is keyed by package name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::core::version::VersionRecord;
use crate::error::StorageError;
use crate::infra::filesystem;

/// State file format version
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Last successful build of a package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredVersion {
    /// Version that was built
    pub version: VersionRecord,
    /// Unix timestamp of the successful build
    pub built_at: u64,
}

/// Key-value store of last built versions
///
/// Keys are package names, so builds of different packages never touch
/// the same entry.
pub trait VersionStore: Send + Sync {
    /// Verify the store can be read and written
    fn check_available(&self) -> Result<(), StorageError>;

    /// Last built version of a package
    fn get(&self, name: &str) -> Result<Option<StoredVersion>, StorageError>;

    /// Record a successful build; either fully applied or not at all
    fn put(&self, name: &str, record: StoredVersion) -> Result<(), StorageError>;

    /// Every recorded package
    fn all(&self) -> Result<BTreeMap<String, StoredVersion>, StorageError>;
}

/// State file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateFile {
    /// State file format version
    pub version: u32,

    /// Last built versions
    #[serde(default)]
    pub packages: BTreeMap<String, StoredVersion>,
}

impl StateFile {
    /// Create an empty state file
    pub fn new() -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            packages: BTreeMap::new(),
        }
    }

    /// Parse from JSON string
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Version store backed by a JSON file
///
/// The whole file is rewritten atomically on each `put`; the mutex
/// serializes those rewrites.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl JsonFileStore {
    /// Open a store, starting empty if the file does not exist yet
    ///
    /// # Errors
    ///
    /// - `StorageUnavailable` if the file exists but cannot be read
    /// - `Corrupt` if the file is not a valid state file
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let state = if path.exists() {
            let content =
                filesystem::read_file(path).map_err(|e| StorageError::StorageUnavailable {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                })?;
            StateFile::from_json(&content).map_err(|e| StorageError::Corrupt {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?
        } else {
            StateFile::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &StateFile) -> Result<(), StorageError> {
        let content = state.to_json().map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            error: e.to_string(),
        })?;
        filesystem::write_file_atomic(&self.path, &content).map_err(|e| {
            StorageError::StorageUnavailable {
                path: self.path.clone(),
                error: e.to_string(),
            }
        })
    }
}

impl VersionStore for JsonFileStore {
    fn check_available(&self) -> Result<(), StorageError> {
        let unavailable = |error: String| StorageError::StorageUnavailable {
            path: self.path.clone(),
            error,
        };

        if let Some(parent) = self.path.parent() {
            filesystem::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }

        // Writing the current content back proves the location is writable
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.persist(&state)
    }

    fn get(&self, name: &str) -> Result<Option<StoredVersion>, StorageError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.packages.get(name).cloned())
    }

    fn put(&self, name: &str, record: StoredVersion) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = state.packages.insert(name.to_string(), record);

        if let Err(e) = self.persist(&state) {
            // Keep memory in line with the file that is still on disk
            match previous {
                Some(prev) => state.packages.insert(name.to_string(), prev),
                None => state.packages.remove(name),
            };
            return Err(e);
        }

        tracing::debug!("Recorded build of {name} in {}", self.path.display());
        Ok(())
    }

    fn all(&self) -> Result<BTreeMap<String, StoredVersion>, StorageError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.packages.clone())
    }
}

/// In-memory version store
///
/// Substitutes for the file store in tests; can be switched to fail every
/// operation to exercise storage outages.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    packages: Mutex<BTreeMap<String, StoredVersion>>,
    unavailable: std::sync::atomic::AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entries
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, StoredVersion)>,
    {
        Self {
            packages: Mutex::new(entries.into_iter().collect()),
            unavailable: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Make every subsequent operation fail with `StorageUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable
            .store(unavailable, std::sync::atomic::Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StorageError::StorageUnavailable {
                path: PathBuf::from("<memory>"),
                error: "store marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl VersionStore for InMemoryStore {
    fn check_available(&self) -> Result<(), StorageError> {
        self.ensure_available()
    }

    fn get(&self, name: &str) -> Result<Option<StoredVersion>, StorageError> {
        self.ensure_available()?;
        let packages = self.packages.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(packages.get(name).cloned())
    }

    fn put(&self, name: &str, record: StoredVersion) -> Result<(), StorageError> {
        self.ensure_available()?;
        let mut packages = self.packages.lock().unwrap_or_else(PoisonError::into_inner);
        packages.insert(name.to_string(), record);
        Ok(())
    }

    fn all(&self) -> Result<BTreeMap<String, StoredVersion>, StorageError> {
        self.ensure_available()?;
        let packages = self.packages.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(packages.clone())
    }
}
