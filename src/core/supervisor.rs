//! Supervised execution of a single build unit
//!
//! Runs the build executor for one package with a time limit, keeps the
//! captured output out of the outcome (only its path is recorded) and
//! updates the version store on success only.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::core::package::Package;
use crate::core::report::{unix_now, BuildOutcome, BuildRecord};
use crate::core::state::{StoredVersion, VersionStore};
use crate::error::StorageError;
use crate::infra::filesystem;

/// Everything an executor needs to build one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    /// Directory the build runs in (the package definition directory)
    pub working_dir: Option<PathBuf>,
    /// File receiving stdout and stderr
    pub log_path: PathBuf,
    /// Time limit enforced by the supervisor
    pub timeout: Duration,
}

/// How the build process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Exited with a status code
    Exited(i32),
    /// Terminated without an exit code (signal, crash)
    Terminated,
    /// Could not be started
    SpawnFailed(String),
}

impl ProcessStatus {
    /// Whether the process reported success
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    fn describe(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with status {code}"),
            Self::Terminated => "terminated without exit status".to_string(),
            Self::SpawnFailed(error) => format!("failed to start: {error}"),
        }
    }
}

/// Result reported by an executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOutput {
    /// Exit status
    pub status: ProcessStatus,
    /// Where the captured output was written, if anywhere
    pub output: Option<PathBuf>,
}

/// Capability to run the external build toolchain for one package
pub trait BuildExecutor: Send + Sync + 'static {
    /// Build `package` in `context`
    fn run(
        &self,
        package: &str,
        context: &BuildContext,
    ) -> impl Future<Output = ExecutorOutput> + Send;
}

/// Supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory for build logs and failure markers
    pub logs_dir: PathBuf,
    /// Upper bound for one build
    pub timeout: Duration,
    /// Fail packages with a failure marker from an earlier run without building
    pub honor_failure_markers: bool,
}

/// Executes one package's build and records the result
pub struct BuildSupervisor<E, S> {
    executor: E,
    store: Arc<S>,
    config: SupervisorConfig,
}

impl<E, S> BuildSupervisor<E, S>
where
    E: BuildExecutor,
    S: VersionStore + 'static,
{
    /// Create a supervisor
    pub fn new(executor: E, store: Arc<S>, config: SupervisorConfig) -> Self {
        Self {
            executor,
            store,
            config,
        }
    }

    /// The executor running build units
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// The version store this supervisor writes to
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Supervisor settings
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Path of the log file for a package build
    pub fn log_path(&self, package: &Package) -> PathBuf {
        self.config
            .logs_dir
            .join(format!("{}.log", artifact_key(package)))
    }

    /// Path of the failure marker for a package build
    pub fn marker_path(&self, package: &Package) -> PathBuf {
        self.config
            .logs_dir
            .join(format!("{}.failed", artifact_key(package)))
    }

    /// Build one package
    ///
    /// Non-zero exit, crash and timeout all map to `failed`; the store is
    /// only written after a success.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when a successful build cannot be recorded.
    pub async fn execute(&self, package: &Package) -> Result<BuildRecord, StorageError> {
        let log_path = self.log_path(package);
        let marker_path = self.marker_path(package);

        if self.config.honor_failure_markers && marker_path.exists() {
            tracing::warn!(
                "{} found, build aborted. Delete the file to build again",
                marker_path.display()
            );
            return Ok(BuildRecord::skipped(
                &package.name,
                package.version.clone(),
                BuildOutcome::Failed,
                Some(format!("failure marker {} present", marker_path.display())),
            ));
        }

        let started_at = unix_now();
        if let Err(e) = filesystem::create_dir_all(&self.config.logs_dir) {
            return Ok(self.failed(package, started_at, None, e.to_string()));
        }

        let context = BuildContext {
            working_dir: package.path.clone(),
            log_path: log_path.clone(),
            timeout: self.config.timeout,
        };

        tracing::info!("Building {} {}", package.name, package.version);
        let run = self.executor.run(&package.name, &context);
        let output = match tokio::time::timeout(self.config.timeout, run).await {
            Ok(output) => output,
            Err(_) => {
                let reason = format!("timed out after {}s", self.config.timeout.as_secs());
                let output = log_path.exists().then_some(log_path);
                let record = self.failed(package, started_at, output, reason);
                write_marker(&marker_path);
                return Ok(record);
            }
        };

        if !output.status.success() {
            let record = self.failed(package, started_at, output.output, output.status.describe());
            write_marker(&marker_path);
            return Ok(record);
        }

        self.record_success(package).await?;
        if let Err(e) = filesystem::remove_file(&marker_path) {
            tracing::warn!("Could not remove stale failure marker: {e}");
        }

        tracing::info!("Built {} {}", package.name, package.version);
        Ok(BuildRecord {
            name: package.name.clone(),
            version: package.version.clone(),
            outcome: BuildOutcome::Succeeded,
            started_at: Some(started_at),
            finished_at: unix_now(),
            output: output.output,
            reason: None,
        })
    }

    /// Write the built version to the store off the async workers
    async fn record_success(&self, package: &Package) -> Result<(), StorageError> {
        let store = Arc::clone(&self.store);
        let name = package.name.clone();
        let record = StoredVersion {
            version: package.version.clone(),
            built_at: unix_now(),
        };

        match tokio::task::spawn_blocking(move || store.put(&name, record)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(StorageError::Interrupted {
                package: package.name.clone(),
            }),
        }
    }

    fn failed(
        &self,
        package: &Package,
        started_at: u64,
        output: Option<PathBuf>,
        reason: String,
    ) -> BuildRecord {
        tracing::error!("Build of {} failed: {reason}", package.name);
        BuildRecord {
            name: package.name.clone(),
            version: package.version.clone(),
            outcome: BuildOutcome::Failed,
            started_at: Some(started_at),
            finished_at: unix_now(),
            output,
            reason: Some(reason),
        }
    }
}

/// File name stem for per-build artifacts, safe on every platform
fn artifact_key(package: &Package) -> String {
    format!("{}-{}", package.name, package.version).replace(':', "~")
}

fn write_marker(path: &Path) {
    if let Err(e) = filesystem::write_file(path, "") {
        tracing::warn!("Could not write failure marker: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::InMemoryStore;
    use crate::core::version::VersionRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixedExecutor {
        status: ProcessStatus,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedExecutor {
        fn new(status: ProcessStatus) -> Self {
            Self {
                status,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl BuildExecutor for FixedExecutor {
        async fn run(&self, _package: &str, context: &BuildContext) -> ExecutorOutput {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            std::fs::write(&context.log_path, "build output").unwrap();
            ExecutorOutput {
                status: self.status.clone(),
                output: Some(context.log_path.clone()),
            }
        }
    }

    fn supervisor(
        executor: FixedExecutor,
        store: Arc<InMemoryStore>,
        logs: &Path,
    ) -> BuildSupervisor<FixedExecutor, InMemoryStore> {
        BuildSupervisor::new(
            executor,
            store,
            SupervisorConfig {
                logs_dir: logs.to_path_buf(),
                timeout: Duration::from_secs(5),
                honor_failure_markers: false,
            },
        )
    }

    fn zlib() -> Package {
        Package::new("zlib", VersionRecord::new(1, "1.3.1", 2))
    }

    #[tokio::test]
    async fn test_success_updates_store() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let sup = supervisor(FixedExecutor::new(ProcessStatus::Exited(0)), store.clone(), temp.path());

        let record = sup.execute(&zlib()).await.unwrap();
        assert_eq!(record.outcome, BuildOutcome::Succeeded);
        assert_eq!(record.output, Some(temp.path().join("zlib-1~1.3.1-2.log")));
        assert_eq!(store.get("zlib").unwrap().unwrap().version, zlib().version);
    }

    #[tokio::test]
    async fn test_failure_leaves_store_untouched() {
        let temp = TempDir::new().unwrap();
        let previous = StoredVersion {
            version: VersionRecord::new(1, "1.3.0", 1),
            built_at: 42,
        };
        let store = Arc::new(InMemoryStore::with_entries([(
            "zlib".to_string(),
            previous.clone(),
        )]));
        let sup = supervisor(FixedExecutor::new(ProcessStatus::Exited(2)), store.clone(), temp.path());

        let record = sup.execute(&zlib()).await.unwrap();
        assert_eq!(record.outcome, BuildOutcome::Failed);
        assert!(record.reason.unwrap().contains("status 2"));
        assert_eq!(store.get("zlib").unwrap(), Some(previous));
        assert!(sup.marker_path(&zlib()).exists());
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let mut executor = FixedExecutor::new(ProcessStatus::Exited(0));
        executor.delay = Duration::from_secs(60);
        let sup = BuildSupervisor::new(
            executor,
            store.clone(),
            SupervisorConfig {
                logs_dir: temp.path().to_path_buf(),
                timeout: Duration::from_millis(50),
                honor_failure_markers: false,
            },
        );

        let record = sup.execute(&zlib()).await.unwrap();
        assert_eq!(record.outcome, BuildOutcome::Failed);
        assert!(record.reason.unwrap().contains("timed out"));
        assert!(store.get("zlib").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_marker_blocks_build_when_honored() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let sup = BuildSupervisor::new(
            FixedExecutor::new(ProcessStatus::Exited(0)),
            store,
            SupervisorConfig {
                logs_dir: temp.path().to_path_buf(),
                timeout: Duration::from_secs(5),
                honor_failure_markers: true,
            },
        );
        std::fs::write(sup.marker_path(&zlib()), "").unwrap();

        let record = sup.execute(&zlib()).await.unwrap();
        assert_eq!(record.outcome, BuildOutcome::Failed);
        assert_eq!(sup.executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_clears_marker() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let sup = supervisor(FixedExecutor::new(ProcessStatus::Exited(0)), store, temp.path());
        std::fs::write(sup.marker_path(&zlib()), "").unwrap();

        sup.execute(&zlib()).await.unwrap();
        assert!(!sup.marker_path(&zlib()).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_success_recorded_from_worker_runtime() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let sup = supervisor(FixedExecutor::new(ProcessStatus::Exited(0)), store.clone(), temp.path());

        let record = sup.execute(&zlib()).await.unwrap();
        assert_eq!(record.outcome, BuildOutcome::Succeeded);
        assert_eq!(store.get("zlib").unwrap().unwrap().version, zlib().version);
    }

    #[tokio::test]
    async fn test_unrecordable_success_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let sup = supervisor(FixedExecutor::new(ProcessStatus::Exited(0)), store, temp.path());

        assert!(sup.execute(&zlib()).await.is_err());
    }
}
