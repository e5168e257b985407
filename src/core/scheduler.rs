//! Build scheduling
//!
//! Decides what to build and dispatches build units so that a package only
//! starts once every dependency built successfully. A failed package takes
//! its transitive dependents down with it; nothing else is affected.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::graph::PackageGraph;
use crate::core::package::Package;
use crate::core::report::{BuildOutcome, BuildRecord, BuildRun, RunLog};
use crate::core::staleness::{Assessment, StalenessVerdict};
use crate::core::state::VersionStore;
use crate::core::supervisor::{BuildExecutor, BuildSupervisor};
use crate::error::{GraphError, RepoforgeError, StorageError};

/// Per-package state during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting for dependencies
    Pending,
    /// All dependencies succeeded
    Ready,
    /// Build unit in flight
    Running,
    /// Built and recorded
    Succeeded,
    /// Build failed
    Failed,
    /// Never ran
    Skipped,
}

/// Packages to build, dependencies first
///
/// Contains exactly the build candidates (`stale`, `missing-locally`) in
/// topological order.
///
/// # Errors
///
/// Returns `CycleDetected` if the graph has a cycle.
pub fn plan<'g>(
    graph: &'g PackageGraph,
    verdicts: &BTreeMap<String, StalenessVerdict>,
) -> Result<Vec<&'g Package>, GraphError> {
    let order = graph.topological_order()?;
    Ok(order
        .into_iter()
        .filter(|p| {
            verdicts
                .get(&p.name)
                .is_some_and(|v| v.is_build_candidate())
        })
        .collect())
}

/// Progress callbacks for a run
pub trait RunObserver: Send + Sync {
    /// The build plan is known
    fn planned(&self, _packages: &[&Package]) {}

    /// A build unit was dispatched
    fn started(&self, _package: &Package) {}

    /// A package reached its terminal outcome
    fn finished(&self, _record: &BuildRecord) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Drives a run over a package graph
pub struct BuildScheduler<E, S> {
    supervisor: Arc<BuildSupervisor<E, S>>,
    jobs: usize,
    cancel: CancellationToken,
    observer: Arc<dyn RunObserver>,
}

impl<E, S> BuildScheduler<E, S>
where
    E: BuildExecutor,
    S: VersionStore + 'static,
{
    /// Create a scheduler running one build per CPU
    pub fn new(supervisor: BuildSupervisor<E, S>) -> Self {
        Self {
            supervisor: Arc::new(supervisor),
            jobs: num_cpus::get(),
            cancel: CancellationToken::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Limit the number of concurrent build units (at least one)
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Stop dispatching once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Report progress to `observer`
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Concurrency limit
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// The supervisor executing build units
    pub fn supervisor(&self) -> &BuildSupervisor<E, S> {
        &self.supervisor
    }

    /// Build every candidate of `graph`
    ///
    /// Every package of the graph ends up with exactly one record in the
    /// returned run.
    ///
    /// # Errors
    ///
    /// - `Graph` if the graph has a cycle (nothing is built)
    /// - `Storage` if the store is unavailable before the run
    /// - `RunAborted` if a success could not be recorded; in-flight builds
    ///   are drained first and the partial run comes with the error
    pub async fn run(
        &self,
        graph: &PackageGraph,
        assessment: &Assessment,
    ) -> Result<BuildRun, RepoforgeError> {
        let verdicts = assessment.verdicts();
        let planned = plan(graph, &verdicts)?;
        self.supervisor.store().check_available()?;

        let mut log = RunLog::start();
        log.exclude(assessment.excluded.iter().cloned());

        let candidates: BTreeSet<&str> = planned.iter().map(|p| p.name.as_str()).collect();
        for package in graph.packages() {
            if candidates.contains(package.name.as_str()) {
                continue;
            }
            let reason = verdicts.get(&package.name).map(|v| format!("verdict {v}"));
            log.record(BuildRecord::skipped(
                &package.name,
                package.version.clone(),
                BuildOutcome::SkippedNotStale,
                reason,
            ));
        }

        self.observer.planned(&planned);
        tracing::info!(
            "{} of {} packages to build, {} jobs",
            planned.len(),
            graph.len(),
            self.jobs
        );

        let mut states: BTreeMap<&str, NodeState> = planned
            .iter()
            .map(|p| (p.name.as_str(), NodeState::Pending))
            .collect();
        // A fresh package in between does not decouple two planned ones
        let blockers: BTreeMap<&str, Vec<String>> = planned
            .iter()
            .map(|p| {
                let deps = graph
                    .transitive_dependencies(&p.name)
                    .into_iter()
                    .filter(|dep| candidates.contains(dep.as_str()))
                    .collect();
                (p.name.as_str(), deps)
            })
            .collect();
        let mut tasks = JoinSet::new();
        let mut fatal: Option<StorageError> = None;
        let mut stopping = false;

        loop {
            if !stopping && self.cancel.is_cancelled() {
                tracing::warn!("Run cancelled, waiting for {} running builds", tasks.len());
                stopping = true;
            }

            if !stopping {
                for package in &planned {
                    if tasks.len() >= self.jobs {
                        break;
                    }
                    if states.get(package.name.as_str()) != Some(&NodeState::Pending) {
                        continue;
                    }
                    let ready = blockers
                        .get(package.name.as_str())
                        .into_iter()
                        .flatten()
                        .all(|dep| states.get(dep.as_str()) == Some(&NodeState::Succeeded));
                    if !ready {
                        continue;
                    }

                    transition(&mut states, &package.name, NodeState::Ready);
                    self.observer.started(package);
                    transition(&mut states, &package.name, NodeState::Running);

                    let supervisor = Arc::clone(&self.supervisor);
                    let package = (*package).clone();
                    tasks.spawn(async move {
                        let result = supervisor.execute(&package).await;
                        (package, result)
                    });
                }
            }

            if tasks.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = tasks.join_next() => joined,
                () = self.cancel.cancelled(), if !stopping => continue,
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((package, Ok(record))) => {
                    let succeeded = record.outcome == BuildOutcome::Succeeded;
                    let state = if succeeded {
                        NodeState::Succeeded
                    } else {
                        NodeState::Failed
                    };
                    transition(&mut states, &package.name, state);
                    self.observer.finished(&record);
                    log.record(record);
                    if !succeeded {
                        self.skip_dependents(graph, &package.name, &mut states, &mut log);
                    }
                }
                Ok((package, Err(e))) => {
                    tracing::error!("Could not record build of {}: {e}", package.name);
                    transition(&mut states, &package.name, NodeState::Failed);
                    let record = BuildRecord::skipped(
                        &package.name,
                        package.version.clone(),
                        BuildOutcome::Failed,
                        Some(e.to_string()),
                    );
                    self.observer.finished(&record);
                    log.record(record);
                    self.skip_dependents(graph, &package.name, &mut states, &mut log);
                    stopping = true;
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    // The unit stays `running` and is settled below
                    tracing::error!("Build task ended abnormally: {e}");
                }
            }
        }

        for package in &planned {
            if states.get(package.name.as_str()) == Some(&NodeState::Running) {
                transition(&mut states, &package.name, NodeState::Failed);
                let record = BuildRecord::skipped(
                    &package.name,
                    package.version.clone(),
                    BuildOutcome::Failed,
                    Some("build task aborted".to_string()),
                );
                self.observer.finished(&record);
                log.record(record);
                self.skip_dependents(graph, &package.name, &mut states, &mut log);
            }
        }

        for package in &planned {
            if matches!(
                states.get(package.name.as_str()),
                Some(NodeState::Pending | NodeState::Ready)
            ) {
                transition(&mut states, &package.name, NodeState::Skipped);
                let record = BuildRecord::skipped(
                    &package.name,
                    package.version.clone(),
                    BuildOutcome::SkippedCancelled,
                    Some("run aborted before the build started".to_string()),
                );
                self.observer.finished(&record);
                log.record(record);
            }
        }

        if let Some(e) = fatal {
            let run = log.abort(e.to_string());
            tracing::error!("Run aborted with {} records", run.records().len());
            return Err(RepoforgeError::RunAborted {
                run: Box::new(run),
                source: e,
            });
        }

        let run = log.finish();
        tracing::info!("Run finished with {} records", run.records().len());
        Ok(run)
    }

    fn skip_dependents(
        &self,
        graph: &PackageGraph,
        failed: &str,
        states: &mut BTreeMap<&str, NodeState>,
        log: &mut RunLog,
    ) {
        for name in graph.transitive_dependents(failed) {
            let Some(state) = states.get_mut(name.as_str()) else {
                continue;
            };
            if *state != NodeState::Pending {
                continue;
            }
            *state = NodeState::Skipped;

            let Some(package) = graph.get(&name) else {
                continue;
            };
            tracing::warn!("Skipping {name}: dependency {failed} failed");
            let record = BuildRecord::skipped(
                &name,
                package.version.clone(),
                BuildOutcome::SkippedDependencyFailed,
                Some(format!("dependency {failed} failed")),
            );
            self.observer.finished(&record);
            log.record(record);
        }
    }
}

fn transition(states: &mut BTreeMap<&str, NodeState>, name: &str, to: NodeState) {
    if let Some(state) = states.get_mut(name) {
        tracing::debug!("{name}: {state:?} -> {to:?}");
        *state = to;
    }
}
