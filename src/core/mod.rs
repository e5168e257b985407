//! Core business logic module
//!
//! Process spawning and listing files live in [`crate::infra`]; the core
//! talks to them through the [`supervisor::BuildExecutor`] and
//! [`staleness::ReferenceSource`] traits.
//!
//! # Submodules
//!
//! - [`version`] - Version records and pacman-style ordering
//! - [`package`] - Package definitions and tree loading
//! - [`graph`] - Dependency graph, build order, cycle detection
//! - [`state`] - Persisted last-built versions
//! - [`staleness`] - Comparison against reference sources
//! - [`scheduler`] - Build planning and dispatch
//! - [`supervisor`] - Execution of one build unit
//! - [`report`] - Run log and summary
//! - [`settings`] - Global and project configuration
//! - [`repository`] - Loaded repository for one invocation

pub mod graph;
pub mod package;
pub mod report;
pub mod repository;
pub mod scheduler;
pub mod settings;
pub mod staleness;
pub mod state;
pub mod supervisor;
pub mod version;
