//! Repoforge - package repository build orchestration
//!
//! This library reconciles the versions of a package definition tree with
//! the versions last built and with reference package databases, then
//! rebuilds out-of-date packages in dependency order.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Business logic: versions, graph, staleness, scheduling
//! - [`infra`] - Infrastructure layer (filesystem, processes, listings)
//! - [`config`] - Configuration constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
