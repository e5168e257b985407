//! Infrastructure layer
//!
//! Handles I/O: filesystem access, external build processes and listing
//! snapshots.

pub mod dirs;
pub mod executor;
pub mod filesystem;
pub mod sources;
