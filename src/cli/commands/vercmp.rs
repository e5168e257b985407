//! Vercmp command implementation
//!
//! Implements `repoforge vercmp` with the output convention of pacman's
//! `vercmp`: `-1`, `0` or `1`.

use std::cmp::Ordering;

use anyhow::Result;

use crate::core::version;

/// Execute the vercmp command
pub fn execute(a: &str, b: &str) -> Result<()> {
    let result = match version::vercmp(a, b)? {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    };
    // Printed even with --quiet; the number is the command's output
    println!("{result}");
    Ok(())
}
