//! Adapters for the external collaborators: function matching, decompilation,
//! and analysis providers.
//!
//! Each concern is a trait with one implementation per backend. Selection
//! goes through the closed enums in [`crate::config`], never through strings.

pub mod analysis;
pub mod backends;
pub mod decompile;
pub mod diff;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("binary not found at {}", .0.display())]
    MissingBinary(PathBuf),
    /// The tool is missing or refused the input; callers may degrade.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("{tool} timed out after {secs}s")]
    TimedOut { tool: String, secs: u64 },
    #[error("backend error: {0}")]
    Failed(String),
}
