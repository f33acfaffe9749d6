//! Typed error taxonomy shared by every stage.
//!
//! Each variant maps to a fixed process exit code so the CLI can report
//! failures consistently. Structured `details` are surfaced as JSON on stderr.

use std::path::PathBuf;

use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchdiffError {
    /// Bad command-line input.
    #[error("{0}")]
    Argument(String),

    /// Configuration could not be loaded or failed validation.
    #[error("{message}")]
    Config { message: String, details: Value },

    /// An input file required by a stage does not exist.
    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("ingest failed: {0}")]
    Ingest(String),

    #[error("diff backend failed: {0}")]
    DiffBackend(String),

    #[error("decompile failed: {0}")]
    Decompile(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    /// A payload or envelope did not satisfy its schema, or verification failed.
    #[error("{message}")]
    Validation { message: String, details: Value },

    #[error("report failed: {0}")]
    Report(String),

    /// Another runner holds the job directory.
    #[error("job directory is locked by another runner: {} (remove it if no run is active)", .0.display())]
    JobLocked(PathBuf),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Provenance index could not be read back; appending would lose history.
    #[error("artifact index at {} is unreadable: {reason}", .path.display())]
    Index { path: PathBuf, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PatchdiffError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PatchdiffError::Argument(_) | PatchdiffError::Config { .. } => 10,
            PatchdiffError::MissingInput(_) => 20,
            PatchdiffError::Ingest(_) => 30,
            PatchdiffError::DiffBackend(_) => 40,
            PatchdiffError::Decompile(_) => 50,
            PatchdiffError::Analysis(_) => 60,
            PatchdiffError::Validation { .. } => 70,
            PatchdiffError::Report(_) => 80,
            PatchdiffError::JobLocked(_) => 90,
            PatchdiffError::Io { .. } | PatchdiffError::Index { .. } | PatchdiffError::Json(_) => 1,
        }
    }

    /// Structured context for the error, if any.
    pub fn details(&self) -> Option<Value> {
        match self {
            PatchdiffError::Config { details, .. } | PatchdiffError::Validation { details, .. } => {
                if details.is_null() {
                    None
                } else {
                    Some(details.clone())
                }
            }
            PatchdiffError::MissingInput(path) => Some(json!({ "path": path.display().to_string() })),
            PatchdiffError::JobLocked(path) => Some(json!({ "lock": path.display().to_string() })),
            PatchdiffError::Io { path, .. } | PatchdiffError::Index { path, .. } => {
                Some(json!({ "path": path.display().to_string() }))
            }
            _ => None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        PatchdiffError::Config { message: message.into(), details: Value::Null }
    }

    pub fn validation(message: impl Into<String>, details: Value) -> Self {
        PatchdiffError::Validation { message: message.into(), details }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PatchdiffError::Io { path: path.into(), source }
    }
}

/// Convenience result type for core operations.
pub type PatchdiffResult<T> = Result<T, PatchdiffError>;

/// Attach a path to a raw `std::io::Error`.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &std::path::Path) -> PatchdiffResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &std::path::Path) -> PatchdiffResult<T> {
        self.map_err(|source| PatchdiffError::io(path, source))
    }
}
