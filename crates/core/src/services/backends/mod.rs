pub mod command;
pub mod ghidra;
pub mod local;
pub mod rizin;
pub mod symbols;

use std::fs;
use std::path::{Path, PathBuf};

use crate::services::BackendError;
use crate::subprocess::{run_with_timeout, CommandOutcome, CommandSpec};

/// Run a tool and return stdout, mapping each failure mode onto `BackendError`.
pub(crate) fn run_tool(tool: &str, spec: &CommandSpec) -> Result<String, BackendError> {
    match run_with_timeout(spec) {
        CommandOutcome::Completed { code: Some(0), stdout, .. } => Ok(stdout),
        CommandOutcome::Completed { code, stderr, .. } => Err(BackendError::Unavailable(format!(
            "{tool} exited with {}: {}",
            code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr.lines().next().unwrap_or("").trim()
        ))),
        CommandOutcome::TimedOut => {
            Err(BackendError::TimedOut { tool: tool.to_string(), secs: spec.timeout.as_secs() })
        }
        CommandOutcome::SpawnFailed(reason) => Err(BackendError::Unavailable(reason)),
    }
}

/// Read canned tool output, used in place of the real tool when configured.
pub(crate) fn read_fake(path: &Path) -> Result<String, BackendError> {
    fs::read_to_string(path)
        .map_err(|e| BackendError::Failed(format!("failed to read {}: {e}", path.display())))
}

pub(crate) fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}
