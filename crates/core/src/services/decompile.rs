use std::path::PathBuf;

use crate::config::DecompileBackendKind;
use crate::model::DecompileRecord;
use crate::services::backends::{ghidra::GhidraBackend, rizin::RizinBackend};
use crate::services::BackendError;

/// One function to decompile on one side of a pair.
#[derive(Debug, Clone)]
pub struct DecompileRequest {
    pub binary_path: PathBuf,
    pub binary_sha: String,
    pub func_id: String,
    /// Symbol name recovered from diff evidence.
    pub function_name: Option<String>,
    pub address: Option<u64>,
    pub timeout_secs: u64,
    /// Scratch directory the backend may use for tool output.
    pub work_dir: PathBuf,
}

impl DecompileRequest {
    /// Record skeleton carrying the request's identity.
    pub fn record(&self, status: &str) -> DecompileRecord {
        DecompileRecord {
            func_id: self.func_id.clone(),
            binary_sha: self.binary_sha.clone(),
            name: self.function_name.clone(),
            status: status.to_string(),
            ..Default::default()
        }
    }

    /// Placeholder record used when the backend could not produce output.
    pub fn stub(&self, error: &BackendError) -> DecompileRecord {
        let status = match error {
            BackendError::Unavailable(_) | BackendError::MissingBinary(_) => "backend_unavailable",
            BackendError::TimedOut { .. } => "timeout",
            BackendError::Failed(_) => "error",
        };
        let mut record = self.record(status);
        record.pseudocode = format!("/* decompilation unavailable: {status} */\n");
        record.error = Some(error.to_string());
        record
    }
}

pub trait DecompileBackend {
    fn decompile(&self, request: &DecompileRequest) -> Result<DecompileRecord, BackendError>;
    fn name(&self) -> &'static str;
}

pub fn decompile_backend(kind: DecompileBackendKind) -> Box<dyn DecompileBackend> {
    match kind {
        DecompileBackendKind::Ghidra => Box::new(GhidraBackend::from_env()),
        DecompileBackendKind::Rizin => Box::new(RizinBackend::from_env()),
    }
}
