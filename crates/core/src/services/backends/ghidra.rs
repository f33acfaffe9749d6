use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::model::DecompileRecord;
use crate::services::backends::run_tool;
use crate::services::decompile::{DecompileBackend, DecompileRequest};
use crate::services::BackendError;
use crate::subprocess::CommandSpec;

const EXPORT_SCRIPT_NAME: &str = "export_function.py";
const EXPORT_SCRIPT: &str = include_str!("../../../scripts/export_function.py");

/// Resolve the analyzeHeadless executable path from environment variables.
///
/// Precedence:
/// - `GHIDRA_ANALYZE_HEADLESS` pointing directly to the executable.
/// - `GHIDRA_INSTALL_DIR`, appended with the platform-specific analyzeHeadless name
///   under `support/`.
fn resolve_headless_path() -> Result<PathBuf, String> {
    if let Ok(p) = env::var("GHIDRA_ANALYZE_HEADLESS") {
        let path = PathBuf::from(p);
        if path.is_file() {
            return Ok(path);
        }
    }

    if let Ok(dir) = env::var("GHIDRA_INSTALL_DIR") {
        let name = if cfg!(windows) { "analyzeHeadless.bat" } else { "analyzeHeadless" };
        for candidate in [PathBuf::from(&dir).join("support").join(name), PathBuf::from(&dir).join(name)]
        {
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err("Set GHIDRA_ANALYZE_HEADLESS (path to analyzeHeadless) or GHIDRA_INSTALL_DIR".to_string())
}

/// Ghidra headless decompiler driven by an embedded post-script.
#[derive(Debug, Clone)]
pub struct GhidraBackend {
    headless: Result<PathBuf, String>,
}

impl GhidraBackend {
    pub fn from_env() -> Self {
        Self { headless: resolve_headless_path() }
    }
}

#[derive(Debug, Deserialize)]
struct ExportMetadata {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    prototype: Option<String>,
    #[serde(default)]
    callers: Vec<String>,
    #[serde(default)]
    callees: Vec<String>,
}

impl DecompileBackend for GhidraBackend {
    fn decompile(&self, request: &DecompileRequest) -> Result<DecompileRecord, BackendError> {
        if !request.binary_path.is_file() {
            return Err(BackendError::MissingBinary(request.binary_path.clone()));
        }
        let headless = self.headless.clone().map_err(BackendError::Unavailable)?;
        let Some(name) = request.function_name.as_deref() else {
            return Err(BackendError::Failed(format!("no symbol name for {}", request.func_id)));
        };

        let io = |e: std::io::Error| BackendError::Failed(format!("ghidra scratch dir: {e}"));
        let scripts = request.work_dir.join("ghidra_scripts");
        let project = request.work_dir.join("ghidra_project");
        fs::create_dir_all(&scripts).map_err(io)?;
        fs::create_dir_all(&project).map_err(io)?;
        fs::write(scripts.join(EXPORT_SCRIPT_NAME), EXPORT_SCRIPT).map_err(io)?;
        let json_out = request.work_dir.join("ghidra_meta.json");
        let txt_out = request.work_dir.join("ghidra_pseudocode.c");

        let spec = CommandSpec::new(headless)
            .arg(&project)
            .arg("patchdiff")
            .arg("-import")
            .arg(&request.binary_path)
            .arg("-scriptPath")
            .arg(&scripts)
            .arg("-postScript")
            .arg(EXPORT_SCRIPT_NAME)
            .arg(name)
            .arg(&json_out)
            .arg(&txt_out)
            .arg(request.timeout_secs.to_string())
            .arg("-deleteProject")
            .timeout_secs(request.timeout_secs);
        run_tool("analyzeHeadless", &spec)?;

        let meta_text = fs::read_to_string(&json_out)
            .map_err(|e| BackendError::Failed(format!("ghidra produced no metadata: {e}")))?;
        let meta: ExportMetadata = serde_json::from_str(&meta_text)
            .map_err(|e| BackendError::Failed(format!("unreadable ghidra metadata: {e}")))?;

        let mut record = request.record(meta.status.as_deref().unwrap_or("ok"));
        record.prototype = meta.prototype;
        record.callers = meta.callers;
        record.callees = meta.callees;
        record.pseudocode = fs::read_to_string(&txt_out).unwrap_or_default();
        Ok(record)
    }

    fn name(&self) -> &'static str {
        "ghidra"
    }
}
