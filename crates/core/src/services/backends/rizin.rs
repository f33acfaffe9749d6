use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::model::DecompileRecord;
use crate::services::backends::{env_path, read_fake, run_tool};
use crate::services::decompile::{DecompileBackend, DecompileRequest};
use crate::services::diff::{match_symbols, DiffBackend, DiffOutput, DiffRequest, FunctionSymbol};
use crate::services::BackendError;
use crate::subprocess::CommandSpec;

/// Rizin-backed matcher and decompiler that shells out to `rizin` with short scripts.
#[derive(Debug, Clone)]
pub struct RizinBackend {
    pub rizin_path: PathBuf,
    /// Canned `aflj` output for A and B.
    pub fake_functions: Option<(PathBuf, PathBuf)>,
}

impl RizinBackend {
    pub fn from_env() -> Self {
        Self {
            rizin_path: resolve_rizin_path(),
            fake_functions: env_path("PATCHDIFF_RIZIN_FAKE_AFLJ_A")
                .zip(env_path("PATCHDIFF_RIZIN_FAKE_AFLJ_B")),
        }
    }

    fn run_script(&self, binary: &Path, script: &str, timeout: u64) -> Result<String, BackendError> {
        if !binary.is_file() {
            return Err(BackendError::MissingBinary(binary.to_path_buf()));
        }
        let spec = CommandSpec::new(&self.rizin_path)
            .args(["-2", "-q0", "-c", script])
            .arg(binary)
            .timeout_secs(timeout);
        run_tool("rizin", &spec)
    }

    fn functions(
        &self,
        binary: &Path,
        fake: Option<&Path>,
        timeout: u64,
    ) -> Result<Vec<FunctionSymbol>, BackendError> {
        let body = match fake {
            Some(path) => read_fake(path)?,
            None => self.run_script(binary, "aa;aflj", timeout)?,
        };
        parse_functions(&body)
    }
}

fn resolve_rizin_path() -> PathBuf {
    env_path("RIZIN_BIN").unwrap_or_else(|| PathBuf::from("rizin"))
}

impl DiffBackend for RizinBackend {
    fn diff(&self, request: &DiffRequest) -> Result<DiffOutput, BackendError> {
        let (fake_a, fake_b) = match &self.fake_functions {
            Some((a, b)) => (Some(a.as_path()), Some(b.as_path())),
            None => (None, None),
        };
        let a = self.functions(&request.binary_a, fake_a, request.timeout_secs)?;
        let b = self.functions(&request.binary_b, fake_b, request.timeout_secs)?;
        Ok(match_symbols(&a, &b))
    }

    fn name(&self) -> &'static str {
        "rizin"
    }
}

impl DecompileBackend for RizinBackend {
    fn decompile(&self, request: &DecompileRequest) -> Result<DecompileRecord, BackendError> {
        let seek = match (&request.function_name, request.address) {
            (Some(name), _) => format!("sym.{name}"),
            (None, Some(addr)) => format!("{addr:#x}"),
            (None, None) => {
                return Err(BackendError::Failed(format!(
                    "no symbol or address for {}",
                    request.func_id
                )))
            }
        };
        let info = self.run_script(
            &request.binary_path,
            &format!("aa;s {seek};afij"),
            request.timeout_secs,
        )?;
        let pseudocode = self.run_script(
            &request.binary_path,
            &format!("aa;s {seek};pdc"),
            request.timeout_secs,
        )?;

        let mut record = request.record("ok");
        let details: Vec<RizinFunctionInfo> = serde_json::from_str(&info).unwrap_or_default();
        if let Some(func) = details.into_iter().next() {
            record.prototype = func.signature;
            record.callees = func
                .callrefs
                .unwrap_or_default()
                .into_iter()
                .filter(|r| matches!(r.typ.as_deref(), Some("C") | Some("CALL") | Some("call")))
                .filter_map(|r| r.addr.map(|a| format!("{a:#x}")))
                .collect();
        }
        record.pseudocode = pseudocode;
        Ok(record)
    }

    fn name(&self) -> &'static str {
        "rizin"
    }
}

/// Parse `aflj` output into named functions, skipping imports and auto-named stubs.
pub fn parse_functions(body: &str) -> Result<Vec<FunctionSymbol>, BackendError> {
    let funcs: Vec<RizinFunction> = serde_json::from_str(body)
        .map_err(|e| BackendError::Failed(format!("failed to parse rizin JSON: {e}")))?;
    Ok(funcs
        .into_iter()
        .filter_map(|f| {
            let name = f.name?;
            if name.starts_with("sym.imp.") || name.starts_with("fcn.") {
                return None;
            }
            let name = name.strip_prefix("sym.").unwrap_or(&name).to_string();
            Some(FunctionSymbol { name, address: f.offset.unwrap_or(0), size: f.size })
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct RizinFunction {
    #[serde(default)]
    offset: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RizinFunctionInfo {
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    callrefs: Option<Vec<RizinCallRef>>,
}

#[derive(Debug, Deserialize)]
struct RizinCallRef {
    #[serde(default)]
    addr: Option<u64>,
    #[serde(default)]
    #[serde(rename = "type")]
    typ: Option<String>,
}
