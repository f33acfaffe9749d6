use std::path::{Path, PathBuf};

use tracing::debug;

use crate::services::backends::{env_path, read_fake, run_tool};
use crate::services::diff::{match_symbols, DiffBackend, DiffOutput, DiffRequest, FunctionSymbol};
use crate::services::BackendError;
use crate::subprocess::CommandSpec;

/// Name-based function matching over `nm` symbol tables.
#[derive(Debug, Clone)]
pub struct SymbolsBackend {
    pub nm_path: PathBuf,
    /// Canned `nm` output for A and B, bypassing the tool.
    pub fake_output: Option<(PathBuf, PathBuf)>,
}

impl SymbolsBackend {
    /// `PATCHDIFF_NM` selects the tool; `PATCHDIFF_NM_FAKE_A`/`_B` supply canned output.
    pub fn from_env() -> Self {
        Self {
            nm_path: env_path("PATCHDIFF_NM").unwrap_or_else(|| PathBuf::from("nm")),
            fake_output: env_path("PATCHDIFF_NM_FAKE_A").zip(env_path("PATCHDIFF_NM_FAKE_B")),
        }
    }

    fn symbols(&self, binary: &Path, fake: Option<&Path>, timeout: u64) -> Result<String, BackendError> {
        if let Some(fake) = fake {
            return read_fake(fake);
        }
        if !binary.is_file() {
            return Err(BackendError::MissingBinary(binary.to_path_buf()));
        }
        let spec = CommandSpec::new(&self.nm_path)
            .args(["--defined-only", "-S"])
            .arg(binary)
            .timeout_secs(timeout);
        run_tool("nm", &spec)
    }
}

impl DiffBackend for SymbolsBackend {
    fn diff(&self, request: &DiffRequest) -> Result<DiffOutput, BackendError> {
        let (fake_a, fake_b) = match &self.fake_output {
            Some((a, b)) => (Some(a.as_path()), Some(b.as_path())),
            None => (None, None),
        };
        let a = parse_nm_output(&self.symbols(&request.binary_a, fake_a, request.timeout_secs)?);
        let b = parse_nm_output(&self.symbols(&request.binary_b, fake_b, request.timeout_secs)?);
        debug!(symbols_a = a.len(), symbols_b = b.len(), "parsed nm symbol tables");
        Ok(match_symbols(&a, &b))
    }

    fn name(&self) -> &'static str {
        "symbols"
    }
}

/// Keep text-section (`T`/`t`) symbols from `nm` output.
///
/// Accepts both `addr type name` and, with `-S`, `addr size type name` lines.
pub fn parse_nm_output(output: &str) -> Vec<FunctionSymbol> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let (addr, size, kind, name) = match fields.as_slice() {
                [addr, kind, name] => (*addr, None, *kind, *name),
                [addr, size, kind, name] => (*addr, Some(*size), *kind, *name),
                _ => return None,
            };
            if kind != "T" && kind != "t" {
                return None;
            }
            Some(FunctionSymbol {
                name: name.to_string(),
                address: u64::from_str_radix(addr, 16).ok()?,
                size: match size {
                    Some(raw) => Some(u64::from_str_radix(raw, 16).ok()?),
                    None => None,
                },
            })
        })
        .collect()
}
