use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde_json::json;

use crate::config::DiffBackendKind;
use crate::hashing::sha256_bytes;
use crate::model::{DiffResult, FunctionPair, Job};
use crate::ranking::round6;
use crate::services::backends::{rizin::RizinBackend, symbols::SymbolsBackend};
use crate::services::BackendError;

/// Inputs for a function-matching run.
#[derive(Debug, Clone)]
pub struct DiffRequest {
    pub binary_a: PathBuf,
    pub binary_b: PathBuf,
    pub timeout_secs: u64,
}

impl DiffRequest {
    pub fn for_job(job: &Job, timeout_secs: u64) -> Self {
        Self {
            binary_a: PathBuf::from(&job.binary_a.path),
            binary_b: PathBuf::from(&job.binary_b.path),
            timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffOutput {
    pub pairs: Vec<FunctionPair>,
    pub diffs: Vec<DiffResult>,
}

/// Trait implemented by function-matching backends.
pub trait DiffBackend {
    fn diff(&self, request: &DiffRequest) -> Result<DiffOutput, BackendError>;
    fn name(&self) -> &'static str;
}

pub fn diff_backend(kind: DiffBackendKind) -> Box<dyn DiffBackend> {
    match kind {
        DiffBackendKind::Symbols => Box::new(SymbolsBackend::from_env()),
        DiffBackendKind::Rizin => Box::new(RizinBackend::from_env()),
    }
}

/// A defined function symbol as reported by a backend tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSymbol {
    pub name: String,
    pub address: u64,
    pub size: Option<u64>,
}

impl FunctionSymbol {
    /// Name used for cross-binary matching: one leading underscore is ignored.
    pub fn match_key(&self) -> &str {
        self.name.strip_prefix('_').unwrap_or(&self.name)
    }
}

/// Severity of a size change: 0 when equal, scaled by relative delta otherwise.
pub fn size_severity(size_a: Option<u64>, size_b: Option<u64>) -> f64 {
    match (size_a, size_b) {
        (Some(a), Some(b)) if a == b => 0.0,
        (Some(a), Some(b)) => {
            let delta = a.abs_diff(b) as f64;
            let max = a.max(b) as f64;
            round6((0.2 + 0.8 * delta / max).min(1.0))
        }
        _ => 0.1,
    }
}

/// Pair symbols with the same match key and describe their size change.
///
/// Output is ordered by match key, so it does not depend on tool output order.
pub fn match_symbols(symbols_a: &[FunctionSymbol], symbols_b: &[FunctionSymbol]) -> DiffOutput {
    let index = |symbols: &[FunctionSymbol]| {
        let mut by_key: BTreeMap<String, FunctionSymbol> = BTreeMap::new();
        for sym in symbols {
            by_key.entry(sym.match_key().to_string()).or_insert_with(|| sym.clone());
        }
        by_key
    };
    let a = index(symbols_a);
    let b = index(symbols_b);

    let matched: Vec<&String> = a.keys().filter(|key| b.contains_key(*key)).collect();
    let mut sanitized: HashMap<String, usize> = HashMap::new();
    for key in &matched {
        *sanitized.entry(safe_id(key)).or_default() += 1;
    }

    let mut out = DiffOutput::default();
    for key in matched {
        let (Some(sym_a), Some(sym_b)) = (a.get(key), b.get(key)) else { continue };
        let safe = safe_id(key);
        // Distinct names that sanitize alike get a suffix from the raw name.
        let func_pair_id = if sanitized.get(&safe).copied().unwrap_or(0) > 1 {
            format!("fp_{safe}_{}", &sha256_bytes(key.as_bytes())[..8])
        } else {
            format!("fp_{safe}")
        };
        let mut evidence = vec![
            format!("symbol_name={key}"),
            format!("address_a={:#x}", sym_a.address),
            format!("address_b={:#x}", sym_b.address),
        ];
        if let Some(size) = sym_a.size {
            evidence.push(format!("size_a={size}"));
        }
        if let Some(size) = sym_b.size {
            evidence.push(format!("size_b={size}"));
        }
        out.pairs.push(FunctionPair {
            func_pair_id: func_pair_id.clone(),
            func_id_a: format!("a_{:016x}", sym_a.address),
            func_id_b: format!("b_{:016x}", sym_b.address),
            match_score: 1.0,
            status: "matched_by_name".to_string(),
            evidence,
        });

        let kind = match (sym_a.size, sym_b.size) {
            (Some(x), Some(y)) if x == y => "unchanged_size",
            (Some(_), Some(_)) => "size_changed",
            _ => "size_unknown",
        };
        let size_delta = match (sym_a.size, sym_b.size) {
            (Some(x), Some(y)) => json!((y as i64).saturating_sub(x as i64)),
            _ => json!(null),
        };
        out.diffs.push(DiffResult {
            func_pair_id,
            change_summary: json!({
                "kind": kind,
                "symbol": key,
                "size_a": sym_a.size,
                "size_b": sym_b.size,
                "size_delta": size_delta,
            }),
            severity_hint: size_severity(sym_a.size, sym_b.size),
        });
    }
    out
}

/// Restrict an identifier to characters that are safe in file names.
pub fn safe_id(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect()
}
