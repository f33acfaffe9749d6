//! Decompile: per-function pseudocode for the top ranked candidates.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::artifacts::{write_json, ArtifactIndexEntry, ArtifactInputs, PayloadSchema, SchemaKind};
use crate::error::{IoResultExt, PatchdiffError, PatchdiffResult};
use crate::model::{lenient_records, BinaryInfo, DecompileRecord, FunctionPair, RankedCandidate};
use crate::services::decompile::{decompile_backend, DecompileBackend, DecompileRequest};
use crate::services::diff::safe_id;
use crate::services::BackendError;
use crate::stages::{Stage, StageContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

impl Side {
    fn func_id(self, pair: &FunctionPair) -> &str {
        match self {
            Side::A => &pair.func_id_a,
            Side::B => &pair.func_id_b,
        }
    }

    fn address_key(self) -> &'static str {
        match self {
            Side::A => "address_a",
            Side::B => "address_b",
        }
    }
}

fn parse_address(raw: &str) -> Option<u64> {
    let digits = raw.trim().trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).ok()
}

/// Ranked candidates in rank order, at most `top` of them.
pub(crate) fn load_candidates(ctx: &StageContext<'_>, top: Option<usize>) -> Vec<RankedCandidate> {
    let mut candidates: Vec<RankedCandidate> = ctx
        .read_upstream(Stage::Rank, "ranked_candidates.json")
        .and_then(|v| v.get("candidates").map(lenient_records))
        .unwrap_or_default();
    candidates.sort_by_key(|c| c.rank);
    if let Some(top) = top {
        candidates.truncate(top);
    }
    candidates
}

/// Function pairs from the diff stage keyed by id; malformed entries are dropped.
pub(crate) fn load_pairs(ctx: &StageContext<'_>) -> HashMap<String, FunctionPair> {
    let raw = ctx.read_upstream_list(Stage::Diff, "function_pairs.json");
    lenient_records::<FunctionPair>(&serde_json::Value::Array(raw))
        .into_iter()
        .map(|p| (p.func_pair_id.clone(), p))
        .collect()
}

/// Directory holding one function's decompiler output.
pub fn function_dir(ctx: &StageContext<'_>, func_id: &str) -> PathBuf {
    ctx.layout.stage_dir(Stage::Decompile).join(safe_id(func_id))
}

pub fn run(ctx: &StageContext<'_>) -> PatchdiffResult<(Vec<DecompileRecord>, ArtifactIndexEntry)> {
    let backend = decompile_backend(ctx.config.backends.decompile);
    run_with(ctx, backend.as_ref())
}

pub fn run_with(
    ctx: &StageContext<'_>,
    backend: &dyn DecompileBackend,
) -> PatchdiffResult<(Vec<DecompileRecord>, ArtifactIndexEntry)> {
    let candidates = load_candidates(ctx, ctx.config.backends.decompile_top);
    let pairs = load_pairs(ctx);
    let dir = ctx.layout.reset_stage_dir(Stage::Decompile)?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for candidate in &candidates {
        let Some(pair) = pairs.get(&candidate.func_pair_id) else {
            warn!(func_pair_id = %candidate.func_pair_id, "ranked candidate has no function pair");
            continue;
        };
        for side in [Side::A, Side::B] {
            let func_id = side.func_id(pair);
            if func_id.is_empty() || !seen.insert(func_id.to_string()) {
                continue;
            }
            let binary = match side {
                Side::A => &ctx.job.binary_a,
                Side::B => &ctx.job.binary_b,
            };
            let record = decompile_one(ctx, backend, pair, side, binary)?;
            records.push(record);
        }
    }

    let degraded = records.iter().filter(|r| r.status != "ok").count();
    info!(
        backend = backend.name(),
        functions = records.len(),
        degraded,
        "decompiled candidate functions"
    );

    let payload = serde_json::to_value(&records)?;
    let inputs = ArtifactInputs::for_job(&ctx.job)
        .with_upstream(ctx.upstream_hashes(&[(Stage::Rank, "ranked_candidates.artifact.json")]));
    let entry = ctx.store.publish(
        &dir,
        "decompile_artifacts",
        "decompile.functions",
        inputs,
        &payload,
        Some(PayloadSchema::ListOf(SchemaKind::DecompileRecord)),
    )?;
    Ok((records, entry))
}

fn decompile_one(
    ctx: &StageContext<'_>,
    backend: &dyn DecompileBackend,
    pair: &FunctionPair,
    side: Side,
    binary: &BinaryInfo,
) -> PatchdiffResult<DecompileRecord> {
    let func_id = side.func_id(pair);
    let out_dir = function_dir(ctx, func_id);
    let work_dir = out_dir.join("scratch");
    fs::create_dir_all(&work_dir).at(&work_dir)?;

    let request = DecompileRequest {
        binary_path: PathBuf::from(&binary.path),
        binary_sha: binary.sha256.clone(),
        func_id: func_id.to_string(),
        function_name: pair.evidence_value("symbol_name").map(str::to_string),
        address: pair.evidence_value(side.address_key()).and_then(parse_address),
        timeout_secs: ctx.config.backends.timeout_secs,
        work_dir: work_dir.clone(),
    };

    let record = match backend.decompile(&request) {
        Ok(record) if record.func_id != request.func_id => {
            return Err(PatchdiffError::Decompile(format!(
                "{} returned a record for '{}' when asked for '{}'",
                backend.name(),
                record.func_id,
                request.func_id
            )));
        }
        Ok(record) => record,
        Err(BackendError::MissingBinary(path)) => return Err(PatchdiffError::MissingInput(path)),
        Err(err) => {
            warn!(func_id, backend = backend.name(), error = %err, "decompilation degraded");
            request.stub(&err)
        }
    };
    debug!(func_id, status = %record.status, "decompiled function");

    if let Err(e) = fs::remove_dir_all(&work_dir) {
        debug!(path = %work_dir.display(), error = %e, "could not remove decompiler scratch dir");
    }
    fs::write(out_dir.join("pseudocode.txt"), &record.pseudocode).at(&out_dir)?;
    write_json(&out_dir.join("metadata.json"), &record)?;
    Ok(record)
}
