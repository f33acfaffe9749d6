//! Analyze: build one packet per ranked candidate and run the provider.
//!
//! Every round is recorded. Output that fails the provider schema, or a
//! provider error, marks the round invalid and the next round retries with
//! the last valid output as context. The final record is the last valid
//! output, or a `failed` record when no round produced one.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::artifacts::{write_json, ArtifactIndexEntry, ArtifactInputs, PayloadSchema, SchemaKind};
use crate::error::{PatchdiffError, PatchdiffResult};
use crate::model::{
    lenient_records, AnalysisOutput, AnalysisRecord, DecompileRecord, DiffResult, FunctionPair,
    RankedCandidate,
};
use crate::services::analysis::{analysis_provider, AnalysisProvider, ProviderRequest};
use crate::stages::decompile::{load_candidates, load_pairs};
use crate::stages::{Stage, StageContext};

pub const OUTPUT_SCHEMA_NAME: &str = "llm_output.schema.json";

const QUESTIONS: [&str; 4] = [
    "What changed between the two versions of this function?",
    "Which bug class does the change most likely address?",
    "Which lines of the decompiled code support that conclusion?",
    "How could the fix be validated without exploit steps?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Valid,
    Invalid,
    Error,
}

/// One provider invocation as recorded in `round_outputs.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RoundRecord {
    pub func_pair_id: String,
    pub round: u32,
    pub status: RoundStatus,
    pub errors: Vec<String>,
    pub output: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct AnalyzeStageOutput {
    pub output: AnalysisOutput,
    pub rounds: Vec<RoundRecord>,
    pub entry: ArtifactIndexEntry,
}

fn decompiled(records: &HashMap<String, DecompileRecord>, func_id: &str) -> Option<DecompileRecord> {
    records.get(func_id).cloned()
}

/// Assemble the provider input for one candidate.
pub fn build_packet(
    ctx: &StageContext<'_>,
    candidate: &RankedCandidate,
    pair: Option<&FunctionPair>,
    diff: Option<&DiffResult>,
    records: &HashMap<String, DecompileRecord>,
) -> Value {
    let func_id_a = pair.map(|p| p.func_id_a.clone()).unwrap_or_default();
    let func_id_b = pair.map(|p| p.func_id_b.clone()).unwrap_or_default();
    let rec_a = decompiled(records, &func_id_a).unwrap_or_default();
    let rec_b = decompiled(records, &func_id_b).unwrap_or_default();
    let name = pair.and_then(|p| p.evidence_value("symbol_name")).map(str::to_string);

    json!({
        "job_id": ctx.job.job_id,
        "func_pair_id": candidate.func_pair_id,
        "binary_a": ctx.job.binary_a,
        "binary_b": ctx.job.binary_b,
        "function": {
            "func_id_a": func_id_a,
            "func_id_b": func_id_b,
            "name_a": rec_a.name.clone().or_else(|| name.clone()),
            "name_b": rec_b.name.clone().or(name),
            "prototype_a": rec_a.prototype,
            "prototype_b": rec_b.prototype,
            "callers_a": rec_a.callers,
            "callers_b": rec_b.callers,
        },
        "diff": {
            "func_pair_id": candidate.func_pair_id,
            "change_summary": diff.map(|d| d.change_summary.clone()).unwrap_or(Value::Null),
            "severity_hint": diff.map(|d| d.severity_hint).unwrap_or(0.0),
        },
        "decompiled": {
            "pseudocode_a": rec_a.pseudocode,
            "pseudocode_b": rec_b.pseudocode,
        },
        "questions": QUESTIONS,
        "required_output_schema": OUTPUT_SCHEMA_NAME,
    })
}

/// Schema and identity checks for one round's output.
fn check_output(output: &Value, func_pair_id: &str) -> Result<(), Vec<String>> {
    SchemaKind::LlmOutput.check(output)?;
    match output.get("func_pair_id").and_then(Value::as_str) {
        Some(id) if id == func_pair_id => Ok(()),
        other => Err(vec![format!(
            "func_pair_id {:?} does not match candidate '{func_pair_id}'",
            other.unwrap_or_default()
        )]),
    }
}

/// Run every configured round for one packet.
pub fn analyze_packet(
    provider: &dyn AnalysisProvider,
    packet: &Value,
    func_pair_id: &str,
    max_rounds: u32,
    model: &str,
) -> (AnalysisRecord, Vec<RoundRecord>) {
    let mut rounds = Vec::new();
    let mut last_valid: Option<Value> = None;

    for round in 1..=max_rounds {
        let request = ProviderRequest { packet, round, previous: last_valid.as_ref(), model };
        let record = match provider.analyze(&request) {
            Ok(output) => match check_output(&output, func_pair_id) {
                Ok(()) => {
                    last_valid = Some(output.clone());
                    RoundRecord {
                        func_pair_id: func_pair_id.to_string(),
                        round,
                        status: RoundStatus::Valid,
                        errors: Vec::new(),
                        output: Some(output),
                    }
                }
                Err(errors) => {
                    warn!(func_pair_id, round, errors = errors.len(), "provider output rejected");
                    RoundRecord {
                        func_pair_id: func_pair_id.to_string(),
                        round,
                        status: RoundStatus::Invalid,
                        errors,
                        output: Some(output),
                    }
                }
            },
            Err(err) => {
                warn!(func_pair_id, round, error = %err, "provider call failed");
                RoundRecord {
                    func_pair_id: func_pair_id.to_string(),
                    round,
                    status: RoundStatus::Error,
                    errors: vec![err.to_string()],
                    output: None,
                }
            }
        };
        rounds.push(record);
    }

    let final_record = last_valid
        .and_then(|output| serde_json::from_value::<AnalysisRecord>(output).ok())
        .map(|record| AnalysisRecord { round_count: max_rounds, status: "ok".to_string(), ..record })
        .unwrap_or_else(|| AnalysisRecord {
            func_pair_id: func_pair_id.to_string(),
            bug_class: "unknown".to_string(),
            confidence: 0.0,
            round_count: max_rounds,
            status: "failed".to_string(),
            ..Default::default()
        });
    (final_record, rounds)
}

pub fn run(ctx: &StageContext<'_>) -> PatchdiffResult<AnalyzeStageOutput> {
    let provider = analysis_provider(&ctx.config.llm);
    run_with(ctx, provider.as_ref())
}

pub fn run_with(
    ctx: &StageContext<'_>,
    provider: &dyn AnalysisProvider,
) -> PatchdiffResult<AnalyzeStageOutput> {
    let llm = &ctx.config.llm;
    let candidates = load_candidates(ctx, None);
    let pairs = load_pairs(ctx);
    let diffs: HashMap<String, DiffResult> =
        lenient_records::<DiffResult>(&Value::Array(ctx.read_upstream_list(Stage::Diff, "diff_results.json")))
            .into_iter()
            .map(|d| (d.func_pair_id.clone(), d))
            .collect();
    let records: HashMap<String, DecompileRecord> = lenient_records::<DecompileRecord>(&Value::Array(
        ctx.read_upstream_list(Stage::Decompile, "decompile_artifacts.json"),
    ))
    .into_iter()
    .map(|r| (r.func_id.clone(), r))
    .collect();

    let dir = ctx.layout.reset_stage_dir(Stage::Analyze)?;
    let packets: Vec<Value> = candidates
        .iter()
        .map(|c| {
            build_packet(
                ctx,
                c,
                pairs.get(&c.func_pair_id),
                diffs.get(&c.func_pair_id),
                &records,
            )
        })
        .collect();

    let upstream = ctx.upstream_hashes(&[
        (Stage::Rank, "ranked_candidates.artifact.json"),
        (Stage::Diff, "diff_results.artifact.json"),
        (Stage::Decompile, "decompile_artifacts.artifact.json"),
    ]);
    let inputs = ArtifactInputs::for_job(&ctx.job).with_upstream(upstream);
    let packets_entry = ctx.store.publish(
        &dir,
        "packets",
        "analysis.packets",
        inputs.clone(),
        &Value::Array(packets.clone()),
        Some(PayloadSchema::ListOf(SchemaKind::AnalysisPacket)),
    )?;

    let mut analysis = Vec::new();
    let mut rounds = Vec::new();
    for (candidate, packet) in candidates.iter().zip(&packets) {
        let (record, mut candidate_rounds) =
            analyze_packet(provider, packet, &candidate.func_pair_id, llm.max_rounds, &llm.model);
        analysis.push(record);
        rounds.append(&mut candidate_rounds);
    }
    write_json(&dir.join("round_outputs.json"), &rounds)?;

    let every_call_failed =
        !rounds.is_empty() && rounds.iter().all(|r| r.status == RoundStatus::Error);
    if every_call_failed {
        let first = rounds.first().and_then(|r| r.errors.first()).cloned().unwrap_or_default();
        return Err(PatchdiffError::Analysis(format!(
            "provider '{}' failed on every call ({} calls): {first}",
            provider.name(),
            rounds.len()
        )));
    }

    let failed = analysis.iter().filter(|r| r.status == "failed").count();
    info!(
        provider = provider.name(),
        candidates = analysis.len(),
        failed,
        rounds = rounds.len(),
        "analyzed candidates"
    );

    let output =
        AnalysisOutput { job_id: ctx.job.job_id.clone(), created_at: Utc::now().to_rfc3339(), analysis };
    let payload = serde_json::to_value(&output)?;
    let entry = ctx.store.write(
        &dir.join("llm_outputs.artifact.json"),
        "analysis.llm_outputs",
        inputs.with_upstream([packets_entry.payload_sha256]),
        &payload,
        Some(PayloadSchema::Single(SchemaKind::Analysis)),
    )?;
    write_json(&dir.join("llm.json"), &payload)?;
    Ok(AnalyzeStageOutput { output, rounds, entry })
}
