//! Validate: sanity checks over analysis records.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::artifacts::{write_json, ArtifactIndexEntry, ArtifactInputs, PayloadSchema, SchemaKind};
use crate::error::PatchdiffResult;
use crate::hashing::canonical_json;
use crate::model::{AnalysisOutput, AnalysisRecord};
use crate::ranking::round6;
use crate::services::analysis::KNOWN_BUG_CLASSES;
use crate::stages::{Stage, StageContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateValidation {
    pub func_pair_id: String,
    pub evidence_passed: bool,
    pub safety_passed: bool,
    pub bug_class_passed: bool,
    pub validation_score: f64,
}

/// Contents of the validation envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutput {
    pub job_id: String,
    pub created_at: String,
    pub checks: Vec<ValidationCheck>,
    pub candidates: Vec<CandidateValidation>,
}

/// Text the evidence snippets may quote: both pseudocode bodies and the change summary.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSource {
    haystack: String,
}

impl EvidenceSource {
    pub fn from_packet(packet: &Value) -> Self {
        let text = |ptr: &str| packet.pointer(ptr).and_then(Value::as_str).unwrap_or("").to_string();
        let summary = packet.pointer("/diff/change_summary").map(canonical_json).unwrap_or_default();
        let haystack = [text("/decompiled/pseudocode_a"), text("/decompiled/pseudocode_b"), summary]
            .join("\n")
            .to_lowercase();
        Self { haystack }
    }

    pub fn contains(&self, snippet: &str) -> bool {
        self.haystack.contains(&snippet.to_lowercase())
    }
}

/// `0.4·evidence + 0.1·bug_class + 0.2·safety + 0.3·clamp(confidence)`.
pub fn validation_score(evidence: bool, bug_class: bool, safety: bool, confidence: f64) -> f64 {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
    round6(0.4 * flag(evidence) + 0.1 * flag(bug_class) + 0.2 * flag(safety) + 0.3 * confidence)
}

/// Run the four checks for one analysis record.
pub fn validate_record(
    record: &AnalysisRecord,
    source: &EvidenceSource,
) -> (Vec<ValidationCheck>, CandidateValidation) {
    let id = &record.func_pair_id;
    let snippets: Vec<&str> = record
        .evidence
        .iter()
        .map(|e| e.snippet.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let missing: Vec<&str> = snippets.iter().copied().filter(|s| !source.contains(s)).collect();
    let evidence_passed = !snippets.is_empty() && missing.is_empty();
    let evidence_note = if snippets.is_empty() {
        "no evidence snippets".to_string()
    } else if missing.is_empty() {
        format!("{} snippet(s) found in packet", snippets.len())
    } else {
        format!("{} of {} snippet(s) not found: {}", missing.len(), snippets.len(), missing.join(" | "))
    };

    let safety_passed = record.safety.no_exploit_steps;
    let bug_class_passed = KNOWN_BUG_CLASSES.contains(&record.bug_class.as_str());
    let confidence_ok = record.confidence.is_finite() && (0.0..=1.0).contains(&record.confidence);

    let checks = vec![
        ValidationCheck { name: format!("{id}:evidence_present"), passed: evidence_passed, evidence: evidence_note },
        ValidationCheck {
            name: format!("{id}:safety_flag"),
            passed: safety_passed,
            evidence: format!("no_exploit_steps={safety_passed}"),
        },
        ValidationCheck {
            name: format!("{id}:bug_class"),
            passed: bug_class_passed,
            evidence: format!("bug_class={}", record.bug_class),
        },
        ValidationCheck {
            name: format!("{id}:confidence_range"),
            passed: confidence_ok,
            evidence: format!("confidence={}", record.confidence),
        },
    ];
    let candidate = CandidateValidation {
        func_pair_id: id.clone(),
        evidence_passed,
        safety_passed,
        bug_class_passed,
        validation_score: validation_score(
            evidence_passed,
            bug_class_passed,
            safety_passed,
            record.confidence,
        ),
    };
    (checks, candidate)
}

pub fn run(ctx: &StageContext<'_>) -> PatchdiffResult<(ValidationOutput, ArtifactIndexEntry)> {
    let analysis: AnalysisOutput = ctx
        .read_upstream(Stage::Analyze, "llm.json")
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let sources: HashMap<String, EvidenceSource> = ctx
        .read_upstream_list(Stage::Analyze, "packets.json")
        .iter()
        .filter_map(|p| {
            let id = p.get("func_pair_id")?.as_str()?.to_string();
            Some((id, EvidenceSource::from_packet(p)))
        })
        .collect();

    let empty = EvidenceSource::default();
    let mut checks = Vec::new();
    let mut candidates = Vec::new();
    for record in analysis.analysis.iter().filter(|r| !r.func_pair_id.is_empty()) {
        let source = sources.get(&record.func_pair_id).unwrap_or(&empty);
        let (mut record_checks, candidate) = validate_record(record, source);
        checks.append(&mut record_checks);
        candidates.push(candidate);
    }
    let passed = checks.iter().filter(|c| c.passed).count();
    info!(candidates = candidates.len(), checks = checks.len(), passed, "validated analysis");

    let output = ValidationOutput {
        job_id: ctx.job.job_id.clone(),
        created_at: Utc::now().to_rfc3339(),
        checks,
        candidates,
    };
    let dir = ctx.layout.reset_stage_dir(Stage::Validate)?;
    let inputs = ArtifactInputs::for_job(&ctx.job).with_upstream(ctx.upstream_hashes(&[
        (Stage::Analyze, "llm_outputs.artifact.json"),
        (Stage::Analyze, "packets.artifact.json"),
    ]));
    let entry = ctx.store.write(
        &dir.join("validation.artifact.json"),
        "validation.results",
        inputs,
        &serde_json::to_value(&output)?,
        Some(PayloadSchema::Single(SchemaKind::Validation)),
    )?;
    write_json(
        &dir.join("validation.json"),
        &json!({ "job_id": output.job_id, "created_at": output.created_at, "checks": output.checks }),
    )?;
    write_json(
        &dir.join("validation_details.json"),
        &json!({
            "job_id": output.job_id,
            "created_at": output.created_at,
            "candidates": output.candidates,
        }),
    )?;
    Ok((output, entry))
}
