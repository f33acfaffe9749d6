//! Core data model shared across stages.
//!
//! Records read back from upstream stage files use `#[serde(default)]`
//! liberally: a partially populated record is still usable downstream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PipelineConfig;

/// Container format classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    #[serde(rename = "PE")]
    Pe,
    #[serde(rename = "ELF")]
    Elf,
    #[serde(rename = "Mach-O")]
    MachO,
    #[serde(rename = "unknown")]
    Unknown,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pe => "PE",
            FileType::Elf => "ELF",
            FileType::MachO => "Mach-O",
            FileType::Unknown => "unknown",
        }
    }
}

/// Identity of one input binary, fixed at ingest time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryInfo {
    pub path: String,
    pub sha256: String,
    pub file_type: FileType,
    pub arch: String,
}

/// Identity and configuration snapshot for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub created_at: String,
    #[serde(default)]
    pub tag: Option<String>,
    pub binary_a: BinaryInfo,
    pub binary_b: BinaryInfo,
    #[serde(default)]
    pub config: PipelineConfig,
}

/// Hypothesized correspondence between a function in A and one in B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionPair {
    pub func_pair_id: String,
    #[serde(default)]
    pub func_id_a: String,
    #[serde(default)]
    pub func_id_b: String,
    #[serde(default)]
    pub match_score: f64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl FunctionPair {
    /// Value of the first `key=value` evidence line with the given key.
    pub fn evidence_value(&self, key: &str) -> Option<&str> {
        self.evidence.iter().find_map(|line| {
            let (k, v) = line.split_once('=')?;
            (k.trim() == key).then(|| v.trim())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub func_pair_id: String,
    #[serde(default)]
    pub change_summary: Value,
    #[serde(default)]
    pub severity_hint: f64,
}

/// One weighted component of a ranking score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal: String,
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub func_pair_id: String,
    pub rank: usize,
    pub score: f64,
    #[serde(default)]
    pub top_signals: Vec<Signal>,
}

/// Contents of `artifacts/rank/ranked_candidates.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidates {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub top_n: usize,
    #[serde(default)]
    pub candidates: Vec<RankedCandidate>,
}

/// Decompiler output for a single function on one side of the pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompileRecord {
    pub func_id: String,
    pub binary_sha: String,
    pub name: Option<String>,
    pub prototype: Option<String>,
    pub pseudocode: String,
    pub callers: Vec<String>,
    pub callees: Vec<String>,
    pub strings: Vec<String>,
    pub status: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Safety {
    #[serde(default)]
    pub no_exploit_steps: bool,
}

/// Validated analysis-provider output for one candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisRecord {
    pub func_pair_id: String,
    pub bug_class: String,
    pub confidence: f64,
    pub evidence: Vec<EvidenceItem>,
    pub reachability_notes: Vec<String>,
    pub recommended_validation: Vec<String>,
    pub safety: Safety,
    pub round_count: u32,
    pub status: String,
}

/// Contents of `artifacts/analysis/llm.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOutput {
    pub job_id: String,
    pub created_at: String,
    pub analysis: Vec<AnalysisRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Start,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub stage: String,
    pub event: AuditEvent,
    #[serde(default)]
    pub details: Value,
}

/// Parse each element of a JSON array independently, dropping the ones that do not fit `T`.
pub fn lenient_records<T: serde::de::DeserializeOwned>(value: &Value) -> Vec<T> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| serde_json::from_value(v.clone()).ok()).collect())
        .unwrap_or_default()
}
