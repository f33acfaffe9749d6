//! Report: blend rank, analysis, and validation scores into the final view.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::artifacts::{ArtifactIndexEntry, ArtifactInputs, PayloadSchema, SchemaKind};
use crate::config::ReportFormat;
use crate::error::{PatchdiffError, PatchdiffResult};
use crate::model::{lenient_records, AnalysisOutput, BinaryInfo, RankedCandidate};
use crate::ranking::round6;
use crate::stages::decompile::load_candidates;
use crate::stages::{Stage, StageContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCandidate {
    pub func_pair_id: String,
    pub final_rank: usize,
    pub final_score: f64,
    pub rank_score: f64,
    pub analysis_confidence: f64,
    pub validation_score: f64,
    pub bug_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub job_id: String,
    pub created_at: String,
    pub tag: Option<String>,
    pub binary_a: BinaryInfo,
    pub binary_b: BinaryInfo,
    pub normalize_delta: Option<Value>,
    pub candidates: Vec<ReportCandidate>,
}

#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub report: Report,
    pub path: PathBuf,
    pub entry: ArtifactIndexEntry,
}

/// `0.5·rank + 0.2·confidence + 0.3·validation`.
pub fn final_score(rank_score: f64, analysis_confidence: f64, validation_score: f64) -> f64 {
    round6(0.5 * rank_score + 0.2 * analysis_confidence + 0.3 * validation_score)
}

/// Per-candidate analysis inputs; absent entries count as zero.
#[derive(Debug, Clone, Default)]
pub struct CandidateScores {
    pub confidence: HashMap<String, (f64, String)>,
    pub validation: HashMap<String, f64>,
}

/// Score and order candidates. The sort is stable, so ties keep rank order.
pub fn synthesize(ranked: &[RankedCandidate], scores: &CandidateScores) -> Vec<ReportCandidate> {
    let mut out: Vec<ReportCandidate> = ranked
        .iter()
        .map(|c| {
            let (confidence, bug_class) = match scores.confidence.get(&c.func_pair_id) {
                Some((conf, class)) => (*conf, Some(class.clone())),
                None => (0.0, None),
            };
            let validation = scores.validation.get(&c.func_pair_id).copied().unwrap_or(0.0);
            ReportCandidate {
                func_pair_id: c.func_pair_id.clone(),
                final_rank: 0,
                final_score: final_score(c.score, confidence, validation),
                rank_score: c.score,
                analysis_confidence: confidence,
                validation_score: validation,
                bug_class,
            }
        })
        .collect();
    out.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(Ordering::Equal));
    for (idx, candidate) in out.iter_mut().enumerate() {
        candidate.final_rank = idx + 1;
    }
    out
}

fn load_scores(ctx: &StageContext<'_>) -> CandidateScores {
    let analysis: AnalysisOutput = ctx
        .read_upstream(Stage::Analyze, "llm.json")
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let confidence = analysis
        .analysis
        .into_iter()
        .map(|r| (r.func_pair_id, (r.confidence, r.bug_class)))
        .collect();

    #[derive(Deserialize)]
    struct Score {
        func_pair_id: String,
        #[serde(default)]
        validation_score: f64,
    }
    let validation = ctx
        .read_upstream(Stage::Validate, "validation_details.json")
        .and_then(|v| v.get("candidates").map(lenient_records::<Score>))
        .unwrap_or_default()
        .into_iter()
        .map(|s| (s.func_pair_id, s.validation_score))
        .collect();
    CandidateScores { confidence, validation }
}

/// Markdown view of a report, rendered through `Display`.
pub struct MarkdownReport<'a>(pub &'a Report);

impl fmt::Display for MarkdownReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "# Patch diff report\n")?;
        writeln!(f, "- Job: `{}`", report.job_id)?;
        if let Some(tag) = &report.tag {
            writeln!(f, "- Tag: {tag}")?;
        }
        writeln!(f, "- Generated: {}\n", report.created_at)?;

        writeln!(f, "## Binaries\n")?;
        writeln!(f, "| Side | Path | Type | Arch | SHA-256 |")?;
        writeln!(f, "|---|---|---|---|---|")?;
        for (side, info) in [("A", &report.binary_a), ("B", &report.binary_b)] {
            writeln!(
                f,
                "| {side} | `{}` | {} | {} | `{}` |",
                info.path,
                info.file_type.as_str(),
                info.arch,
                info.sha256
            )?;
        }

        if let Some(delta) = &report.normalize_delta {
            let field = |k: &str| delta.get(k).and_then(Value::as_i64).unwrap_or(0);
            writeln!(f, "\n## Container delta (B - A)\n")?;
            writeln!(f, "- Size: {:+} bytes", field("size_bytes"))?;
            writeln!(f, "- Sections: {:+}", field("section_count"))?;
        }

        writeln!(f, "\n## Candidates\n")?;
        if report.candidates.is_empty() {
            return writeln!(f, "No candidates.");
        }
        writeln!(f, "| # | Function pair | Final | Rank score | Confidence | Validation | Bug class |")?;
        writeln!(f, "|---:|---|---:|---:|---:|---:|---|")?;
        for c in &report.candidates {
            writeln!(
                f,
                "| {} | `{}` | {:.3} | {:.3} | {:.3} | {:.3} | {} |",
                c.final_rank,
                c.func_pair_id,
                c.final_score,
                c.rank_score,
                c.analysis_confidence,
                c.validation_score,
                c.bug_class.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    }
}

/// Markdown rendering of a report.
pub fn render_markdown(report: &Report) -> String {
    MarkdownReport(report).to_string()
}

pub fn run(ctx: &StageContext<'_>) -> PatchdiffResult<ReportOutput> {
    let ranked = load_candidates(ctx, None);
    let scores = load_scores(ctx);
    let normalize_delta = ctx
        .read_upstream(Stage::Normalize, "normalize_summary.json")
        .and_then(|v| v.get("delta").cloned());

    let report = Report {
        job_id: ctx.job.job_id.clone(),
        created_at: Utc::now().to_rfc3339(),
        tag: ctx.job.tag.clone(),
        binary_a: ctx.job.binary_a.clone(),
        binary_b: ctx.job.binary_b.clone(),
        normalize_delta,
        candidates: synthesize(&ranked, &scores),
    };
    let payload = serde_json::to_value(&report)?;

    let dir = ctx.layout.reset_stage_dir(Stage::Report)?;
    let inputs = ArtifactInputs::for_job(&ctx.job).with_upstream(ctx.upstream_hashes(&[
        (Stage::Rank, "ranked_candidates.artifact.json"),
        (Stage::Analyze, "llm_outputs.artifact.json"),
        (Stage::Validate, "validation.artifact.json"),
    ]));
    let entry = ctx.store.write(
        &dir.join("report.artifact.json"),
        "report.summary",
        inputs,
        &payload,
        Some(PayloadSchema::Single(SchemaKind::Report)),
    )?;

    let (path, stale, body) = match ctx.config.report.format {
        ReportFormat::Markdown => (
            ctx.layout.report_md_path.clone(),
            &ctx.layout.report_json_path,
            render_markdown(&report),
        ),
        ReportFormat::Json => (
            ctx.layout.report_json_path.clone(),
            &ctx.layout.report_md_path,
            serde_json::to_string_pretty(&payload)?,
        ),
    };
    // Only the configured format may remain at the job root.
    if stale.exists() {
        fs::remove_file(stale).map_err(|e| {
            PatchdiffError::Report(format!("failed to remove {}: {e}", stale.display()))
        })?;
    }
    fs::write(&path, body)
        .map_err(|e| PatchdiffError::Report(format!("failed to write {}: {e}", path.display())))?;
    info!(path = %path.display(), candidates = report.candidates.len(), "wrote report");
    Ok(ReportOutput { report, path, entry })
}
