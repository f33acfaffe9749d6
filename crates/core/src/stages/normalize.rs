//! Normalize: container summaries for A and B plus their delta.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::artifacts::{ArtifactIndexEntry, ArtifactInputs, PayloadSchema, SchemaKind};
use crate::binary::{summarize, BinarySummary};
use crate::error::PatchdiffResult;
use crate::stages::{Stage, StageContext};

/// B minus A for the size and section count.
pub fn summary_delta(a: &BinarySummary, b: &BinarySummary) -> Value {
    json!({
        "size_bytes": b.size_bytes as i64 - a.size_bytes as i64,
        "section_count": b.section_count as i64 - a.section_count as i64,
    })
}

pub fn run(ctx: &StageContext<'_>) -> PatchdiffResult<ArtifactIndexEntry> {
    let summary_a = summarize(&ctx.job.binary_a)?;
    let summary_b = summarize(&ctx.job.binary_b)?;
    info!(
        sections_a = summary_a.section_count,
        sections_b = summary_b.section_count,
        "normalized containers"
    );

    let payload = json!({
        "job_id": ctx.job.job_id,
        "created_at": Utc::now().to_rfc3339(),
        "delta": summary_delta(&summary_a, &summary_b),
        "binary_a": summary_a,
        "binary_b": summary_b,
    });

    let dir = ctx.layout.reset_stage_dir(Stage::Normalize)?;
    let inputs = ArtifactInputs::for_job(&ctx.job)
        .with_upstream(ctx.upstream_hashes(&[(Stage::Ingest, "job.artifact.json")]));
    ctx.store.publish(
        &dir,
        "normalize_summary",
        "normalize.summary",
        inputs,
        &payload,
        Some(PayloadSchema::Single(SchemaKind::Normalize)),
    )
}
