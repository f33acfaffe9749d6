//! Diff: pair functions across A and B through the configured backend.

use serde_json::Value;
use tracing::{info, warn};

use crate::artifacts::{ArtifactIndexEntry, ArtifactInputs, PayloadSchema, SchemaKind};
use crate::error::{PatchdiffError, PatchdiffResult};
use crate::services::diff::{diff_backend, DiffBackend, DiffOutput, DiffRequest};
use crate::services::BackendError;
use crate::stages::{Stage, StageContext};

#[derive(Debug, Clone)]
pub struct DiffStageOutput {
    pub pairs: ArtifactIndexEntry,
    pub diffs: ArtifactIndexEntry,
    pub pair_count: usize,
}

pub fn run(ctx: &StageContext<'_>) -> PatchdiffResult<DiffStageOutput> {
    let backend = diff_backend(ctx.config.backends.diff);
    run_with(ctx, backend.as_ref())
}

/// Run the stage against an explicit backend.
pub fn run_with(ctx: &StageContext<'_>, backend: &dyn DiffBackend) -> PatchdiffResult<DiffStageOutput> {
    let request = DiffRequest::for_job(&ctx.job, ctx.config.backends.timeout_secs);
    let output = match backend.diff(&request) {
        Ok(output) => output,
        Err(BackendError::MissingBinary(path)) => return Err(PatchdiffError::MissingInput(path)),
        Err(err @ BackendError::TimedOut { .. }) => {
            return Err(PatchdiffError::DiffBackend(err.to_string()))
        }
        Err(err @ BackendError::Failed(_)) => return Err(PatchdiffError::DiffBackend(err.to_string())),
        Err(BackendError::Unavailable(reason)) => {
            warn!(backend = backend.name(), %reason, "diff backend unavailable; no function pairs");
            DiffOutput::default()
        }
    };
    info!(backend = backend.name(), pairs = output.pairs.len(), "matched functions");

    let pairs: Value = serde_json::to_value(&output.pairs)?;
    let diffs: Value = serde_json::to_value(&output.diffs)?;

    let dir = ctx.layout.reset_stage_dir(Stage::Diff)?;
    let inputs = ArtifactInputs::for_job(&ctx.job)
        .with_upstream(ctx.upstream_hashes(&[(Stage::Normalize, "normalize_summary.artifact.json")]));
    let pairs_entry = ctx.store.publish(
        &dir,
        "function_pairs",
        "diff.function_pairs",
        inputs.clone(),
        &pairs,
        Some(PayloadSchema::ListOf(SchemaKind::FunctionPair)),
    )?;
    let diffs_entry = ctx.store.publish(
        &dir,
        "diff_results",
        "diff.diff_results",
        inputs,
        &diffs,
        Some(PayloadSchema::ListOf(SchemaKind::DiffResult)),
    )?;
    Ok(DiffStageOutput { pairs: pairs_entry, diffs: diffs_entry, pair_count: output.pairs.len() })
}
