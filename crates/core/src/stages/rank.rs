//! Rank: score diff output into an ordered candidate list.

use chrono::Utc;
use tracing::info;

use crate::artifacts::{ArtifactIndexEntry, ArtifactInputs, PayloadSchema, SchemaKind};
use crate::error::PatchdiffResult;
use crate::model::RankedCandidates;
use crate::ranking::rank_candidates;
use crate::stages::{Stage, StageContext};

pub fn run(ctx: &StageContext<'_>) -> PatchdiffResult<(RankedCandidates, ArtifactIndexEntry)> {
    let pairs = ctx.read_upstream_list(Stage::Diff, "function_pairs.json");
    let diffs = ctx.read_upstream_list(Stage::Diff, "diff_results.json");
    let ranking = &ctx.config.ranking;

    let ranked = RankedCandidates {
        job_id: ctx.job.job_id.clone(),
        created_at: Utc::now().to_rfc3339(),
        top_n: ranking.top_n,
        candidates: rank_candidates(&pairs, &diffs, &ranking.weights, ranking.top_n),
    };
    info!(
        pairs = pairs.len(),
        candidates = ranked.candidates.len(),
        top_n = ranking.top_n,
        "ranked candidates"
    );

    let dir = ctx.layout.reset_stage_dir(Stage::Rank)?;
    let inputs = ArtifactInputs::for_job(&ctx.job).with_upstream(ctx.upstream_hashes(&[
        (Stage::Diff, "function_pairs.artifact.json"),
        (Stage::Diff, "diff_results.artifact.json"),
    ]));
    let entry = ctx.store.publish(
        &dir,
        "ranked_candidates",
        "rank.candidates",
        inputs,
        &serde_json::to_value(&ranked)?,
        Some(PayloadSchema::Single(SchemaKind::RankedCandidates)),
    )?;
    Ok((ranked, entry))
}
