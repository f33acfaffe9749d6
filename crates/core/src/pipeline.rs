//! Stage orchestration.
//!
//! Every stage invocation, alone or as part of a full run, goes through the
//! same audited runner: a `start` audit line, the stage, then `success` or
//! `error`. The job lock is held for the whole command.

use serde_json::json;
use tracing::{error, info, info_span};

use crate::artifacts::ArtifactIndexEntry;
use crate::audit;
use crate::config::PipelineConfig;
use crate::error::{PatchdiffError, PatchdiffResult};
use crate::job::{load_job, JobLayout, JobLock};
use crate::model::{AuditEvent, Job};
use crate::stages::ingest::IngestRequest;
use crate::stages::{self, Stage, StageContext};

/// What one stage published.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: Stage,
    pub job_id: String,
    pub entries: Vec<ArtifactIndexEntry>,
    pub summary: String,
}

impl StageReport {
    fn new(stage: Stage, job: &Job, entries: Vec<ArtifactIndexEntry>, summary: String) -> Self {
        Self { stage, job_id: job.job_id.clone(), entries, summary }
    }
}

/// Wrap a stage body with audit entries and a tracing span.
fn audited<T>(
    layout: &JobLayout,
    stage: Stage,
    job_id: Option<&str>,
    body: impl FnOnce() -> PatchdiffResult<T>,
) -> PatchdiffResult<T> {
    let span = info_span!("stage", stage = stage.name(), job_id = job_id.unwrap_or("-"));
    let _guard = span.enter();

    audit::append(layout, stage.name(), AuditEvent::Start, None)?;
    match body() {
        Ok(value) => {
            audit::append(layout, stage.name(), AuditEvent::Success, None)?;
            info!("stage complete");
            Ok(value)
        }
        Err(err) => {
            let details = json!({ "message": err.to_string(), "exit_code": err.exit_code() });
            if let Err(audit_err) = audit::append(layout, stage.name(), AuditEvent::Error, Some(details))
            {
                error!(error = %audit_err, "failed to record stage error in audit log");
            }
            error!(error = %err, "stage failed");
            Err(err)
        }
    }
}

fn ingest_locked(
    layout: &JobLayout,
    config: &PipelineConfig,
    request: &IngestRequest,
) -> PatchdiffResult<(Job, StageReport)> {
    audited(layout, Stage::Ingest, None, || {
        let outcome = stages::ingest::run(layout, config, request)?;
        let summary = format!(
            "job {} ({} {} vs {} {})",
            outcome.job.job_id,
            outcome.job.binary_a.file_type.as_str(),
            outcome.job.binary_a.arch,
            outcome.job.binary_b.file_type.as_str(),
            outcome.job.binary_b.arch
        );
        let report = StageReport::new(Stage::Ingest, &outcome.job, vec![outcome.entry], summary);
        Ok((outcome.job, report))
    })
}

/// Run one post-ingest stage body; the caller holds the lock.
fn execute(layout: &JobLayout, config: &PipelineConfig, job: &Job, stage: Stage) -> PatchdiffResult<StageReport> {
    audited(layout, stage, Some(&job.job_id), || {
        let ctx = StageContext::new(layout, config, job.clone());
        let (entries, summary) = match stage {
            Stage::Ingest => {
                return Err(PatchdiffError::Argument(
                    "ingest needs input binaries; use the ingest command".to_string(),
                ))
            }
            Stage::Normalize => {
                let entry = stages::normalize::run(&ctx)?;
                (vec![entry], "normalized both containers".to_string())
            }
            Stage::Diff => {
                let out = stages::diff::run(&ctx)?;
                (vec![out.pairs, out.diffs], format!("{} function pair(s)", out.pair_count))
            }
            Stage::Rank => {
                let (ranked, entry) = stages::rank::run(&ctx)?;
                (vec![entry], format!("{} ranked candidate(s)", ranked.candidates.len()))
            }
            Stage::Decompile => {
                let (records, entry) = stages::decompile::run(&ctx)?;
                (vec![entry], format!("{} function(s) decompiled", records.len()))
            }
            Stage::Analyze => {
                let out = stages::analyze::run(&ctx)?;
                let summary = format!(
                    "{} candidate(s) analyzed over {} round(s)",
                    out.output.analysis.len(),
                    out.rounds.len()
                );
                (vec![out.entry], summary)
            }
            Stage::Validate => {
                let (output, entry) = stages::validate::run(&ctx)?;
                let passed = output.checks.iter().filter(|c| c.passed).count();
                (vec![entry], format!("{passed}/{} check(s) passed", output.checks.len()))
            }
            Stage::Report => {
                let out = stages::report::run(&ctx)?;
                (vec![out.entry], format!("report written to {}", out.path.display()))
            }
        };
        Ok(StageReport::new(stage, job, entries, summary))
    })
}

/// Create (or reuse) the job and publish the ingest artifact.
pub fn run_ingest(
    layout: &JobLayout,
    config: &PipelineConfig,
    request: &IngestRequest,
) -> PatchdiffResult<StageReport> {
    let _lock = JobLock::acquire(layout)?;
    ingest_locked(layout, config, request).map(|(_, report)| report)
}

/// Run one stage against an existing job.
pub fn run_stage(layout: &JobLayout, config: &PipelineConfig, stage: Stage) -> PatchdiffResult<StageReport> {
    if stage == Stage::Ingest {
        return Err(PatchdiffError::Argument(
            "ingest needs input binaries; use the ingest command".to_string(),
        ));
    }
    if !layout.job_path.is_file() {
        return Err(PatchdiffError::MissingInput(layout.job_path.clone()));
    }
    let _lock = JobLock::acquire(layout)?;
    let job = load_job(layout)?;
    execute(layout, config, &job, stage)
}

/// Run every stage in order, starting from ingest. Stops at the first failure.
pub fn run_all(
    layout: &JobLayout,
    config: &PipelineConfig,
    request: &IngestRequest,
) -> PatchdiffResult<Vec<StageReport>> {
    let _lock = JobLock::acquire(layout)?;
    let (job, ingest_report) = ingest_locked(layout, config, request)?;
    let mut reports = vec![ingest_report];
    for stage in Stage::ORDER.into_iter().filter(|s| *s != Stage::Ingest) {
        reports.push(execute(layout, config, &job, stage)?);
    }
    info!(job_id = %job.job_id, stages = reports.len(), "pipeline complete");
    Ok(reports)
}
