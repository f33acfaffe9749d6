use anyhow::Result;
use patchdiff_core::config::PipelineConfig;
use patchdiff_core::job::JobLayout;
use patchdiff_core::pipeline::{run_all, run_ingest, run_stage, StageReport};
use patchdiff_core::stages::ingest::IngestRequest;
use patchdiff_core::stages::Stage;
use tracing::debug;

use crate::canonicalize_or_current;

fn print_report(report: &StageReport) {
    println!("[{}] {}", report.stage, report.summary);
    for entry in &report.entries {
        println!("  - {} ({})", entry.path, entry.artifact_type);
    }
}

fn ingest_request(a: &str, b: &str, tag: Option<String>) -> Result<IngestRequest> {
    Ok(IngestRequest {
        binary_a: canonicalize_or_current(a)?,
        binary_b: canonicalize_or_current(b)?,
        tag,
    })
}

/// Identify both binaries and create the job directory at `out`.
pub fn ingest_command(
    config: &PipelineConfig,
    a: &str,
    b: &str,
    out: &str,
    tag: Option<String>,
) -> Result<()> {
    let layout = JobLayout::new(canonicalize_or_current(out)?);
    let report = run_ingest(&layout, config, &ingest_request(a, b, tag)?)?;
    println!("job_id: {}", report.job_id);
    println!("job_dir: {}", layout.root.display());
    print_report(&report);
    Ok(())
}

/// Run one post-ingest stage against an existing job directory.
pub fn stage_command(config: &PipelineConfig, job: &str, stage: Stage) -> Result<()> {
    let layout = JobLayout::new(canonicalize_or_current(job)?);
    debug!(job = %layout.root.display(), stage = stage.name(), "running single stage");
    let report = run_stage(&layout, config, stage)?;
    print_report(&report);
    Ok(())
}

/// Run the whole pipeline from ingest to report.
pub fn run_command(
    config: &PipelineConfig,
    a: &str,
    b: &str,
    out: &str,
    tag: Option<String>,
) -> Result<()> {
    let layout = JobLayout::new(canonicalize_or_current(out)?);
    let request = ingest_request(a, b, tag)?;
    debug!(
        a = %request.binary_a.display(),
        b = %request.binary_b.display(),
        out = %layout.root.display(),
        "running full pipeline"
    );
    let reports = run_all(&layout, config, &request)?;
    if let Some(first) = reports.first() {
        println!("job_id: {}", first.job_id);
    }
    println!("job_dir: {}", layout.root.display());
    for report in &reports {
        print_report(report);
    }
    Ok(())
}
