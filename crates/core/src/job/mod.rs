//! Job directories: layout, the persisted `Job` record, and the runner lock.

mod layout;
mod lock;

use std::fs;

use chrono::Utc;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{IoResultExt, PatchdiffError, PatchdiffResult};
use crate::model::{BinaryInfo, Job};

pub use layout::JobLayout;
pub use lock::JobLock;

/// Create the job record and persist it as `job.json`.
///
/// A directory that already holds a job for the same two binaries keeps its
/// original record; a job for different binaries is refused.
pub fn create_job(
    layout: &JobLayout,
    tag: Option<String>,
    binary_a: BinaryInfo,
    binary_b: BinaryInfo,
    config: &PipelineConfig,
) -> PatchdiffResult<Job> {
    if layout.job_path.is_file() {
        let existing = load_job(layout)?;
        if existing.binary_a.sha256 == binary_a.sha256 && existing.binary_b.sha256 == binary_b.sha256
        {
            tracing::info!(job_id = %existing.job_id, "reusing existing job record");
            return Ok(existing);
        }
        return Err(PatchdiffError::Ingest(format!(
            "{} already holds job {} for different binaries",
            layout.root.display(),
            existing.job_id
        )));
    }

    fs::create_dir_all(&layout.root).at(&layout.root)?;
    let job = Job {
        job_id: Uuid::new_v4().to_string(),
        created_at: Utc::now().to_rfc3339(),
        tag,
        binary_a,
        binary_b,
        config: config.clone(),
    };
    let body = serde_json::to_string_pretty(&job)?;
    fs::write(&layout.job_path, body).at(&layout.job_path)?;
    Ok(job)
}

/// Reload the job record written by ingest.
pub fn load_job(layout: &JobLayout) -> PatchdiffResult<Job> {
    if !layout.job_path.is_file() {
        return Err(PatchdiffError::MissingInput(layout.job_path.clone()));
    }
    let text = fs::read_to_string(&layout.job_path).at(&layout.job_path)?;
    serde_json::from_str(&text).map_err(|e| {
        PatchdiffError::Argument(format!(
            "{} is not a valid job record: {e}",
            layout.job_path.display()
        ))
    })
}
