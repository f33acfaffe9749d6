//! Ingest: identify both inputs and create the job record.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::artifacts::{ArtifactIndexEntry, ArtifactInputs, ArtifactStore, PayloadSchema, SchemaKind};
use crate::binary::identify;
use crate::config::{PipelineConfig, StorageKind};
use crate::error::{IoResultExt, PatchdiffError, PatchdiffResult};
use crate::job::{create_job, JobLayout};
use crate::model::{BinaryInfo, Job};
use crate::stages::Stage;
use crate::storage::{FilesystemObjectStore, ObjectStore};

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub binary_a: PathBuf,
    pub binary_b: PathBuf,
    pub tag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub job: Job,
    pub entry: ArtifactIndexEntry,
}

/// Absolute form of an input path so later stages work from any directory.
fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn identify_input(path: &Path) -> PatchdiffResult<BinaryInfo> {
    if !path.is_file() {
        return Err(PatchdiffError::MissingInput(path.to_path_buf()));
    }
    identify(&absolute(path))
}

fn archive_input(store: &dyn ObjectStore, info: &BinaryInfo) -> PatchdiffResult<()> {
    let key = format!("binaries/{}", info.sha256);
    if store.exists(&key) {
        return Ok(());
    }
    let path = Path::new(&info.path);
    let data = fs::read(path).at(path)?;
    store.put(&key, &data)?;
    info!(key = %key, "archived input binary");
    Ok(())
}

pub fn run(
    layout: &JobLayout,
    config: &PipelineConfig,
    request: &IngestRequest,
) -> PatchdiffResult<IngestOutcome> {
    let binary_a = identify_input(&request.binary_a)?;
    let binary_b = identify_input(&request.binary_b)?;
    info!(
        a = %binary_a.path,
        a_type = binary_a.file_type.as_str(),
        b = %binary_b.path,
        b_type = binary_b.file_type.as_str(),
        "identified inputs"
    );

    let job = create_job(layout, request.tag.clone(), binary_a, binary_b, config)?;

    if config.storage.archive_inputs {
        let store = match config.storage.kind {
            StorageKind::Filesystem => FilesystemObjectStore::new(&config.storage.root),
        };
        archive_input(&store, &job.binary_a)?;
        archive_input(&store, &job.binary_b)?;
    }

    let dir = layout.reset_stage_dir(Stage::Ingest)?;
    let store = ArtifactStore::new(layout.clone());
    let payload = serde_json::to_value(&job)?;
    let entry = store.write(
        &dir.join("job.artifact.json"),
        "ingest.job",
        ArtifactInputs::for_job(&job),
        &payload,
        Some(PayloadSchema::Single(SchemaKind::Job)),
    )?;
    Ok(IngestOutcome { job, entry })
}
