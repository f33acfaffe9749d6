use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, PatchdiffResult};
use crate::stages::Stage;

/// Logical layout of a job directory on disk.
///
/// This is derived from a chosen root path. It does *not* perform any IO itself,
/// apart from the explicit directory helpers below.
#[derive(Debug, Clone)]
pub struct JobLayout {
    /// Root directory of the job.
    pub root: PathBuf,
    /// Serialized `Job` record.
    pub job_path: PathBuf,
    /// Append-only provenance index.
    pub index_path: PathBuf,
    /// Newline-delimited audit log.
    pub audit_path: PathBuf,
    /// Advisory single-writer lock.
    pub lock_path: PathBuf,
    /// Parent of every per-stage output directory.
    pub artifacts_dir: PathBuf,
    pub report_md_path: PathBuf,
    pub report_json_path: PathBuf,
}

impl JobLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            job_path: root.join("job.json"),
            index_path: root.join("artifact_index.json"),
            audit_path: root.join("audit.jsonl"),
            lock_path: root.join(".patchdiff.lock"),
            artifacts_dir: root.join("artifacts"),
            report_md_path: root.join("report.md"),
            report_json_path: root.join("report.json"),
            root,
        }
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.artifacts_dir.join(stage.dir_name())
    }

    /// Recreate a stage's output directory, discarding its previous contents.
    pub fn reset_stage_dir(&self, stage: Stage) -> PatchdiffResult<PathBuf> {
        let dir = self.stage_dir(stage);
        if dir.exists() {
            fs::remove_dir_all(&dir).at(&dir)?;
        }
        fs::create_dir_all(&dir).at(&dir)?;
        Ok(dir)
    }

    /// Path relative to the job root when possible, for portable index entries.
    pub fn relative(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => path.to_string_lossy().to_string(),
        }
    }
}
