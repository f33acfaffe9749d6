//! Append-only provenance index (`artifact_index.json`).

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, PatchdiffError, PatchdiffResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactIndexEntry {
    pub artifact_id: String,
    pub artifact_type: String,
    pub created_at: String,
    /// Envelope path, relative to the job root.
    pub path: String,
    pub payload_sha256: String,
    /// Hash of the envelope file as written.
    pub artifact_sha256: String,
}

/// Read every entry; a missing index is empty, an unreadable one is an error.
pub fn read_index(path: &Path) -> PatchdiffResult<Vec<ArtifactIndexEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).at(path)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&text)
        .map_err(|e| PatchdiffError::Index { path: path.to_path_buf(), reason: e.to_string() })
}

/// Replace the index with `entries` through a temp file and rename.
///
/// The rename is the commit point, so an interrupted write leaves the
/// previous index intact.
pub(crate) fn write_index(path: &Path, entries: &[ArtifactIndexEntry]) -> PatchdiffResult<()> {
    let body = serde_json::to_string_pretty(entries)?;

    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp).at(&tmp)?;
        file.write_all(body.as_bytes()).at(&tmp)?;
        file.sync_all().at(&tmp)?;
    }
    fs::rename(&tmp, path).at(path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
