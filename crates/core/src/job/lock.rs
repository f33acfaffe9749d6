use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{IoResultExt, PatchdiffError, PatchdiffResult};
use crate::job::JobLayout;

/// Advisory lock held while a command writes into a job directory.
///
/// Acquisition is an exclusive create of `.patchdiff.lock`; the file is
/// removed when the guard drops. A crashed runner leaves the file behind and
/// it must be deleted by hand.
#[derive(Debug)]
pub struct JobLock {
    path: PathBuf,
}

impl JobLock {
    pub fn acquire(layout: &JobLayout) -> PatchdiffResult<Self> {
        fs::create_dir_all(&layout.root).at(&layout.root)?;
        let path = layout.lock_path.clone();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(PatchdiffError::JobLocked(path));
            }
            Err(e) => return Err(PatchdiffError::io(&path, e)),
        };
        let owner = json!({ "pid": std::process::id(), "acquired_at": Utc::now().to_rfc3339() });
        let guard = Self { path };
        writeln!(file, "{owner}").at(&guard.path)?;
        debug!(lock = %guard.path.display(), "acquired job lock");
        Ok(guard)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release job lock");
        }
    }
}
