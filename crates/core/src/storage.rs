//! Content-addressed object storage for archived inputs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, PatchdiffError, PatchdiffResult};

/// Key/value blob storage.
pub trait ObjectStore {
    fn put(&self, key: &str, data: &[u8]) -> PatchdiffResult<()>;
    fn get(&self, key: &str) -> PatchdiffResult<Vec<u8>>;
    fn exists(&self, key: &str) -> bool;
}

/// Stores each object as a file under `root/<key>`.
#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    /// Resolve a key, rejecting anything that could escape the root.
    fn key_path(&self, key: &str) -> PatchdiffResult<PathBuf> {
        let clean = !key.is_empty()
            && !key.starts_with('/')
            && key.split('/').all(|part| !part.is_empty() && part != "." && part != "..")
            && !key.contains('\\');
        if !clean {
            return Err(PatchdiffError::Argument(format!("invalid object key '{key}'")));
        }
        Ok(self.root.join(key))
    }
}

impl ObjectStore for FilesystemObjectStore {
    fn put(&self, key: &str, data: &[u8]) -> PatchdiffResult<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }
        fs::write(&path, data).at(&path)
    }

    fn get(&self, key: &str) -> PatchdiffResult<Vec<u8>> {
        let path = self.key_path(key)?;
        if !path.is_file() {
            return Err(PatchdiffError::MissingInput(path));
        }
        fs::read(&path).at(&path)
    }

    fn exists(&self, key: &str) -> bool {
        self.key_path(key).map(|p| p.is_file()).unwrap_or(false)
    }
}
