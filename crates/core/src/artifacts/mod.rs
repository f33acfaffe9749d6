//! Content-addressed artifact envelopes.
//!
//! Every published stage output is wrapped in an [`ArtifactEnvelope`] whose
//! `payload_sha256` is the hash of the canonical payload serialization, and
//! each write appends one entry to the job's provenance index.

pub mod index;
pub mod schema;
pub mod verify;

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{IoResultExt, PatchdiffError, PatchdiffResult};
use crate::hashing::{sha256_bytes, sha256_json};
use crate::job::JobLayout;
use crate::model::Job;

use index::write_index;
pub use index::{read_index, ArtifactIndexEntry};
pub use schema::{PayloadSchema, SchemaKind};
pub use verify::{verify_job, VerifyFailure, VerifyReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInputs {
    pub binary_a_sha256: String,
    pub binary_b_sha256: String,
    pub upstream_artifact_hashes: Vec<String>,
}

impl ArtifactInputs {
    pub fn for_job(job: &Job) -> Self {
        Self {
            binary_a_sha256: job.binary_a.sha256.clone(),
            binary_b_sha256: job.binary_b.sha256.clone(),
            upstream_artifact_hashes: Vec::new(),
        }
    }

    pub fn with_upstream(mut self, hashes: impl IntoIterator<Item = String>) -> Self {
        self.upstream_artifact_hashes.extend(hashes);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub artifact_id: String,
    pub artifact_type: String,
    pub created_at: String,
    pub tool_version: String,
    pub inputs: ArtifactInputs,
    pub payload_sha256: String,
    pub payload: Value,
}

/// Writes envelopes into one job directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    layout: JobLayout,
}

impl ArtifactStore {
    pub fn new(layout: JobLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &JobLayout {
        &self.layout
    }

    /// Validate, hash, write, and index one envelope.
    ///
    /// All-or-nothing: when the payload or the envelope fails its schema,
    /// neither the envelope file nor an index entry is written.
    pub fn write(
        &self,
        path: &Path,
        artifact_type: &str,
        inputs: ArtifactInputs,
        payload: &Value,
        schema: Option<PayloadSchema>,
    ) -> PatchdiffResult<ArtifactIndexEntry> {
        if let Some(schema) = schema {
            schema.check(payload).map_err(|errors| {
                PatchdiffError::validation(
                    format!("payload for {artifact_type} failed schema validation"),
                    json!({ "artifact_type": artifact_type, "errors": errors }),
                )
            })?;
        }

        let envelope = ArtifactEnvelope {
            artifact_id: Uuid::new_v4().to_string(),
            artifact_type: artifact_type.to_string(),
            created_at: Utc::now().to_rfc3339(),
            tool_version: crate::version().to_string(),
            inputs,
            payload_sha256: sha256_json(payload),
            payload: payload.clone(),
        };
        let envelope_value = serde_json::to_value(&envelope)?;
        SchemaKind::Envelope.check(&envelope_value).map_err(|errors| {
            PatchdiffError::validation(
                format!("envelope for {artifact_type} failed schema validation"),
                json!({ "artifact_type": artifact_type, "errors": errors }),
            )
        })?;

        // An unreadable index must fail before anything lands on disk.
        let mut entries = read_index(&self.layout.index_path)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }
        let body = serde_json::to_string_pretty(&envelope_value)?;
        fs::write(path, &body).at(path)?;

        let entry = ArtifactIndexEntry {
            artifact_id: envelope.artifact_id,
            artifact_type: envelope.artifact_type,
            created_at: envelope.created_at,
            path: self.layout.relative(path),
            payload_sha256: envelope.payload_sha256,
            artifact_sha256: sha256_bytes(body.as_bytes()),
        };
        entries.push(entry.clone());
        if let Err(err) = write_index(&self.layout.index_path, &entries) {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove unindexed envelope");
            }
            return Err(err);
        }
        debug!(artifact_type, path = %entry.path, "published artifact");
        Ok(entry)
    }

    /// Publish `<name>.artifact.json` plus a plain `<name>.json` copy of the payload.
    pub fn publish(
        &self,
        dir: &Path,
        name: &str,
        artifact_type: &str,
        inputs: ArtifactInputs,
        payload: &Value,
        schema: Option<PayloadSchema>,
    ) -> PatchdiffResult<ArtifactIndexEntry> {
        let entry =
            self.write(&dir.join(format!("{name}.artifact.json")), artifact_type, inputs, payload, schema)?;
        write_json(&dir.join(format!("{name}.json")), payload)?;
        Ok(entry)
    }

    /// Payload hash of a previously written envelope, if it exists and parses.
    pub fn upstream_hash(&self, envelope_path: &Path) -> Option<String> {
        let text = fs::read_to_string(envelope_path).ok()?;
        let envelope: ArtifactEnvelope = serde_json::from_str(&text).ok()?;
        Some(envelope.payload_sha256)
    }

    /// Payload hashes of every existing envelope among `paths`.
    pub fn upstream_hashes<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> Vec<String> {
        paths.into_iter().filter_map(|p| self.upstream_hash(p)).collect()
    }
}

/// Write a pretty-printed JSON file.
pub fn write_json(path: &Path, value: &impl Serialize) -> PatchdiffResult<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).at(path)
}

/// Read a JSON file; missing or unparsable files yield `None`.
pub fn read_json(path: &Path) -> Option<Value> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable upstream JSON");
            None
        }
    }
}
