//! After-the-fact integrity checks over a job's envelopes and index.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::artifacts::{read_index, ArtifactEnvelope, SchemaKind};
use crate::error::{IoResultExt, PatchdiffResult};
use crate::hashing::{sha256_bytes, sha256_json};
use crate::job::JobLayout;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub envelopes_checked: usize,
    pub index_entries: usize,
    pub failures: Vec<VerifyFailure>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Re-hash every `*.artifact.json` under `artifacts/` and cross-check the index.
///
/// For each envelope path the newest index entry must record the file's
/// current hash; older entries for the same path are history and are not checked.
pub fn verify_job(layout: &JobLayout) -> PatchdiffResult<VerifyReport> {
    let index = read_index(&layout.index_path)?;
    let mut latest: HashMap<&str, &str> = HashMap::new();
    for entry in &index {
        latest.insert(entry.path.as_str(), entry.artifact_sha256.as_str());
    }

    let mut report = VerifyReport { index_entries: index.len(), ..Default::default() };
    let mut envelopes = Vec::new();
    if layout.artifacts_dir.is_dir() {
        collect_envelopes(&layout.artifacts_dir, &mut envelopes)?;
    }
    envelopes.sort();

    for path in envelopes {
        report.envelopes_checked += 1;
        let rel = layout.relative(&path);
        let fail = |reason: String| VerifyFailure { path: rel.clone(), reason };
        let bytes = fs::read(&path).at(&path)?;

        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => {
                report.failures.push(fail(format!("unparsable envelope: {e}")));
                continue;
            }
        };
        if let Err(errors) = SchemaKind::Envelope.check(&value) {
            report.failures.push(fail(format!("envelope schema: {}", errors.join("; "))));
            continue;
        }
        let envelope: ArtifactEnvelope = match serde_json::from_value(value) {
            Ok(env) => env,
            Err(e) => {
                report.failures.push(fail(format!("envelope shape: {e}")));
                continue;
            }
        };

        let recomputed = sha256_json(&envelope.payload);
        if recomputed != envelope.payload_sha256 {
            report.failures.push(fail(format!(
                "payload_sha256 mismatch: recorded {}, recomputed {recomputed}",
                envelope.payload_sha256
            )));
        }
        match latest.get(rel.as_str()) {
            None => report.failures.push(fail("no index entry".to_string())),
            Some(recorded) if *recorded != sha256_bytes(&bytes) => {
                report.failures.push(fail("file hash differs from newest index entry".to_string()))
            }
            Some(_) => {}
        }
    }
    Ok(report)
}

fn collect_envelopes(dir: &Path, out: &mut Vec<PathBuf>) -> PatchdiffResult<()> {
    for entry in fs::read_dir(dir).at(dir)? {
        let path = entry.at(dir)?.path();
        if path.is_dir() {
            collect_envelopes(&path, out)?;
        } else if path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(".artifact.json"))
        {
            out.push(path);
        }
    }
    Ok(())
}
