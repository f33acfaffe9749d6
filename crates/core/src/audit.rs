//! Append-only audit trail (`audit.jsonl`).

use std::fs::{self, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::Value;

use crate::error::{IoResultExt, PatchdiffResult};
use crate::hashing::canonical_json;
use crate::job::JobLayout;
use crate::model::{AuditEntry, AuditEvent};

/// Append one sorted-key JSON line for a stage event.
pub fn append(
    layout: &JobLayout,
    stage: &str,
    event: AuditEvent,
    details: Option<Value>,
) -> PatchdiffResult<()> {
    fs::create_dir_all(&layout.root).at(&layout.root)?;
    let entry = AuditEntry {
        timestamp: Utc::now().to_rfc3339(),
        stage: stage.to_string(),
        event,
        details: details.unwrap_or_else(|| Value::Object(Default::default())),
    };
    let line = canonical_json(&serde_json::to_value(&entry)?);
    let mut file =
        OpenOptions::new().create(true).append(true).open(&layout.audit_path).at(&layout.audit_path)?;
    writeln!(file, "{line}").at(&layout.audit_path)
}
