use anyhow::Result;
use patchdiff_core::artifacts::verify_job;
use patchdiff_core::job::JobLayout;
use patchdiff_core::PatchdiffError;
use serde_json::json;

use crate::canonicalize_or_current;

/// Re-hash every envelope in a job and cross-check the provenance index.
///
/// Any failure is reported as a validation error (exit 70).
pub fn verify_command(job: &str, json_output: bool) -> Result<()> {
    let layout = JobLayout::new(canonicalize_or_current(job)?);
    if !layout.root.is_dir() {
        return Err(PatchdiffError::MissingInput(layout.root).into());
    }
    let report = verify_job(&layout)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "checked {} envelope(s) against {} index entr{}",
            report.envelopes_checked,
            report.index_entries,
            if report.index_entries == 1 { "y" } else { "ies" }
        );
        for failure in &report.failures {
            println!("  FAIL {}: {}", failure.path, failure.reason);
        }
    }

    if report.is_ok() {
        if !json_output {
            println!("all artifacts verified");
        }
        Ok(())
    } else {
        Err(PatchdiffError::validation(
            format!("{} artifact check(s) failed", report.failures.len()),
            json!({ "failures": report.failures }),
        )
        .into())
    }
}
