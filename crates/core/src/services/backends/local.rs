//! Offline, deterministic analysis provider.
//!
//! Classifies a change from keywords in the diff summary and from code lines
//! that appear only in B's pseudocode. Every evidence snippet it emits is a
//! verbatim substring of the packet, so it can be checked downstream.

use std::collections::HashSet;

use serde_json::{json, Value};

use crate::services::analysis::{AnalysisProvider, ProviderRequest};
use crate::services::BackendError;

/// Keyword rules, first match wins.
const RULES: &[(&str, &[&str])] = &[
    ("integer-overflow-fix", &["overflow", "wrap", "saturat"]),
    ("use-after-free-fix", &["use-after-free", "free(", "dangling"]),
    ("null-check-added", &["null", "nullptr"]),
    ("bounds-check-hardening", &["bounds", "length", "len", "size", "<", "<="]),
    ("input-validation", &["validate", "sanitize", "invalid"]),
    ("race-condition-fix", &["lock", "mutex", "atomic"]),
];

const MAX_SNIPPET: usize = 160;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProvider;

fn packet_str<'a>(packet: &'a Value, path: &[&str]) -> &'a str {
    path.iter().try_fold(packet, |v, key| v.get(*key)).and_then(Value::as_str).unwrap_or("")
}

/// Lines present in `b` but not in `a`, trimmed and non-empty.
fn added_lines<'a>(a: &str, b: &'a str) -> Vec<&'a str> {
    let before: HashSet<&str> = a.lines().map(str::trim).collect();
    b.lines().map(str::trim).filter(|l| !l.is_empty() && !before.contains(l)).collect()
}

/// Free-text leaves of a change summary; structural keys are skipped.
fn collect_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, out)),
        Value::Object(map) => map
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "kind" | "symbol"))
            .for_each(|(_, v)| collect_text(v, out)),
        _ => {}
    }
}

fn clip(snippet: &str) -> String {
    snippet.chars().take(MAX_SNIPPET).collect()
}

impl AnalysisProvider for LocalProvider {
    fn analyze(&self, request: &ProviderRequest<'_>) -> Result<Value, BackendError> {
        let packet = request.packet;
        let func_pair_id = packet_str(packet, &["func_pair_id"]);
        if func_pair_id.is_empty() {
            return Err(BackendError::Failed("packet has no func_pair_id".to_string()));
        }
        let mut summary = String::new();
        if let Some(change) = packet.get("diff").and_then(|d| d.get("change_summary")) {
            collect_text(change, &mut summary);
        }
        let pseudo_a = packet_str(packet, &["decompiled", "pseudocode_a"]);
        let pseudo_b = packet_str(packet, &["decompiled", "pseudocode_b"]);
        let added = added_lines(pseudo_a, pseudo_b);

        let summary_lower = summary.to_lowercase();
        let added_lower: Vec<String> = added.iter().map(|l| l.to_lowercase()).collect();

        let mut bug_class = "logic-fix";
        let mut evidence = Vec::new();
        for (class, keywords) in RULES {
            let in_summary = keywords.iter().find(|k| k.len() > 2 && summary_lower.contains(*k));
            let in_code = added_lower
                .iter()
                .position(|line| keywords.iter().any(|k| line.contains(k)));
            if in_summary.is_none() && in_code.is_none() {
                continue;
            }
            bug_class = *class;
            if let Some(keyword) = in_summary {
                evidence.push(json!({
                    "type": "diff_summary",
                    "snippet": keyword,
                    "location": "diff.change_summary",
                }));
            }
            if let Some(idx) = in_code {
                evidence.push(json!({
                    "type": "pseudocode",
                    "snippet": clip(added[idx]),
                    "location": "decompiled.pseudocode_b",
                }));
            }
            break;
        }
        if evidence.is_empty() {
            if let Some(line) = added.first() {
                evidence.push(json!({
                    "type": "pseudocode",
                    "snippet": clip(line),
                    "location": "decompiled.pseudocode_b",
                }));
            }
        }

        let base: f64 = if bug_class == "logic-fix" { 0.3 } else { 0.5 };
        let refinement = 0.05 * f64::from(request.round.saturating_sub(1));
        let confidence = (base + 0.1 * evidence.len() as f64 + refinement).min(0.9);

        let callers: Vec<String> = packet
            .get("function")
            .and_then(|f| f.get("callers_b"))
            .and_then(Value::as_array)
            .map(|c| c.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        let reachability_notes = if callers.is_empty() {
            vec!["no caller information available".to_string()]
        } else {
            callers.iter().map(|c| format!("reachable from {c}")).collect()
        };

        Ok(json!({
            "func_pair_id": func_pair_id,
            "bug_class": bug_class,
            "confidence": (confidence * 1000.0).round() / 1000.0,
            "evidence": evidence,
            "reachability_notes": reachability_notes,
            "recommended_validation": [
                "exercise boundary values around the changed condition",
                "run the patched and unpatched builds on the same regression inputs",
            ],
            "safety": { "no_exploit_steps": true },
            "model": request.model,
        }))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
