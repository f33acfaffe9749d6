//! Candidate ranking engine.
//!
//! Pure function of its inputs: the same pairs, diff results, weights, and
//! `top_n` always produce the same ranked list, whatever the input order.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use crate::config::RankingWeights;
use crate::model::{RankedCandidate, Signal};

/// Evidence items beyond this count add nothing.
pub const EVIDENCE_CAP: usize = 5;

#[derive(Debug, Clone, PartialEq)]
struct PairSignals {
    func_pair_id: String,
    match_score: f64,
    evidence_count: usize,
}

/// Accept JSON numbers and numeric strings; anything else is `None`.
fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Optional numeric field: absent or null means 0, present but not numeric means invalid.
fn numeric_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    match obj.get(key) {
        None | Some(Value::Null) => Some(0.0),
        Some(v) => numeric(v),
    }
}

fn pair_id(obj: &serde_json::Map<String, Value>) -> Option<String> {
    obj.get("func_pair_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn parse_pair(value: &Value) -> Option<PairSignals> {
    let obj = value.as_object()?;
    Some(PairSignals {
        func_pair_id: pair_id(obj)?,
        match_score: numeric_field(obj, "match_score")?,
        evidence_count: obj.get("evidence").and_then(Value::as_array).map_or(0, Vec::len),
    })
}

/// Severity per pair id; later duplicates replace earlier ones.
fn severities(diffs: &[Value]) -> HashMap<String, f64> {
    let mut out = HashMap::new();
    for diff in diffs {
        let Some(obj) = diff.as_object() else { continue };
        let (Some(id), Some(severity)) = (pair_id(obj), numeric_field(obj, "severity_hint")) else {
            continue;
        };
        out.insert(id, severity);
    }
    out
}

pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Score, order, truncate, and number candidates.
///
/// Malformed pair or diff entries are skipped. Equal scores are ordered by
/// `func_pair_id` so the output does not depend on input order.
pub fn rank_candidates(
    pairs: &[Value],
    diffs: &[Value],
    weights: &RankingWeights,
    top_n: usize,
) -> Vec<RankedCandidate> {
    let severity = severities(diffs);

    let mut scored: Vec<(f64, PairSignals, Vec<Signal>)> = pairs
        .iter()
        .filter_map(parse_pair)
        .map(|pair| {
            let severity_hint = severity.get(&pair.func_pair_id).copied().unwrap_or(0.0);
            let evidence_ratio = pair.evidence_count.min(EVIDENCE_CAP) as f64 / EVIDENCE_CAP as f64;
            let mut signals = vec![
                signal("severity_hint", severity_hint, weights.severity_hint, severity_hint),
                signal("match_score", pair.match_score, weights.match_score, pair.match_score),
                signal("evidence", pair.evidence_count as f64, weights.evidence, evidence_ratio),
            ];
            let score = round6(signals.iter().map(|s| s.contribution).sum());
            for s in &mut signals {
                s.contribution = round6(s.contribution);
            }
            (score, pair, signals)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.func_pair_id.cmp(&b.1.func_pair_id))
    });

    scored
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(idx, (score, pair, top_signals))| RankedCandidate {
            func_pair_id: pair.func_pair_id,
            rank: idx + 1,
            score,
            top_signals,
        })
        .collect()
}

fn signal(name: &str, value: f64, weight: f64, scaled: f64) -> Signal {
    Signal {
        signal: name.to_string(),
        value: round6(value),
        weight,
        contribution: weight * scaled,
    }
}
