use patchdiff_core::config::RankingWeights;
use patchdiff_core::ranking::rank_candidates;
use serde_json::{json, Value};

fn example_weights() -> RankingWeights {
    RankingWeights { severity_hint: 0.7, match_score: 0.2, evidence: 0.1 }
}

fn example_pairs() -> Vec<Value> {
    vec![
        json!({"func_pair_id": "fp1", "match_score": 1.0, "evidence": ["e1"]}),
        json!({"func_pair_id": "fp2", "match_score": 0.5, "evidence": ["e1", "e2"]}),
    ]
}

fn example_diffs() -> Vec<Value> {
    vec![
        json!({"func_pair_id": "fp1", "severity_hint": 0.1}),
        json!({"func_pair_id": "fp2", "severity_hint": 0.9}),
    ]
}

#[test]
fn weighted_example_scores_and_orders() {
    let ranked = rank_candidates(&example_pairs(), &example_diffs(), &example_weights(), 30);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].func_pair_id, "fp2");
    assert_eq!(ranked[0].rank, 1);
    assert!((ranked[0].score - 0.77).abs() < 1e-9, "fp2 score {}", ranked[0].score);
    assert_eq!(ranked[1].func_pair_id, "fp1");
    assert_eq!(ranked[1].rank, 2);
    assert!((ranked[1].score - 0.29).abs() < 1e-9, "fp1 score {}", ranked[1].score);
}

#[test]
fn top_signals_carry_raw_values_and_weights() {
    let ranked = rank_candidates(&example_pairs(), &example_diffs(), &example_weights(), 30);
    let fp2 = &ranked[0];
    let names: Vec<&str> = fp2.top_signals.iter().map(|s| s.signal.as_str()).collect();
    assert_eq!(names, ["severity_hint", "match_score", "evidence"]);
    assert_eq!(fp2.top_signals[0].value, 0.9);
    assert_eq!(fp2.top_signals[0].weight, 0.7);
    assert_eq!(fp2.top_signals[2].value, 2.0);
    assert!((fp2.top_signals[2].contribution - 0.04).abs() < 1e-9);
}

#[test]
fn ranking_is_independent_of_input_order() {
    let weights = RankingWeights::default();
    let pairs: Vec<Value> = (0..6)
        .map(|i| json!({"func_pair_id": format!("fp{i}"), "match_score": 1.0, "evidence": []}))
        .collect();
    let diffs: Vec<Value> = (0..6)
        .map(|i| {
            let severity = if i % 2 == 0 { 0.5 } else { 0.2 };
            json!({"func_pair_id": format!("fp{i}"), "severity_hint": severity})
        })
        .collect();

    let forward = rank_candidates(&pairs, &diffs, &weights, 30);
    let mut rev_pairs = pairs.clone();
    rev_pairs.reverse();
    let mut rev_diffs = diffs.clone();
    rev_diffs.reverse();
    let backward = rank_candidates(&rev_pairs, &rev_diffs, &weights, 30);

    assert_eq!(forward, backward);
    let ids: Vec<&str> = forward.iter().map(|c| c.func_pair_id.as_str()).collect();
    assert_eq!(ids, ["fp0", "fp2", "fp4", "fp1", "fp3", "fp5"]);
}

#[test]
fn truncates_to_top_n_before_numbering() {
    let pairs: Vec<Value> = (0..5)
        .map(|i| json!({"func_pair_id": format!("fp{i}"), "match_score": i as f64 / 10.0}))
        .collect();
    let ranked = rank_candidates(&pairs, &[], &RankingWeights::default(), 2);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].func_pair_id, "fp4");
    assert_eq!(ranked.iter().map(|c| c.rank).collect::<Vec<_>>(), [1, 2]);
}

#[test]
fn malformed_entries_are_skipped() {
    let pairs = vec![
        json!("not an object"),
        json!({"match_score": 1.0}),
        json!({"func_pair_id": "", "match_score": 1.0}),
        json!({"func_pair_id": "bad_score", "match_score": "high"}),
        json!({"func_pair_id": "string_score", "match_score": "0.5"}),
        json!({"func_pair_id": "no_score"}),
    ];
    let diffs = vec![
        json!({"func_pair_id": "no_score", "severity_hint": "bogus"}),
        json!(42),
    ];
    let ranked = rank_candidates(&pairs, &diffs, &RankingWeights::default(), 30);
    let ids: Vec<&str> = ranked.iter().map(|c| c.func_pair_id.as_str()).collect();
    assert_eq!(ids, ["string_score", "no_score"]);
    assert!((ranked[0].score - 0.15).abs() < 1e-9);
    assert_eq!(ranked[1].score, 0.0);
}

#[test]
fn later_duplicate_diff_wins_and_evidence_is_capped() {
    let pairs = vec![json!({
        "func_pair_id": "fp",
        "match_score": 0.0,
        "evidence": ["1", "2", "3", "4", "5", "6", "7"],
    })];
    let diffs = vec![
        json!({"func_pair_id": "fp", "severity_hint": 1.0}),
        json!({"func_pair_id": "fp", "severity_hint": 0.5}),
    ];
    let ranked = rank_candidates(&pairs, &diffs, &RankingWeights::default(), 30);
    // 0.6 * 0.5 + 0.1 * min(7, 5) / 5
    assert!((ranked[0].score - 0.4).abs() < 1e-9, "score {}", ranked[0].score);
    assert_eq!(ranked[0].top_signals[2].value, 7.0);
}

#[test]
fn tied_scores_are_ordered_by_pair_id() {
    let pairs = vec![
        json!({"func_pair_id": "fp_zeta", "match_score": 0.8, "evidence": ["e"]}),
        json!({"func_pair_id": "fp_alpha", "match_score": 0.8, "evidence": ["e"]}),
        json!({"func_pair_id": "fp_mid", "match_score": 0.8, "evidence": ["e"]}),
    ];
    let ranked = rank_candidates(&pairs, &[], &RankingWeights::default(), 30);
    let ids: Vec<&str> = ranked.iter().map(|c| c.func_pair_id.as_str()).collect();
    assert_eq!(ids, ["fp_alpha", "fp_mid", "fp_zeta"]);
    assert!(ranked.windows(2).all(|w| w[0].score == w[1].score));
    assert_eq!(ranked.iter().map(|c| c.rank).collect::<Vec<_>>(), [1, 2, 3]);
}
