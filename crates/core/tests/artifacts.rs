use std::fs;

use patchdiff_core::artifacts::{
    read_index, verify_job, ArtifactEnvelope, ArtifactInputs, ArtifactStore, PayloadSchema,
    SchemaKind,
};
use patchdiff_core::hashing::sha256_json;
use patchdiff_core::job::JobLayout;
use serde_json::{json, Value};
use tempfile::tempdir;

fn inputs() -> ArtifactInputs {
    ArtifactInputs {
        binary_a_sha256: "a".repeat(64),
        binary_b_sha256: "b".repeat(64),
        upstream_artifact_hashes: Vec::new(),
    }
}

fn pair(id: &str) -> Value {
    json!({
        "func_pair_id": id,
        "func_id_a": format!("{id}_a"),
        "func_id_b": format!("{id}_b"),
        "match_score": 0.9,
        "status": "matched",
        "evidence": ["symbol_name=parse_header"]
    })
}

fn read_envelope(path: &std::path::Path) -> ArtifactEnvelope {
    let text = fs::read_to_string(path).expect("read envelope");
    serde_json::from_str(&text).expect("parse envelope")
}

#[test]
fn write_hashes_payload_and_appends_index_entry() {
    let temp = tempdir().expect("tempdir");
    let layout = JobLayout::new(temp.path());
    let store = ArtifactStore::new(layout.clone());
    let dir = layout.artifacts_dir.join("diff");
    let payload = json!([pair("fp1"), pair("fp2")]);

    let entry = store
        .publish(
            &dir,
            "function_pairs",
            "diff.function_pairs",
            inputs().with_upstream(["c".repeat(64)]),
            &payload,
            Some(PayloadSchema::ListOf(SchemaKind::FunctionPair)),
        )
        .expect("publish");

    assert_eq!(entry.path, "artifacts/diff/function_pairs.artifact.json");
    assert_eq!(entry.payload_sha256, sha256_json(&payload));

    let envelope = read_envelope(&dir.join("function_pairs.artifact.json"));
    assert_eq!(envelope.artifact_type, "diff.function_pairs");
    assert_eq!(envelope.payload, payload);
    assert_eq!(envelope.payload_sha256, entry.payload_sha256);
    assert_eq!(envelope.inputs.upstream_artifact_hashes, vec!["c".repeat(64)]);
    assert!(SchemaKind::Envelope.check(&serde_json::to_value(&envelope).expect("value")).is_ok());

    let plain: Value =
        serde_json::from_str(&fs::read_to_string(dir.join("function_pairs.json")).expect("plain"))
            .expect("parse plain");
    assert_eq!(plain, payload);

    let index = read_index(&layout.index_path).expect("index");
    assert_eq!(index, vec![entry]);
}

#[test]
fn schema_failure_writes_nothing() {
    let temp = tempdir().expect("tempdir");
    let layout = JobLayout::new(temp.path());
    let store = ArtifactStore::new(layout.clone());
    let path = layout.artifacts_dir.join("diff/diff_results.artifact.json");
    let bad = json!([{ "func_pair_id": "fp1", "change_summary": {}, "severity_hint": 3.5 }]);

    let err = store
        .write(
            &path,
            "diff.diff_results",
            inputs(),
            &bad,
            Some(PayloadSchema::ListOf(SchemaKind::DiffResult)),
        )
        .unwrap_err();
    assert_eq!(err.exit_code(), 70);
    let details = err.details().expect("details");
    let errors = details["errors"].as_array().expect("errors list");
    assert!(errors[0].as_str().expect("message").starts_with("[0]"), "{errors:?}");

    assert!(!path.exists());
    assert!(read_index(&layout.index_path).expect("index").is_empty());
}

#[test]
fn list_schema_rejects_non_array_payload() {
    let err = PayloadSchema::ListOf(SchemaKind::FunctionPair).check(&pair("fp1")).unwrap_err();
    assert_eq!(err.len(), 1);
    assert!(err[0].contains("must be a list"));
    assert!(PayloadSchema::ListOf(SchemaKind::FunctionPair).check(&json!([])).is_ok());
}

#[test]
fn every_embedded_schema_compiles() {
    for kind in SchemaKind::ALL {
        if let Err(errors) = kind.check(&json!({})) {
            assert!(
                !errors.iter().any(|e| e.contains("is unusable")),
                "{} failed to compile: {errors:?}",
                kind.file_name()
            );
        }
    }
}

#[test]
fn rewriting_an_artifact_keeps_history_in_the_index() {
    let temp = tempdir().expect("tempdir");
    let layout = JobLayout::new(temp.path());
    let store = ArtifactStore::new(layout.clone());
    let path = layout.artifacts_dir.join("rank/ranked_candidates.artifact.json");

    let first = store.write(&path, "rank.candidates", inputs(), &json!({ "n": 1 }), None).expect("first");
    let second =
        store.write(&path, "rank.candidates", inputs(), &json!({ "n": 2 }), None).expect("second");

    let index = read_index(&layout.index_path).expect("index");
    assert_eq!(index.len(), 2);
    assert_eq!(index[0], first);
    assert_eq!(index[1], second);
    assert_ne!(first.artifact_id, second.artifact_id);
    assert_eq!(store.upstream_hash(&path), Some(sha256_json(&json!({ "n": 2 }))));

    let report = verify_job(&layout).expect("verify");
    assert!(report.is_ok(), "{:?}", report.failures);
    assert_eq!(report.envelopes_checked, 1);
    assert_eq!(report.index_entries, 2);
}

#[test]
fn corrupt_index_refuses_to_append() {
    let temp = tempdir().expect("tempdir");
    let layout = JobLayout::new(temp.path());
    fs::write(&layout.index_path, "{ not json").expect("write index");
    let store = ArtifactStore::new(layout.clone());

    let path = layout.artifacts_dir.join("x.artifact.json");
    let err = store.write(&path, "test.corrupt", inputs(), &json!({}), None).unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert_eq!(fs::read_to_string(&layout.index_path).expect("index"), "{ not json");
    assert!(!path.exists(), "envelope written without an index entry");
}

#[test]
fn failed_index_write_removes_the_new_envelope() {
    let temp = tempdir().expect("tempdir");
    let layout = JobLayout::new(temp.path());
    fs::create_dir_all(temp.path().join("artifact_index.json.tmp")).expect("block temp file");
    let store = ArtifactStore::new(layout.clone());

    let path = layout.artifacts_dir.join("normalize/normalize_summary.artifact.json");
    let err =
        store.write(&path, "normalize.summary", inputs(), &json!({ "delta": 0 }), None).unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(!path.exists());
    assert!(!layout.index_path.exists());
}

#[test]
fn verify_detects_tampered_payload_and_unindexed_envelope() {
    let temp = tempdir().expect("tempdir");
    let layout = JobLayout::new(temp.path());
    let store = ArtifactStore::new(layout.clone());
    let path = layout.artifacts_dir.join("normalize/normalize_summary.artifact.json");
    store.write(&path, "normalize.summary", inputs(), &json!({ "delta": 1 }), None).expect("write");

    let mut envelope: Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
    envelope["payload"]["delta"] = json!(2);
    fs::write(&path, serde_json::to_string_pretty(&envelope).expect("ser")).expect("tamper");

    let stray = layout.artifacts_dir.join("stray.artifact.json");
    fs::copy(&path, &stray).expect("copy");

    let report = verify_job(&layout).expect("verify");
    assert_eq!(report.envelopes_checked, 2);
    let tampered: Vec<_> = report
        .failures
        .iter()
        .filter(|f| f.path == "artifacts/normalize/normalize_summary.artifact.json")
        .map(|f| f.reason.as_str())
        .collect();
    assert!(tampered.iter().any(|r| r.starts_with("payload_sha256 mismatch")), "{tampered:?}");
    assert!(tampered.iter().any(|r| r.contains("newest index entry")), "{tampered:?}");
    assert!(report
        .failures
        .iter()
        .any(|f| f.path == "artifacts/stray.artifact.json" && f.reason == "no index entry"));
}

#[test]
fn verify_on_empty_job_is_ok() {
    let temp = tempdir().expect("tempdir");
    let report = verify_job(&JobLayout::new(temp.path())).expect("verify");
    assert!(report.is_ok());
    assert_eq!(report.envelopes_checked, 0);
}
