use patchdiff_core::hashing::{canonical_json, sha256_bytes, sha256_file, sha256_json};
use patchdiff_core::version;
use serde_json::json;
use tempfile::tempdir;

#[test]
fn version_is_non_empty() {
    assert!(!version().is_empty());
}

#[test]
fn sha256_bytes_matches_known_digest() {
    assert_eq!(
        sha256_bytes(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn sha256_file_matches_bytes_hash() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("blob.bin");
    std::fs::write(&path, b"patchdiff").expect("write blob");
    assert_eq!(sha256_file(&path).expect("hash file"), sha256_bytes(b"patchdiff"));
}

#[test]
fn sha256_file_reports_missing_path() {
    let temp = tempdir().expect("tempdir");
    let err = sha256_file(&temp.path().join("nope")).unwrap_err();
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn canonical_json_sorts_keys_at_every_depth() {
    let value = json!({"b": 1, "a": {"z": [3, {"y": true, "x": null}], "c": "s"}});
    assert_eq!(canonical_json(&value), r#"{"a":{"c":"s","z":[3,{"x":null,"y":true}]},"b":1}"#);
}

#[test]
fn payload_hash_ignores_key_insertion_order() {
    let first: serde_json::Value =
        serde_json::from_str(r#"{"job_id":"j","candidates":[{"rank":1,"id":"fp1"}],"top_n":30}"#)
            .expect("parse first");
    let second: serde_json::Value =
        serde_json::from_str(r#"{"top_n":30,"candidates":[{"id":"fp1","rank":1}],"job_id":"j"}"#)
            .expect("parse second");
    assert_eq!(sha256_json(&first), sha256_json(&second));
}

#[test]
fn payload_hash_changes_with_content() {
    assert_ne!(sha256_json(&json!({"a": 1})), sha256_json(&json!({"a": 2})));
    assert_ne!(sha256_json(&json!([1, 2])), sha256_json(&json!([2, 1])));
}
