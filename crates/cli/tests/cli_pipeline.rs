use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

/// Minimal little-endian ELF64 x86-64 header with no section table,
/// padded so the two inputs hash differently.
fn elf_file(path: &Path, padding: usize) {
    let mut bytes = vec![0u8; 64 + padding];
    bytes[..4].copy_from_slice(b"\x7fELF");
    bytes[4] = 2;
    bytes[5] = 1;
    bytes[6] = 1;
    bytes[18..20].copy_from_slice(&0x3eu16.to_le_bytes());
    fs::write(path, bytes).expect("write elf");
}

struct Fixture {
    dir: TempDir,
    a: PathBuf,
    b: PathBuf,
    job: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        elf_file(&a, 0);
        elf_file(&b, 16);
        fs::write(
            dir.path().join("nm_a.txt"),
            "0000000000001000 0000000000000040 T parse_header\n0000000000001040 0000000000000010 T helper\n",
        )
        .expect("nm a");
        fs::write(
            dir.path().join("nm_b.txt"),
            "0000000000001000 0000000000000080 T parse_header\n0000000000001080 0000000000000010 T helper\n",
        )
        .expect("nm b");
        let job = dir.path().join("job");
        Self { dir, a, b, job }
    }

    /// The binary with the environment pinned to this fixture.
    fn cmd(&self) -> Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("patchdiff");
        cmd.env("HOME", self.dir.path())
            .env("PATCHDIFF_NM_FAKE_A", self.dir.path().join("nm_a.txt"))
            .env("PATCHDIFF_NM_FAKE_B", self.dir.path().join("nm_b.txt"))
            .env_remove("PATCHDIFF_CONFIG")
            .env_remove("PATCHDIFF_OFFLINE")
            .env_remove("PATCHDIFF_NM")
            .env_remove("PATCHDIFF_LOG_LEVEL")
            .env_remove("GHIDRA_ANALYZE_HEADLESS")
            .env_remove("GHIDRA_INSTALL_DIR");
        cmd
    }

    fn run_args(&self) -> Vec<String> {
        vec![
            "run".to_string(),
            "--a".to_string(),
            self.a.display().to_string(),
            "--b".to_string(),
            self.b.display().to_string(),
            "--out".to_string(),
            self.job.display().to_string(),
        ]
    }

    fn read_json(&self, name: &str) -> Value {
        let text = fs::read_to_string(self.job.join(name)).expect("read json");
        serde_json::from_str(&text).expect("parse json")
    }
}

#[test]
fn help_and_version_exit_zero() {
    let fx = Fixture::new();
    fx.cmd().arg("--help").assert().success().stdout(predicate::str::contains("verify"));
    fx.cmd().arg("--version").assert().success();
}

#[test]
fn unparsable_arguments_exit_10() {
    let fx = Fixture::new();
    fx.cmd().arg("frobnicate").assert().code(10);
    fx.cmd().args(["rank", "--job"]).assert().code(10);
    fx.cmd().args(["report", "--job", "x", "--format", "pdf"]).assert().code(10);
}

#[test]
fn full_run_writes_report_index_and_audit() {
    let fx = Fixture::new();
    fx.cmd()
        .args(fx.run_args())
        .args(["--format", "json", "--max-rounds", "2", "--tag", "e2e"])
        .assert()
        .success()
        .stdout(predicate::str::contains("job_id: "))
        .stdout(predicate::str::contains("[diff] 2 function pair(s)"))
        .stdout(predicate::str::contains("artifacts/report/report.artifact.json (report.summary)"));

    let report = fx.read_json("report.json");
    assert_eq!(report["tag"], "e2e");
    let ids: Vec<&str> = report["candidates"]
        .as_array()
        .expect("candidates")
        .iter()
        .map(|c| c["func_pair_id"].as_str().expect("id"))
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"fp_parse_header") && ids.contains(&"fp_helper"), "{ids:?}");
    assert!(!fx.job.join("report.md").exists());

    let index = fx.read_json("artifact_index.json");
    let types: Vec<&str> = index
        .as_array()
        .expect("index")
        .iter()
        .map(|e| e["artifact_type"].as_str().expect("type"))
        .collect();
    assert_eq!(types.first(), Some(&"ingest.job"));
    assert_eq!(types.last(), Some(&"report.summary"));

    let audit = fs::read_to_string(fx.job.join("audit.jsonl")).expect("audit");
    let lines: Vec<Value> =
        audit.lines().map(|l| serde_json::from_str(l).expect("audit line")).collect();
    assert_eq!(lines.len(), 16);
    assert!(lines.iter().all(|l| l["event"] != "error"));
    assert_eq!(lines[0]["stage"], "ingest");
    assert_eq!(lines[15]["stage"], "report");
    assert_eq!(lines[15]["event"], "success");
    assert!(!fx.job.join(".patchdiff.lock").exists());

    fx.cmd()
        .args(["verify", "--job"])
        .arg(&fx.job)
        .assert()
        .success()
        .stdout(predicate::str::contains("all artifacts verified"));
}

#[test]
fn stages_run_one_at_a_time() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["ingest", "--a"])
        .arg(&fx.a)
        .arg("--b")
        .arg(&fx.b)
        .arg("--out")
        .arg(&fx.job)
        .assert()
        .success()
        .stdout(predicate::str::contains("job_dir: "));
    assert!(fx.job.join("job.json").is_file());

    for stage in ["normalize", "diff", "rank", "decompile", "analyze", "validate"] {
        fx.cmd().args([stage, "--job"]).arg(&fx.job).assert().success();
    }
    fx.cmd()
        .args(["report", "--job"])
        .arg(&fx.job)
        .assert()
        .success()
        .stdout(predicate::str::contains("[report] report written to"));
    let markdown = fs::read_to_string(fx.job.join("report.md")).expect("report.md");
    assert!(markdown.contains("fp_parse_header"));
}

#[test]
fn missing_inputs_exit_20() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["ingest", "--a", "/nonexistent/a.bin", "--b"])
        .arg(&fx.b)
        .arg("--out")
        .arg(&fx.job)
        .assert()
        .code(20)
        .stderr(predicate::str::contains("error:"));

    fx.cmd().args(["rank", "--job"]).arg(&fx.job).assert().code(20);
    fx.cmd().args(["verify", "--job"]).arg(fx.dir.path().join("nowhere")).assert().code(20);
}

#[test]
fn held_lock_exits_90() {
    let fx = Fixture::new();
    fs::create_dir_all(&fx.job).expect("job dir");
    fs::write(fx.job.join(".patchdiff.lock"), "{\"pid\":1}\n").expect("lock");
    fx.cmd().args(fx.run_args()).assert().code(90);
    assert!(fx.job.join(".patchdiff.lock").exists());
}

#[test]
fn invalid_config_exits_10() {
    let fx = Fixture::new();
    let config = fx.dir.path().join("config.yaml");
    fs::write(&config, "ranking:\n  top_n: 0\n").expect("config");
    fx.cmd()
        .arg("--config")
        .arg(&config)
        .args(fx.run_args())
        .assert()
        .code(10)
        .stderr(predicate::str::contains("ranking.top_n"));

    fx.cmd()
        .env("PATCHDIFF_CONFIG", fx.dir.path().join("missing.yaml"))
        .args(fx.run_args())
        .assert()
        .code(10);
}

#[test]
fn verify_reports_tampering_with_exit_70() {
    let fx = Fixture::new();
    fx.cmd().args(fx.run_args()).assert().success();

    let path = fx.job.join("artifacts/rank/ranked_candidates.artifact.json");
    let mut envelope: Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
    envelope["payload"]["candidates"] = Value::Array(Vec::new());
    fs::write(&path, serde_json::to_string_pretty(&envelope).expect("ser")).expect("tamper");

    fx.cmd()
        .args(["verify", "--json", "--job"])
        .arg(&fx.job)
        .assert()
        .code(70)
        .stdout(predicate::str::contains("payload_sha256 mismatch"));
}
