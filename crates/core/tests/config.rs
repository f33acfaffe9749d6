use std::fs;

use patchdiff_core::config::{
    ConfigOverrides, DecompileBackendKind, DiffBackendKind, PipelineConfig, ProviderKind,
    ReportFormat,
};
use tempfile::tempdir;

#[test]
fn defaults_are_valid() {
    let config = PipelineConfig::default();
    assert_eq!(config.backends.diff, DiffBackendKind::Symbols);
    assert_eq!(config.backends.decompile, DecompileBackendKind::Ghidra);
    assert_eq!(config.ranking.top_n, 30);
    assert_eq!(config.llm.provider, ProviderKind::Local);
    assert_eq!(config.llm.max_rounds, 1);
    assert_eq!(config.report.format, ReportFormat::Markdown);
    assert!(config.validate().is_ok());
}

#[test]
fn yaml_merges_over_defaults() {
    let config = PipelineConfig::from_yaml_str(
        "ranking:\n  top_n: 5\n  weights:\n    severity_hint: 0.7\nllm:\n  max_rounds: 3\nreport:\n  format: json\n",
    )
    .expect("parse");
    assert_eq!(config.ranking.top_n, 5);
    assert_eq!(config.ranking.weights.severity_hint, 0.7);
    assert_eq!(config.ranking.weights.match_score, 0.3);
    assert_eq!(config.llm.max_rounds, 3);
    assert_eq!(config.llm.model, "llama3");
    assert_eq!(config.report.format, ReportFormat::Json);
    assert_eq!(config.backends.timeout_secs, 300);
}

#[test]
fn empty_document_yields_defaults() {
    assert_eq!(PipelineConfig::from_yaml_str("  \n").expect("parse"), PipelineConfig::default());
}

#[test]
fn backend_aliases_are_accepted() {
    let config =
        PipelineConfig::from_yaml_str("backends:\n  diff: diaphora\n  decompile: rizin\n").expect("parse");
    assert_eq!(config.backends.diff, DiffBackendKind::Symbols);
    assert_eq!(config.backends.decompile, DecompileBackendKind::Rizin);
    assert_eq!("MD".parse::<ReportFormat>(), Ok(ReportFormat::Markdown));
}

#[test]
fn unknown_keys_and_values_are_config_errors() {
    let err = PipelineConfig::from_yaml_str("ranking:\n  topn: 5\n").unwrap_err();
    assert_eq!(err.exit_code(), 10);
    assert!(err.to_string().contains("topn"), "{err}");

    let err = PipelineConfig::from_yaml_str("backends:\n  diff: bindiff\n").unwrap_err();
    assert_eq!(err.exit_code(), 10);

    let parse = "bindiff".parse::<DiffBackendKind>().unwrap_err();
    assert!(parse.contains("expected one of: symbols, rizin"), "{parse}");
}

#[test]
fn validate_collects_every_problem() {
    let mut config = PipelineConfig::default();
    config.ranking.top_n = 0;
    config.ranking.weights.evidence = -1.0;
    config.llm.max_rounds = 0;
    config.llm.provider = ProviderKind::Command;

    let err = config.validate().unwrap_err();
    assert_eq!(err.exit_code(), 10);
    let problems = err.details().expect("details")["problems"].as_array().expect("list").len();
    assert_eq!(problems, 4);
}

#[test]
fn explicit_file_must_exist() {
    let temp = tempdir().expect("tempdir");
    let err = PipelineConfig::load(Some(&temp.path().join("missing.yaml"))).unwrap_err();
    assert_eq!(err.exit_code(), 10);
    assert!(err.to_string().contains("config file not found"));
}

#[test]
fn explicit_file_is_loaded_and_validated() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("config.yaml");
    fs::write(&path, "ranking:\n  top_n: 7\n").expect("write");
    assert_eq!(PipelineConfig::load(Some(&path)).expect("load").ranking.top_n, 7);

    fs::write(&path, "ranking:\n  top_n: 0\n").expect("write");
    let err = PipelineConfig::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("ranking.top_n"), "{err}");
}

#[test]
fn overrides_replace_only_given_fields() {
    let mut config = PipelineConfig::default();
    ConfigOverrides {
        diff_backend: Some(DiffBackendKind::Rizin),
        top_n: Some(3),
        decompile_top: Some(2),
        report_format: Some(ReportFormat::Json),
        ..Default::default()
    }
    .apply(&mut config)
    .expect("apply");

    assert_eq!(config.backends.diff, DiffBackendKind::Rizin);
    assert_eq!(config.backends.decompile, DecompileBackendKind::Ghidra);
    assert_eq!(config.ranking.top_n, 3);
    assert_eq!(config.backends.decompile_top, Some(2));
    assert_eq!(config.report.format, ReportFormat::Json);
    assert_eq!(config.llm.max_rounds, 1);
}

#[test]
fn invalid_override_is_rejected() {
    let mut config = PipelineConfig::default();
    let err = ConfigOverrides { max_rounds: Some(0), ..Default::default() }
        .apply(&mut config)
        .unwrap_err();
    assert_eq!(err.exit_code(), 10);
}

#[test]
fn offline_mode_forces_local_provider() {
    let mut config = PipelineConfig::default();
    config.llm.provider = ProviderKind::Command;
    config.llm.command = vec!["my-llm".to_string()];
    config.apply_offline(false);
    assert_eq!(config.llm.provider, ProviderKind::Command);
    config.apply_offline(true);
    assert_eq!(config.llm.provider, ProviderKind::Local);
}
