//! Pipeline stages.
//!
//! Each stage owns `artifacts/<stage>/`, recreating it on entry, and
//! publishes its outputs through the [`ArtifactStore`].

pub mod analyze;
pub mod decompile;
pub mod diff;
pub mod ingest;
pub mod normalize;
pub mod rank;
pub mod report;
pub mod validate;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde_json::Value;

use crate::artifacts::{read_json, ArtifactStore};
use crate::config::PipelineConfig;
use crate::job::JobLayout;
use crate::model::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Ingest,
    Normalize,
    Diff,
    Rank,
    Decompile,
    Analyze,
    Validate,
    Report,
}

impl Stage {
    /// Fixed execution order for a full run.
    pub const ORDER: [Stage; 8] = [
        Stage::Ingest,
        Stage::Normalize,
        Stage::Diff,
        Stage::Rank,
        Stage::Decompile,
        Stage::Analyze,
        Stage::Validate,
        Stage::Report,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Normalize => "normalize",
            Stage::Diff => "diff",
            Stage::Rank => "rank",
            Stage::Decompile => "decompile",
            Stage::Analyze => "analyze",
            Stage::Validate => "validate",
            Stage::Report => "report",
        }
    }

    /// Directory under `artifacts/` owned by this stage.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Stage::Analyze => "analysis",
            Stage::Validate => "validation",
            other => other.name(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ORDER
            .into_iter()
            .find(|stage| stage.name() == s || stage.dir_name() == s)
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

/// Everything a post-ingest stage needs.
#[derive(Debug)]
pub struct StageContext<'a> {
    pub layout: &'a JobLayout,
    pub config: &'a PipelineConfig,
    pub job: Job,
    pub store: ArtifactStore,
}

impl<'a> StageContext<'a> {
    pub fn new(layout: &'a JobLayout, config: &'a PipelineConfig, job: Job) -> Self {
        Self { layout, config, job, store: ArtifactStore::new(layout.clone()) }
    }

    /// A file inside another stage's directory.
    pub fn upstream_file(&self, stage: Stage, name: &str) -> PathBuf {
        self.layout.stage_dir(stage).join(name)
    }

    /// Read an upstream JSON file, treating absent or unparsable files as missing.
    pub fn read_upstream(&self, stage: Stage, name: &str) -> Option<Value> {
        read_json(&self.upstream_file(stage, name))
    }

    /// Read an upstream JSON array; anything else becomes an empty list.
    pub fn read_upstream_list(&self, stage: Stage, name: &str) -> Vec<Value> {
        match self.read_upstream(stage, name) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                tracing::warn!(stage = %stage, file = name, "expected a JSON list; treating as empty");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Payload hashes of upstream envelopes that exist.
    pub fn upstream_hashes(&self, envelopes: &[(Stage, &str)]) -> Vec<String> {
        let paths: Vec<PathBuf> =
            envelopes.iter().map(|(stage, name)| self.upstream_file(*stage, name)).collect();
        self.store.upstream_hashes(paths.iter().map(|p| p.as_path()))
    }
}
