//! Pipeline configuration.
//!
//! The resolved [`PipelineConfig`] is built once at startup and passed by
//! reference to every stage. A frozen copy is also stored in `job.json`.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{PatchdiffError, PatchdiffResult};

/// Path to a YAML config file, used when `--config` is not given.
pub const ENV_CONFIG_PATH: &str = "PATCHDIFF_CONFIG";
/// When truthy, forces the local (offline) analysis provider.
pub const ENV_OFFLINE: &str = "PATCHDIFF_OFFLINE";

/// Declare a closed, string-named enum with serde and `FromStr` support.
macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text $(, alias = $alias)*)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text $(| $alias)* => Ok($name::$variant),)+
                    other => Err(format!(
                        "unknown {} '{}' (expected one of: {})",
                        stringify!($name),
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }
    };
}

named_enum!(
    /// Function-matching backend for the diff stage.
    DiffBackendKind {
        Symbols => "symbols" | "diaphora" | "nm",
        Rizin => "rizin",
    }
);

named_enum!(
    /// Decompiler backend.
    DecompileBackendKind {
        Ghidra => "ghidra",
        Rizin => "rizin",
    }
);

named_enum!(
    /// Analysis provider.
    ProviderKind {
        Local => "local",
        Command => "command",
    }
);

named_enum!(
    ReportFormat {
        Markdown => "markdown" | "md",
        Json => "json",
    }
);

named_enum!(
    StorageKind {
        Filesystem => "filesystem",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    pub root: PathBuf,
    /// Copy each ingested binary into the object store under its hash.
    pub archive_inputs: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { kind: StorageKind::Filesystem, root: default_home(), archive_inputs: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendsConfig {
    pub diff: DiffBackendKind,
    pub decompile: DecompileBackendKind,
    /// Per-invocation timeout for external tools.
    pub timeout_secs: u64,
    /// How many ranked candidates to decompile; all of them when unset.
    pub decompile_top: Option<usize>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            diff: DiffBackendKind::Symbols,
            decompile: DecompileBackendKind::Ghidra,
            timeout_secs: 300,
            decompile_top: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankingWeights {
    pub severity_hint: f64,
    pub match_score: f64,
    pub evidence: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self { severity_hint: 0.6, match_score: 0.3, evidence: 0.1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankingConfig {
    pub top_n: usize,
    pub weights: RankingWeights,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self { top_n: 30, weights: RankingWeights::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub max_rounds: u32,
    /// Program and arguments for the `command` provider.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            model: "llama3".to_string(),
            max_rounds: 1,
            command: Vec::new(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { format: ReportFormat::Markdown }
    }
}

/// Fully resolved pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub backends: BackendsConfig,
    pub ranking: RankingConfig,
    pub llm: LlmConfig,
    pub report: ReportConfig,
}

impl PipelineConfig {
    /// Resolve and load configuration.
    ///
    /// Precedence: `explicit`, then `$PATCHDIFF_CONFIG`, then
    /// `~/.patchdiff/config.yaml`. An explicitly named file must exist; the
    /// default location may be absent, in which case built-in defaults apply.
    pub fn load(explicit: Option<&Path>) -> PatchdiffResult<Self> {
        let named = explicit.map(Path::to_path_buf).or_else(|| {
            env::var_os(ENV_CONFIG_PATH).filter(|v| !v.is_empty()).map(PathBuf::from)
        });

        let mut config = match named {
            Some(path) => {
                if !path.is_file() {
                    return Err(PatchdiffError::Config {
                        message: format!("config file not found: {}", path.display()),
                        details: json!({ "path": path.display().to_string() }),
                    });
                }
                Self::from_file(&path)?
            }
            None => {
                let default_path = default_home().join("config.yaml");
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_offline(offline_from_env());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> PatchdiffResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| PatchdiffError::Config {
            message: format!("failed to read config {}: {e}", path.display()),
            details: json!({ "path": path.display().to_string() }),
        })?;
        Self::from_yaml_str(&text).map_err(|err| match err {
            PatchdiffError::Config { message, details } => PatchdiffError::Config {
                message: format!("{} ({message})", path.display()),
                details,
            },
            other => other,
        })
    }

    /// Parse YAML and merge it over the defaults. Empty documents yield defaults.
    pub fn from_yaml_str(text: &str) -> PatchdiffResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str::<Self>(text).map_err(|e| PatchdiffError::Config {
            message: format!("invalid config: {e}"),
            details: json!({ "error": e.to_string() }),
        })
    }

    /// Force the local provider when running offline.
    pub fn apply_offline(&mut self, offline: bool) {
        if offline && self.llm.provider != ProviderKind::Local {
            tracing::info!(from = %self.llm.provider, "offline mode: forcing local analysis provider");
            self.llm.provider = ProviderKind::Local;
        }
    }

    /// Check value ranges that the type system does not capture.
    pub fn validate(&self) -> PatchdiffResult<()> {
        let mut problems = Vec::new();
        if self.ranking.top_n == 0 {
            problems.push("ranking.top_n must be at least 1".to_string());
        }
        let w = &self.ranking.weights;
        for (name, value) in
            [("severity_hint", w.severity_hint), ("match_score", w.match_score), ("evidence", w.evidence)]
        {
            if !value.is_finite() || value < 0.0 {
                problems.push(format!("ranking.weights.{name} must be a non-negative number"));
            }
        }
        if self.backends.timeout_secs == 0 {
            problems.push("backends.timeout_secs must be at least 1".to_string());
        }
        if self.llm.max_rounds == 0 {
            problems.push("llm.max_rounds must be at least 1".to_string());
        }
        if self.llm.provider == ProviderKind::Command && self.llm.command.is_empty() {
            problems.push("llm.command is required when llm.provider is 'command'".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PatchdiffError::Config {
                message: format!("invalid config: {}", problems.join("; ")),
                details: json!({ "problems": problems }),
            })
        }
    }
}

/// Per-invocation overrides from command-line flags; `None` keeps the loaded value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub diff_backend: Option<DiffBackendKind>,
    pub decompile_backend: Option<DecompileBackendKind>,
    pub timeout_secs: Option<u64>,
    pub top_n: Option<usize>,
    pub decompile_top: Option<usize>,
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub max_rounds: Option<u32>,
    pub report_format: Option<ReportFormat>,
}

impl ConfigOverrides {
    /// Apply the overrides, re-running offline forcing and validation.
    pub fn apply(self, config: &mut PipelineConfig) -> PatchdiffResult<()> {
        if let Some(kind) = self.diff_backend {
            config.backends.diff = kind;
        }
        if let Some(kind) = self.decompile_backend {
            config.backends.decompile = kind;
        }
        if let Some(secs) = self.timeout_secs {
            config.backends.timeout_secs = secs;
        }
        if let Some(top) = self.top_n {
            config.ranking.top_n = top;
        }
        if let Some(top) = self.decompile_top {
            config.backends.decompile_top = Some(top);
        }
        if let Some(provider) = self.provider {
            config.llm.provider = provider;
        }
        if let Some(model) = self.model {
            config.llm.model = model;
        }
        if let Some(rounds) = self.max_rounds {
            config.llm.max_rounds = rounds;
        }
        if let Some(format) = self.report_format {
            config.report.format = format;
        }
        config.apply_offline(offline_from_env());
        config.validate()
    }
}

/// `~/.patchdiff`, falling back to a relative `.patchdiff` without a home directory.
pub fn default_home() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".patchdiff")
}

fn offline_from_env() -> bool {
    env::var(ENV_OFFLINE)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
