use serde_json::Value;

use crate::config::{LlmConfig, ProviderKind};
use crate::services::backends::{command::CommandProvider, local::LocalProvider};
use crate::services::BackendError;

/// Bug classes the validator recognizes.
pub const KNOWN_BUG_CLASSES: &[&str] = &[
    "bounds-check-hardening",
    "integer-overflow-fix",
    "null-check-added",
    "use-after-free-fix",
    "input-validation",
    "race-condition-fix",
    "logic-fix",
    "unknown",
];

/// One provider invocation for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    pub packet: &'a Value,
    /// 1-based round number.
    pub round: u32,
    /// Last valid output from an earlier round, if any.
    pub previous: Option<&'a Value>,
    pub model: &'a str,
}

/// Trait implemented by analysis providers. Output is raw JSON; the caller
/// validates it against the provider output schema.
pub trait AnalysisProvider {
    fn analyze(&self, request: &ProviderRequest<'_>) -> Result<Value, BackendError>;
    fn name(&self) -> &'static str;
}

pub fn analysis_provider(config: &LlmConfig) -> Box<dyn AnalysisProvider> {
    match config.provider {
        ProviderKind::Local => Box::new(LocalProvider),
        ProviderKind::Command => {
            Box::new(CommandProvider::new(config.command.clone(), config.timeout_secs))
        }
    }
}
