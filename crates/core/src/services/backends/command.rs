use serde_json::{json, Value};

use crate::services::analysis::{AnalysisProvider, ProviderRequest};
use crate::services::backends::run_tool;
use crate::services::BackendError;
use crate::subprocess::CommandSpec;

/// Provider that runs a configured program per round.
///
/// The program receives `{packet, round, previous, model}` as JSON on stdin
/// and must print one JSON object on stdout.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    argv: Vec<String>,
    timeout_secs: u64,
}

impl CommandProvider {
    pub fn new(argv: Vec<String>, timeout_secs: u64) -> Self {
        Self { argv, timeout_secs }
    }
}

impl AnalysisProvider for CommandProvider {
    fn analyze(&self, request: &ProviderRequest<'_>) -> Result<Value, BackendError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(BackendError::Unavailable("llm.command is empty".to_string()));
        };
        let input = json!({
            "packet": request.packet,
            "round": request.round,
            "previous": request.previous,
            "model": request.model,
        });
        let spec = CommandSpec::new(program)
            .args(args)
            .stdin(input.to_string())
            .timeout_secs(self.timeout_secs);
        let stdout = run_tool(program, &spec)?;
        serde_json::from_str(stdout.trim())
            .map_err(|e| BackendError::Failed(format!("provider printed invalid JSON: {e}")))
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
