//! Embedded JSON Schemas for envelopes and stage payloads.

use std::sync::OnceLock;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Envelope,
    Job,
    Normalize,
    FunctionPair,
    DiffResult,
    RankedCandidates,
    DecompileRecord,
    AnalysisPacket,
    LlmOutput,
    Analysis,
    Validation,
    Report,
}

impl SchemaKind {
    pub const ALL: [SchemaKind; 12] = [
        SchemaKind::Envelope,
        SchemaKind::Job,
        SchemaKind::Normalize,
        SchemaKind::FunctionPair,
        SchemaKind::DiffResult,
        SchemaKind::RankedCandidates,
        SchemaKind::DecompileRecord,
        SchemaKind::AnalysisPacket,
        SchemaKind::LlmOutput,
        SchemaKind::Analysis,
        SchemaKind::Validation,
        SchemaKind::Report,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            SchemaKind::Envelope => "artifact.schema.json",
            SchemaKind::Job => "job.schema.json",
            SchemaKind::Normalize => "normalize.schema.json",
            SchemaKind::FunctionPair => "function_pair.schema.json",
            SchemaKind::DiffResult => "diff_result.schema.json",
            SchemaKind::RankedCandidates => "ranked_candidates.schema.json",
            SchemaKind::DecompileRecord => "decompile_record.schema.json",
            SchemaKind::AnalysisPacket => "analysis_packet.schema.json",
            SchemaKind::LlmOutput => "llm_output.schema.json",
            SchemaKind::Analysis => "analysis.schema.json",
            SchemaKind::Validation => "validation.schema.json",
            SchemaKind::Report => "report.schema.json",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            SchemaKind::Envelope => include_str!("../../schemas/artifact.schema.json"),
            SchemaKind::Job => include_str!("../../schemas/job.schema.json"),
            SchemaKind::Normalize => include_str!("../../schemas/normalize.schema.json"),
            SchemaKind::FunctionPair => include_str!("../../schemas/function_pair.schema.json"),
            SchemaKind::DiffResult => include_str!("../../schemas/diff_result.schema.json"),
            SchemaKind::RankedCandidates => {
                include_str!("../../schemas/ranked_candidates.schema.json")
            }
            SchemaKind::DecompileRecord => {
                include_str!("../../schemas/decompile_record.schema.json")
            }
            SchemaKind::AnalysisPacket => include_str!("../../schemas/analysis_packet.schema.json"),
            SchemaKind::LlmOutput => include_str!("../../schemas/llm_output.schema.json"),
            SchemaKind::Analysis => include_str!("../../schemas/analysis.schema.json"),
            SchemaKind::Validation => include_str!("../../schemas/validation.schema.json"),
            SchemaKind::Report => include_str!("../../schemas/report.schema.json"),
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|k| k == self).unwrap_or_default()
    }

    /// Validate `instance`, returning every violation as `"<pointer>: <message>"`.
    pub fn check(&self, instance: &Value) -> Result<(), Vec<String>> {
        let validator = match &compiled()[self.index()] {
            Ok(v) => v,
            Err(e) => return Err(vec![format!("schema {} is unusable: {e}", self.file_name())]),
        };
        let errors: Vec<String> = validator
            .iter_errors(instance)
            .map(|err| {
                let at = err.instance_path.to_string();
                if at.is_empty() {
                    err.to_string()
                } else {
                    format!("{at}: {err}")
                }
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Whether a payload is one schema instance or a list of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSchema {
    Single(SchemaKind),
    ListOf(SchemaKind),
}

impl PayloadSchema {
    /// Validate a payload, prefixing element errors with their index.
    pub fn check(&self, payload: &Value) -> Result<(), Vec<String>> {
        match self {
            PayloadSchema::Single(kind) => kind.check(payload),
            PayloadSchema::ListOf(kind) => {
                let Some(items) = payload.as_array() else {
                    return Err(vec![format!(
                        "payload must be a list of {} items",
                        kind.file_name()
                    )]);
                };
                let errors: Vec<String> = items
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, item)| kind.check(item).err().map(|errs| (idx, errs)))
                    .flat_map(|(idx, errs)| errs.into_iter().map(move |e| format!("[{idx}] {e}")))
                    .collect();
                if errors.is_empty() {
                    Ok(())
                } else {
                    Err(errors)
                }
            }
        }
    }
}

fn compiled() -> &'static [Result<jsonschema::Validator, String>] {
    static VALIDATORS: OnceLock<Vec<Result<jsonschema::Validator, String>>> = OnceLock::new();
    VALIDATORS.get_or_init(|| {
        SchemaKind::ALL
            .iter()
            .map(|kind| {
                let schema: Value =
                    serde_json::from_str(kind.source()).map_err(|e| e.to_string())?;
                jsonschema::options().build(&schema).map_err(|e| e.to_string())
            })
            .collect()
    })
}
