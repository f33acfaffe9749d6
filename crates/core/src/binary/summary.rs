use std::fs;
use std::path::Path;

use memchr::memmem;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::binary::{build_id, parse_sections, pe, ParseStatus, Section};
use crate::error::{IoResultExt, PatchdiffError, PatchdiffResult};
use crate::hashing::sha256_bytes;
use crate::model::{BinaryInfo, FileType};

const IMPORT_SECTIONS: &[&str] =
    &[".idata", ".plt", ".plt.sec", ".got", ".got.plt", "__stubs", "__la_symbol_ptr"];
const EXPORT_SECTIONS: &[&str] = &[".edata", ".dynsym", "__nl_symbol_ptr"];
const SYMBOL_SECTIONS: &[&str] = &[".symtab", ".dynsym", "__symbol_table"];

/// Coarse capability flags derived from section names and a few byte markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityHints {
    pub has_imports_hint: bool,
    pub has_exports_hint: bool,
    pub has_symbols_hint: bool,
    pub has_debug_info_hint: bool,
    pub has_signature_hint: bool,
}

/// Normalized view of one input binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinarySummary {
    pub path: String,
    pub sha256: String,
    pub file_type: FileType,
    pub arch: String,
    pub size_bytes: u64,
    pub section_count: usize,
    pub sections: Vec<Section>,
    pub parse_status: ParseStatus,
    pub hints: CapabilityHints,
    pub build_id: Option<String>,
}

pub fn hints_for(data: &[u8], file_type: FileType, sections: &[Section]) -> CapabilityHints {
    let any_named = |set: &[&str]| sections.iter().any(|s| set.contains(&s.name.as_str()));
    let debug_section =
        sections.iter().any(|s| s.name.starts_with(".debug") || s.name.starts_with("__debug"));
    CapabilityHints {
        has_imports_hint: any_named(IMPORT_SECTIONS),
        has_exports_hint: any_named(EXPORT_SECTIONS),
        has_symbols_hint: any_named(SYMBOL_SECTIONS),
        has_debug_info_hint: debug_section || memmem::find(data, b"RSDS").is_some(),
        has_signature_hint: file_type == FileType::Pe && pe::has_signature(data),
    }
}

/// Summarize the binary recorded in `info`.
///
/// Identity fields come from the ingest-time record; the file is re-read only
/// for structure. A content change since ingest is logged, not corrected.
pub fn summarize(info: &BinaryInfo) -> PatchdiffResult<BinarySummary> {
    let path = Path::new(&info.path);
    if !path.is_file() {
        return Err(PatchdiffError::MissingInput(path.to_path_buf()));
    }
    let data = fs::read(path).at(path)?;
    if sha256_bytes(&data) != info.sha256 {
        warn!(path = %info.path, "binary changed on disk since ingest; keeping ingest-time hash");
    }

    let parsed = parse_sections(&data, info.file_type);
    if !parsed.status.is_well_formed() {
        warn!(path = %info.path, status = ?parsed.status, "section table parse degraded");
    }
    let hints = hints_for(&data, info.file_type, &parsed.sections);
    let build_id = build_id::extract(&data, info.file_type, &parsed.sections);

    Ok(BinarySummary {
        path: info.path.clone(),
        sha256: info.sha256.clone(),
        file_type: info.file_type,
        arch: info.arch.clone(),
        size_bytes: data.len() as u64,
        section_count: parsed.sections.len(),
        sections: parsed.sections,
        parse_status: parsed.status,
        hints,
        build_id,
    })
}
