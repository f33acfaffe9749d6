//! Binary identity and container normalization.
//!
//! Everything here works on raw bytes with manual header parsing. Parsers
//! never panic on hostile input; they report what they managed to decode
//! together with a [`ParseStatus`] describing how trustworthy it is.

pub mod build_id;
pub mod elf;
pub mod identity;
pub mod macho;
pub mod pe;
mod reader;
pub mod summary;

use serde::{Deserialize, Serialize};

use crate::model::FileType;

pub use identity::{detect_arch, detect_file_type, identify};
pub use summary::{summarize, BinarySummary, CapabilityHints};

/// One entry from a container's section table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    /// File offset of the section's raw data.
    pub offset: u64,
    /// Size of the section's raw data in the file.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_address: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_size: Option<u64>,
    /// ELF `sh_type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_type: Option<u32>,
    /// Mach-O owning segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
}

/// How a section table parse went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseStatus {
    /// Headers were consistent; the section list is complete (possibly empty).
    WellFormed,
    /// The table ran past the end of the file; the sections before that point are kept.
    Truncated { reason: String },
    /// Headers were inconsistent; the section list is an empty fallback.
    Malformed { reason: String },
    /// No section parser for this container.
    Unsupported { reason: String },
}

impl ParseStatus {
    pub fn is_well_formed(&self) -> bool {
        matches!(self, ParseStatus::WellFormed)
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ParseStatus::Malformed { reason: reason.into() }
    }

    pub(crate) fn truncated(reason: impl Into<String>) -> Self {
        ParseStatus::Truncated { reason: reason.into() }
    }
}

/// Sections decoded from a container plus the parse outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionParse {
    pub sections: Vec<Section>,
    pub status: ParseStatus,
}

impl SectionParse {
    pub(crate) fn ok(sections: Vec<Section>) -> Self {
        Self { sections, status: ParseStatus::WellFormed }
    }

    pub(crate) fn failed(status: ParseStatus) -> Self {
        Self { sections: Vec::new(), status }
    }
}

/// Dispatch to the section parser for `file_type`.
pub fn parse_sections(data: &[u8], file_type: FileType) -> SectionParse {
    match file_type {
        FileType::Pe => pe::parse_sections(data),
        FileType::Elf => elf::parse_sections(data),
        FileType::MachO => macho::parse_sections(data),
        FileType::Unknown => SectionParse::failed(ParseStatus::Unsupported {
            reason: "unrecognized container format".to_string(),
        }),
    }
}
