//! PE/COFF section table and optional-header probing.

use crate::binary::reader::{fixed_name, Reader};
use crate::binary::{ParseStatus, Section, SectionParse};

const SECTION_ENTRY_SIZE: usize = 40;
const SECURITY_DIRECTORY_INDEX: usize = 4;

/// Offset of the `PE\0\0` signature, if the DOS header points at one.
fn nt_header_offset(r: &Reader<'_>) -> Result<usize, ParseStatus> {
    if r.len() < 0x40 {
        return Err(ParseStatus::truncated("file shorter than the DOS header"));
    }
    let pe_offset = r.u32(0x3C).map(|v| v as usize).unwrap_or(usize::MAX);
    match r.bytes(pe_offset, 4) {
        Some(sig) if sig == b"PE\0\0" => Ok(pe_offset),
        Some(_) => Err(ParseStatus::malformed("missing PE signature at e_lfanew")),
        None => Err(ParseStatus::malformed("e_lfanew points past end of file")),
    }
}

/// Parse the section table located right after the optional header.
pub fn parse_sections(data: &[u8]) -> SectionParse {
    let r = Reader::little(data);
    let pe_offset = match nt_header_offset(&r) {
        Ok(offset) => offset,
        Err(status) => return SectionParse::failed(status),
    };
    let (Some(count), Some(opt_size)) = (r.u16(pe_offset + 6), r.u16(pe_offset + 20)) else {
        return SectionParse::failed(ParseStatus::truncated("COFF header cut short"));
    };
    let count = count as usize;
    let table = pe_offset + 24 + opt_size as usize;

    let mut sections = Vec::with_capacity(count.min(96));
    for idx in 0..count {
        let off = table + idx * SECTION_ENTRY_SIZE;
        let Some(entry) = r.bytes(off, SECTION_ENTRY_SIZE) else {
            return SectionParse {
                sections,
                status: ParseStatus::truncated(format!(
                    "section table ends after {idx} of {count} entries"
                )),
            };
        };
        let e = Reader::little(entry);
        sections.push(Section {
            name: fixed_name(&entry[..8]),
            virtual_size: e.u32(8).map(u64::from),
            virtual_address: e.u32(12).map(u64::from),
            size: e.u32(16).map(u64::from).unwrap_or_default(),
            offset: e.u32(20).map(u64::from).unwrap_or_default(),
            section_type: None,
            segment: None,
        });
    }
    SectionParse::ok(sections)
}

/// True when the optional header's Security data directory has a non-zero size.
pub fn has_signature(data: &[u8]) -> bool {
    let r = Reader::little(data);
    let Ok(pe_offset) = nt_header_offset(&r) else {
        return false;
    };
    let opt = pe_offset + 24;
    let (data_dirs, rva_count_offset) = match r.u16(opt) {
        Some(0x10B) => (opt + 96, opt + 92),
        Some(0x20B) => (opt + 112, opt + 108),
        _ => return false,
    };
    let Some(rva_count) = r.u32(rva_count_offset) else {
        return false;
    };
    if rva_count as usize <= SECURITY_DIRECTORY_INDEX {
        return false;
    }
    let entry = data_dirs + SECURITY_DIRECTORY_INDEX * 8;
    r.u32(entry + 4).is_some_and(|size| size > 0)
}
