//! Build identifiers: GNU build-id notes for ELF, CodeView GUID+age for PE.

use memchr::memmem;

use crate::binary::elf;
use crate::binary::reader::{to_usize, Reader};
use crate::binary::Section;
use crate::model::FileType;

const NT_GNU_BUILD_ID: u32 = 3;

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Extract a build id using the already-parsed section table where possible.
pub fn extract(data: &[u8], file_type: FileType, sections: &[Section]) -> Option<String> {
    match file_type {
        FileType::Elf => elf_build_id(data, sections),
        FileType::Pe => pe_debug_id(data),
        _ => None,
    }
}

fn elf_build_id(data: &[u8], sections: &[Section]) -> Option<String> {
    let (_, big_endian) = elf::ident(data)?;
    let r = Reader::new(data, big_endian);

    if let Some(note) = sections.iter().find(|s| s.name == ".note.gnu.build-id") {
        let start = to_usize(note.offset)?;
        let len = to_usize(note.size)?;
        if let Some(id) = r.bytes(start, len).and_then(|b| parse_note(b, big_endian)) {
            return Some(id);
        }
    }

    // Stripped section tables: find the note by its owner name instead.
    for idx in memmem::find_iter(data, b"GNU\0") {
        let Some(header) = idx.checked_sub(12) else { continue };
        if let Some(id) = r.bytes(header, data.len() - header).and_then(|b| parse_note(b, big_endian))
        {
            return Some(id);
        }
    }
    None
}

/// Decode a single `Elf_Nhdr` note and return its descriptor when it is a GNU build id.
fn parse_note(note: &[u8], big_endian: bool) -> Option<String> {
    let r = Reader::new(note, big_endian);
    let namesz = r.u32(0)? as usize;
    let descsz = r.u32(4)? as usize;
    if r.u32(8)? != NT_GNU_BUILD_ID || namesz != 4 || r.bytes(12, 4)? != b"GNU\0" {
        return None;
    }
    if descsz == 0 || descsz > 64 {
        return None;
    }
    r.bytes(16, descsz).map(hex)
}

fn pe_debug_id(data: &[u8]) -> Option<String> {
    let idx = memmem::find(data, b"RSDS")?;
    Reader::little(data).bytes(idx + 4, 20).map(hex)
}
