//! ELF section header table parsing for 32- and 64-bit classes.

use crate::binary::reader::{to_usize, Reader};
use crate::binary::{ParseStatus, Section, SectionParse};

/// Field offsets that differ between ELFCLASS32 and ELFCLASS64.
struct Layout {
    wide: bool,
    header_size: usize,
    shoff: usize,
    shentsize: usize,
    shnum: usize,
    shstrndx: usize,
    sh_addr: usize,
    sh_offset: usize,
    sh_size: usize,
    min_entry: usize,
}

const CLASS32: Layout = Layout {
    wide: false,
    header_size: 52,
    shoff: 32,
    shentsize: 46,
    shnum: 48,
    shstrndx: 50,
    sh_addr: 12,
    sh_offset: 16,
    sh_size: 20,
    min_entry: 40,
};

const CLASS64: Layout = Layout {
    wide: true,
    header_size: 64,
    shoff: 40,
    shentsize: 58,
    shnum: 60,
    shstrndx: 62,
    sh_addr: 16,
    sh_offset: 24,
    sh_size: 32,
    min_entry: 64,
};

/// Byte order and class information taken from `e_ident`.
pub(crate) fn ident(data: &[u8]) -> Option<(bool, bool)> {
    let wide = match data.get(4)? {
        1 => false,
        2 => true,
        _ => return None,
    };
    Some((wide, *data.get(5)? == 2))
}

pub fn parse_sections(data: &[u8]) -> SectionParse {
    let Some((wide, big_endian)) = ident(data) else {
        return SectionParse::failed(ParseStatus::malformed("unknown ELF class"));
    };
    let layout = if wide { &CLASS64 } else { &CLASS32 };
    if data.len() < layout.header_size {
        return SectionParse::failed(ParseStatus::truncated("file shorter than the ELF header"));
    }
    let r = Reader::new(data, big_endian);
    match parse_table(&r, layout) {
        Ok(sections) => SectionParse::ok(sections),
        Err(status) => SectionParse::failed(status),
    }
}

fn parse_table(r: &Reader<'_>, layout: &Layout) -> Result<Vec<Section>, ParseStatus> {
    let header = |field: &str| ParseStatus::malformed(format!("unreadable {field}"));
    let shoff = r.word(layout.shoff, layout.wide).ok_or_else(|| header("e_shoff"))?;
    let shentsize = r.u16(layout.shentsize).ok_or_else(|| header("e_shentsize"))? as usize;
    let shnum = r.u16(layout.shnum).ok_or_else(|| header("e_shnum"))? as usize;
    let shstrndx = r.u16(layout.shstrndx).ok_or_else(|| header("e_shstrndx"))? as usize;

    if shoff == 0 || shnum == 0 {
        // No section header table at all: a legitimate, if stripped, file.
        return Ok(Vec::new());
    }
    if shentsize < layout.min_entry {
        return Err(ParseStatus::malformed(format!("e_shentsize {shentsize} too small")));
    }
    let table = to_usize(shoff).ok_or_else(|| header("e_shoff"))?;
    let table_len = shentsize.checked_mul(shnum).ok_or_else(|| header("section table size"))?;
    if r.bytes(table, table_len).is_none() {
        return Err(ParseStatus::malformed("section header table exceeds file length"));
    }
    if shstrndx >= shnum {
        return Err(ParseStatus::malformed(format!(
            "e_shstrndx {shstrndx} out of range for {shnum} sections"
        )));
    }

    let entry = |idx: usize| table + idx * shentsize;
    let strtab_hdr = entry(shstrndx);
    let strtab_off = r.word(strtab_hdr + layout.sh_offset, layout.wide).and_then(to_usize);
    let strtab_size = r.word(strtab_hdr + layout.sh_size, layout.wide).and_then(to_usize);
    let strtab = match (strtab_off, strtab_size) {
        (Some(off), Some(size)) => r.bytes(off, size),
        _ => None,
    }
    .ok_or_else(|| ParseStatus::malformed("section name string table exceeds file length"))?;

    let mut sections = Vec::with_capacity(shnum);
    for idx in 0..shnum {
        let hdr = entry(idx);
        // The whole table was range-checked above.
        let name_off = r.u32(hdr).unwrap_or_default() as usize;
        sections.push(Section {
            name: lookup_name(strtab, name_off),
            offset: r.word(hdr + layout.sh_offset, layout.wide).unwrap_or_default(),
            size: r.word(hdr + layout.sh_size, layout.wide).unwrap_or_default(),
            virtual_address: r.word(hdr + layout.sh_addr, layout.wide),
            virtual_size: None,
            section_type: r.u32(hdr + 4),
            segment: None,
        });
    }
    Ok(sections)
}

fn lookup_name(strtab: &[u8], offset: usize) -> String {
    let Some(tail) = strtab.get(offset..) else {
        return String::new();
    };
    let end = memchr::memchr(0, tail).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..end]).into_owned()
}
