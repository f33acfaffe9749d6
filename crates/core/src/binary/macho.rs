//! Thin Mach-O section parsing via `LC_SEGMENT` / `LC_SEGMENT_64` load commands.

use crate::binary::reader::{fixed_name, Reader};
use crate::binary::{ParseStatus, Section, SectionParse};

const LC_SEGMENT: u32 = 0x1;
const LC_SEGMENT_64: u32 = 0x19;

pub fn parse_sections(data: &[u8]) -> SectionParse {
    let (wide, big_endian) = match data.get(..4) {
        Some([0xFE, 0xED, 0xFA, 0xCE]) => (false, true),
        Some([0xFE, 0xED, 0xFA, 0xCF]) => (true, true),
        Some([0xCE, 0xFA, 0xED, 0xFE]) => (false, false),
        Some([0xCF, 0xFA, 0xED, 0xFE]) => (true, false),
        _ => {
            return SectionParse::failed(ParseStatus::Unsupported {
                reason: "fat Mach-O archives are not sliced".to_string(),
            })
        }
    };
    let r = Reader::new(data, big_endian);
    let header_size = if wide { 32 } else { 28 };
    let ncmds = match r.u32(16) {
        Some(n) if r.len() >= header_size => n,
        _ => {
            return SectionParse::failed(ParseStatus::truncated(
                "file shorter than the Mach-O header",
            ))
        }
    };

    let mut sections = Vec::new();
    let mut cursor = header_size;
    for idx in 0..ncmds {
        let (Some(cmd), Some(cmdsize)) = (r.u32(cursor), r.u32(cursor + 4)) else {
            return SectionParse {
                sections,
                status: ParseStatus::truncated(format!(
                    "load commands end after {idx} of {ncmds}"
                )),
            };
        };
        let cmdsize = cmdsize as usize;
        if cmdsize < 8 {
            return SectionParse::failed(ParseStatus::malformed(format!(
                "load command {idx} has size {cmdsize}"
            )));
        }
        let segment = match cmd {
            LC_SEGMENT => read_segment(&r, cursor, false, &mut sections),
            LC_SEGMENT_64 => read_segment(&r, cursor, true, &mut sections),
            _ => Ok(()),
        };
        if let Err(status) = segment {
            return SectionParse { sections, status };
        }
        let Some(next) = cursor.checked_add(cmdsize) else {
            return SectionParse::failed(ParseStatus::malformed("load command size overflow"));
        };
        cursor = next;
    }
    SectionParse::ok(sections)
}

fn read_segment(
    r: &Reader<'_>,
    cmd_offset: usize,
    wide: bool,
    out: &mut Vec<Section>,
) -> Result<(), ParseStatus> {
    let (segment_size, section_size, nsects_at) = if wide { (72, 80, 64) } else { (56, 68, 48) };
    let nsects = r
        .u32(cmd_offset + nsects_at)
        .ok_or_else(|| ParseStatus::truncated("segment command cut short"))?;
    for idx in 0..nsects as usize {
        let at = cmd_offset + segment_size + idx * section_size;
        let raw = r
            .bytes(at, section_size)
            .ok_or_else(|| ParseStatus::truncated(format!("section {idx} of segment cut short")))?;
        let (addr, size, offset) = if wide {
            (r.u64(at + 32), r.u64(at + 40), r.u32(at + 48))
        } else {
            (r.u32(at + 32).map(u64::from), r.u32(at + 36).map(u64::from), r.u32(at + 40))
        };
        out.push(Section {
            name: fixed_name(&raw[..16]),
            offset: offset.map(u64::from).unwrap_or_default(),
            size: size.unwrap_or_default(),
            virtual_address: addr,
            virtual_size: size,
            section_type: None,
            segment: Some(fixed_name(&raw[16..32])),
        });
    }
    Ok(())
}
