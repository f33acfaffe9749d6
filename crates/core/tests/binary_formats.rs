use object::write::Object;
use object::{Architecture, BinaryFormat, Endianness, SectionKind};
use patchdiff_core::binary::summary::hints_for;
use patchdiff_core::binary::{
    build_id, detect_arch, detect_file_type, identify, parse_sections, summarize, ParseStatus,
};
use patchdiff_core::model::FileType;
use tempfile::tempdir;

const PE_TABLE: usize = 0x40 + 24;

/// DOS stub, `PE\0\0`, a COFF header, an optional header of `opt` bytes, and one
/// 40-byte section entry per name.
fn pe_image(machine: u16, names: &[&str], opt: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 0x40];
    data[..2].copy_from_slice(b"MZ");
    data[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());
    data.extend_from_slice(b"PE\0\0");
    data.extend_from_slice(&machine.to_le_bytes());
    data.extend_from_slice(&(names.len() as u16).to_le_bytes());
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(&(opt.len() as u16).to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(opt);
    for (idx, name) in names.iter().enumerate() {
        let mut entry = [0u8; 40];
        entry[..name.len()].copy_from_slice(name.as_bytes());
        entry[8..12].copy_from_slice(&0x180u32.to_le_bytes());
        entry[12..16].copy_from_slice(&(0x1000 * (idx as u32 + 1)).to_le_bytes());
        entry[16..20].copy_from_slice(&0x200u32.to_le_bytes());
        entry[20..24].copy_from_slice(&(0x400 + 0x200 * idx as u32).to_le_bytes());
        data.extend_from_slice(&entry);
    }
    data
}

fn elf_header(class: u8, big_endian: bool, machine: u16) -> Vec<u8> {
    let mut data = vec![0u8; 64];
    data[..4].copy_from_slice(b"\x7fELF");
    data[4] = class;
    data[5] = if big_endian { 2 } else { 1 };
    data[6] = 1;
    let machine = if big_endian { machine.to_be_bytes() } else { machine.to_le_bytes() };
    data[18..20].copy_from_slice(&machine);
    data
}

fn macho64(sections: &[(&str, &str, u64, u64, u32)]) -> Vec<u8> {
    let cmdsize = 72 + 80 * sections.len() as u32;
    let mut data = Vec::new();
    data.extend_from_slice(&[0xCF, 0xFA, 0xED, 0xFE]);
    data.extend_from_slice(&0x0100_000Cu32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&cmdsize.to_le_bytes());
    data.extend_from_slice(&[0u8; 8]);

    let mut cmd = vec![0u8; 72];
    cmd[..4].copy_from_slice(&0x19u32.to_le_bytes());
    cmd[4..8].copy_from_slice(&cmdsize.to_le_bytes());
    cmd[8..14].copy_from_slice(b"__TEXT");
    cmd[64..68].copy_from_slice(&(sections.len() as u32).to_le_bytes());
    for (sect, seg, addr, size, offset) in sections {
        let mut entry = vec![0u8; 80];
        entry[..sect.len()].copy_from_slice(sect.as_bytes());
        entry[16..16 + seg.len()].copy_from_slice(seg.as_bytes());
        entry[32..40].copy_from_slice(&addr.to_le_bytes());
        entry[40..48].copy_from_slice(&size.to_le_bytes());
        entry[48..52].copy_from_slice(&offset.to_le_bytes());
        cmd.extend_from_slice(&entry);
    }
    data.extend_from_slice(&cmd);
    data
}

#[test]
fn detects_container_by_magic() {
    assert_eq!(detect_file_type(b"MZ\x90\x00"), FileType::Pe);
    assert_eq!(detect_file_type(b"\x7fELF\x02\x01"), FileType::Elf);
    assert_eq!(detect_file_type(&[0xCF, 0xFA, 0xED, 0xFE]), FileType::MachO);
    assert_eq!(detect_file_type(&[0xCA, 0xFE, 0xBA, 0xBE]), FileType::MachO);
    assert_eq!(detect_file_type(b"#!/bin/sh"), FileType::Unknown);
    assert_eq!(detect_file_type(b""), FileType::Unknown);
}

#[test]
fn pe_with_two_sections_parses_both() {
    let data = pe_image(0x8664, &[".text", ".rdata"], &[]);
    assert_eq!(detect_arch(&data, FileType::Pe), "x64");

    let parsed = parse_sections(&data, FileType::Pe);
    assert_eq!(parsed.status, ParseStatus::WellFormed);
    assert_eq!(parsed.sections.len(), 2);
    assert_eq!(parsed.sections[0].name, ".text");
    assert_eq!(parsed.sections[0].offset, 0x400);
    assert_eq!(parsed.sections[0].size, 0x200);
    assert_eq!(parsed.sections[0].virtual_address, Some(0x1000));
    assert_eq!(parsed.sections[1].name, ".rdata");
    assert_eq!(parsed.sections[1].offset, 0x600);
    assert_eq!(parsed.sections[1].virtual_size, Some(0x180));
}

#[test]
fn pe_truncated_mid_table_keeps_leading_sections() {
    let mut data = pe_image(0x14C, &[".text", ".data"], &[]);
    data.truncate(PE_TABLE + 40 + 20);

    let parsed = parse_sections(&data, FileType::Pe);
    assert_eq!(parsed.sections.len(), 1);
    assert_eq!(parsed.sections[0].name, ".text");
    assert!(matches!(parsed.status, ParseStatus::Truncated { .. }), "{:?}", parsed.status);
    assert_eq!(detect_arch(&data, FileType::Pe), "x86");
}

#[test]
fn pe_without_signature_is_malformed_and_unknown_arch() {
    let mut data = pe_image(0xAA64, &[".text"], &[]);
    data[0x40..0x44].copy_from_slice(b"NOPE");
    let parsed = parse_sections(&data, FileType::Pe);
    assert!(parsed.sections.is_empty());
    assert!(matches!(parsed.status, ParseStatus::Malformed { .. }));
    assert_eq!(detect_arch(&data, FileType::Pe), "unknown");
}

#[test]
fn pe_security_directory_sets_signature_hint() {
    let mut opt = vec![0u8; 240];
    opt[..2].copy_from_slice(&0x20Bu16.to_le_bytes());
    opt[108..112].copy_from_slice(&16u32.to_le_bytes());
    opt[112 + 4 * 8 + 4..112 + 4 * 8 + 8].copy_from_slice(&0x300u32.to_le_bytes());
    let signed = pe_image(0x8664, &[".text", ".idata"], &opt);
    let parsed = parse_sections(&signed, FileType::Pe);
    assert_eq!(parsed.sections.len(), 2);
    let hints = hints_for(&signed, FileType::Pe, &parsed.sections);
    assert!(hints.has_signature_hint);
    assert!(hints.has_imports_hint);
    assert!(!hints.has_debug_info_hint);

    // Four data directories do not reach the Security entry.
    opt[108..112].copy_from_slice(&4u32.to_le_bytes());
    let short = pe_image(0x8664, &[".text"], &opt);
    let parsed = parse_sections(&short, FileType::Pe);
    assert!(!hints_for(&short, FileType::Pe, &parsed.sections).has_signature_hint);
}

#[test]
fn pe_codeview_record_yields_build_id() {
    let mut data = pe_image(0x8664, &[".text"], &[]);
    data.extend_from_slice(b"RSDS");
    data.extend((0u8..20).collect::<Vec<_>>());
    let parsed = parse_sections(&data, FileType::Pe);
    let id = build_id::extract(&data, FileType::Pe, &parsed.sections).expect("codeview id");
    assert_eq!(id.len(), 40);
    assert!(id.starts_with("000102"));
    assert!(hints_for(&data, FileType::Pe, &parsed.sections).has_debug_info_hint);
}

#[test]
fn elf_machine_codes_map_to_arch_names() {
    assert_eq!(detect_arch(&elf_header(2, false, 0xB7), FileType::Elf), "arm64");
    assert_eq!(detect_arch(&elf_header(2, false, 0x3E), FileType::Elf), "x64");
    assert_eq!(detect_arch(&elf_header(1, false, 0x28), FileType::Elf), "arm");
    assert_eq!(detect_arch(&elf_header(1, true, 0x08), FileType::Elf), "mips");
    assert_eq!(detect_arch(&elf_header(2, false, 0x1234), FileType::Elf), "unknown");
}

#[test]
fn elf_without_section_table_is_well_formed_and_empty() {
    let parsed = parse_sections(&elf_header(2, false, 0xB7), FileType::Elf);
    assert_eq!(parsed.status, ParseStatus::WellFormed);
    assert!(parsed.sections.is_empty());
}

#[test]
fn elf_section_table_past_eof_is_malformed() {
    let mut data = elf_header(2, false, 0x3E);
    data[40..48].copy_from_slice(&0x1000u64.to_le_bytes());
    data[58..60].copy_from_slice(&64u16.to_le_bytes());
    data[60..62].copy_from_slice(&3u16.to_le_bytes());
    data[62..64].copy_from_slice(&1u16.to_le_bytes());
    let parsed = parse_sections(&data, FileType::Elf);
    assert!(parsed.sections.is_empty());
    assert!(matches!(parsed.status, ParseStatus::Malformed { .. }), "{:?}", parsed.status);
}

#[test]
fn elf_truncated_header_never_panics() {
    let data = b"\x7fELF\x02\x01".to_vec();
    let parsed = parse_sections(&data, FileType::Elf);
    assert!(parsed.sections.is_empty());
    assert!(!parsed.status.is_well_formed());
    assert_eq!(detect_arch(&data, FileType::Elf), "unknown");
}

#[test]
fn elf_written_by_object_parses_named_sections() {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Aarch64, Endianness::Little);
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    obj.section_mut(text).append_data(&[0x1F, 0x20, 0x03, 0xD5], 4);
    let ro = obj.add_section(Vec::new(), b".rodata".to_vec(), SectionKind::ReadOnlyData);
    obj.section_mut(ro).append_data(b"patched\0", 1);
    let data = obj.write().expect("write elf");

    assert_eq!(detect_file_type(&data), FileType::Elf);
    assert_eq!(detect_arch(&data, FileType::Elf), "arm64");
    let parsed = parse_sections(&data, FileType::Elf);
    assert_eq!(parsed.status, ParseStatus::WellFormed);
    let names: Vec<&str> = parsed.sections.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&".text"), "sections: {names:?}");
    assert!(names.contains(&".rodata"), "sections: {names:?}");
    let text = parsed.sections.iter().find(|s| s.name == ".text").expect(".text");
    assert_eq!(text.size, 4);
    assert_eq!(&data[text.offset as usize..text.offset as usize + 4], &[0x1F, 0x20, 0x03, 0xD5]);
}

#[test]
fn elf_build_id_note_is_found_without_section_table() {
    let mut data = elf_header(2, false, 0x3E);
    data.extend_from_slice(&4u32.to_le_bytes());
    data.extend_from_slice(&4u32.to_le_bytes());
    data.extend_from_slice(&3u32.to_le_bytes());
    data.extend_from_slice(b"GNU\0");
    data.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(build_id::extract(&data, FileType::Elf, &[]).as_deref(), Some("deadbeef"));
}

#[test]
fn macho64_segment_sections_are_listed() {
    let data = macho64(&[
        ("__text", "__TEXT", 0x1_0000_1000, 0x80, 0x1000),
        ("__stubs", "__TEXT", 0x1_0000_1080, 0x10, 0x1080),
    ]);
    assert_eq!(detect_file_type(&data), FileType::MachO);
    assert_eq!(detect_arch(&data, FileType::MachO), "arm64");
    let parsed = parse_sections(&data, FileType::MachO);
    assert_eq!(parsed.status, ParseStatus::WellFormed);
    assert_eq!(parsed.sections.len(), 2);
    assert_eq!(parsed.sections[0].name, "__text");
    assert_eq!(parsed.sections[0].segment.as_deref(), Some("__TEXT"));
    assert_eq!(parsed.sections[0].virtual_address, Some(0x1_0000_1000));
    assert_eq!(parsed.sections[1].offset, 0x1080);
    assert!(hints_for(&data, FileType::MachO, &parsed.sections).has_imports_hint);
}

#[test]
fn macho_truncated_segment_reports_truncation() {
    let mut data = macho64(&[("__text", "__TEXT", 0x1000, 0x80, 0x1000), ("__data", "__DATA", 0x2000, 8, 0x2000)]);
    data.truncate(32 + 72 + 80 + 10);
    let parsed = parse_sections(&data, FileType::MachO);
    assert_eq!(parsed.sections.len(), 1);
    assert!(matches!(parsed.status, ParseStatus::Truncated { .. }));
}

#[test]
fn fat_macho_is_unsupported_but_reports_first_slice_arch() {
    let mut data = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 1];
    data.extend_from_slice(&0x0100_0007u32.to_be_bytes());
    assert_eq!(detect_arch(&data, FileType::MachO), "x64");
    let parsed = parse_sections(&data, FileType::MachO);
    assert!(matches!(parsed.status, ParseStatus::Unsupported { .. }));
}

#[test]
fn unknown_container_is_unsupported() {
    let parsed = parse_sections(b"plain text", FileType::Unknown);
    assert!(parsed.sections.is_empty());
    assert!(matches!(parsed.status, ParseStatus::Unsupported { .. }));
    assert_eq!(detect_arch(b"plain text", FileType::Unknown), "unknown");
}

#[test]
fn identify_and_summarize_read_from_disk() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("a.exe");
    std::fs::write(&path, pe_image(0x8664, &[".text", ".rdata"], &[])).expect("write pe");

    let info = identify(&path).expect("identify");
    assert_eq!(info.file_type, FileType::Pe);
    assert_eq!(info.arch, "x64");
    assert_eq!(info.sha256.len(), 64);

    let summary = summarize(&info).expect("summarize");
    assert_eq!(summary.section_count, 2);
    assert_eq!(summary.sha256, info.sha256);
    assert!(summary.parse_status.is_well_formed());

    let missing = identify(&temp.path().join("missing.bin")).unwrap_err();
    assert_eq!(missing.exit_code(), 20);
}
