use std::fs;
use std::path::Path;

use crate::binary::reader::Reader;
use crate::error::{IoResultExt, PatchdiffError, PatchdiffResult};
use crate::hashing::sha256_bytes;
use crate::model::{BinaryInfo, FileType};

const MACHO_MAGICS: [[u8; 4]; 6] = [
    [0xFE, 0xED, 0xFA, 0xCE],
    [0xFE, 0xED, 0xFA, 0xCF],
    [0xCE, 0xFA, 0xED, 0xFE],
    [0xCF, 0xFA, 0xED, 0xFE],
    [0xCA, 0xFE, 0xBA, 0xBE],
    [0xBE, 0xBA, 0xFE, 0xCA],
];

/// Classify a container by its magic prefix.
pub fn detect_file_type(data: &[u8]) -> FileType {
    if data.starts_with(b"MZ") {
        FileType::Pe
    } else if data.starts_with(b"\x7fELF") {
        FileType::Elf
    } else if data.len() >= 4 && MACHO_MAGICS.iter().any(|m| data[..4] == m[..]) {
        FileType::MachO
    } else {
        FileType::Unknown
    }
}

/// Architecture name for a container; `"unknown"` when it cannot be determined.
pub fn detect_arch(data: &[u8], file_type: FileType) -> String {
    let arch = match file_type {
        FileType::Pe => pe_arch(data),
        FileType::Elf => elf_arch(data),
        FileType::MachO => macho_arch(data),
        FileType::Unknown => None,
    };
    arch.unwrap_or("unknown").to_string()
}

/// Hash and classify the file at `path`.
pub fn identify(path: &Path) -> PatchdiffResult<BinaryInfo> {
    if !path.is_file() {
        return Err(PatchdiffError::MissingInput(path.to_path_buf()));
    }
    let data = fs::read(path).at(path)?;
    let file_type = detect_file_type(&data);
    Ok(BinaryInfo {
        path: path.display().to_string(),
        sha256: sha256_bytes(&data),
        file_type,
        arch: detect_arch(&data, file_type),
    })
}

fn pe_arch(data: &[u8]) -> Option<&'static str> {
    let r = Reader::little(data);
    let pe_offset = r.u32(0x3C)? as usize;
    if r.bytes(pe_offset, 4)? != b"PE\0\0" {
        return None;
    }
    match r.u16(pe_offset.checked_add(4)?)? {
        0x14C => Some("x86"),
        0x8664 => Some("x64"),
        0xAA64 => Some("arm64"),
        0x1C0 | 0x1C4 => Some("arm"),
        _ => None,
    }
}

fn elf_arch(data: &[u8]) -> Option<&'static str> {
    let big_endian = *data.get(5)? == 2;
    match Reader::new(data, big_endian).u16(18)? {
        0x03 => Some("x86"),
        0x3E => Some("x64"),
        0x28 => Some("arm"),
        0xB7 => Some("arm64"),
        0x08 | 0x0A => Some("mips"),
        _ => None,
    }
}

fn macho_arch(data: &[u8]) -> Option<&'static str> {
    let magic = data.get(..4)?;
    let cputype = match magic {
        // Fat header: report the first slice's cputype.
        [0xCA, 0xFE, 0xBA, 0xBE] => Reader::new(data, true).u32(8)?,
        [0xBE, 0xBA, 0xFE, 0xCA] => Reader::new(data, false).u32(8)?,
        [0xFE, 0xED, 0xFA, _] => Reader::new(data, true).u32(4)?,
        _ => Reader::new(data, false).u32(4)?,
    };
    match cputype {
        7 => Some("x86"),
        0x0100_0007 => Some("x64"),
        12 => Some("arm"),
        0x0100_000C => Some("arm64"),
        18 => Some("ppc"),
        0x0100_0012 => Some("ppc64"),
        _ => None,
    }
}
