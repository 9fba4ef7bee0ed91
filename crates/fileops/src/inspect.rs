//! Executable image inspection
//!
//! Pulls the embedded four-part version and the target architecture out
//! of PE, ELF and Mach-O images without executing anything.

use std::path::Path;

use bndl_errors::{FileOpError, Result};
use bndl_types::{Arch, FileVersion};

use crate::ops::{read_bytes, read_until};

// VS_FIXEDFILEINFO dwSignature, little endian on disk.
const FIXEDFILEINFO_SIGNATURE: [u8; 4] = [0xBD, 0x04, 0xEF, 0xFE];

// Offsets within VS_FIXEDFILEINFO relative to the signature.
const FILE_VERSION_MS_OFFSET: usize = 8;
const FILE_VERSION_LS_OFFSET: usize = 12;

const HEADER_SNIFF_LIMIT: usize = 64 * 1024;

/// Extract the embedded `major.minor.build.revision` version of an
/// executable image.
///
/// The version block is located by scanning for the fixed-info signature,
/// which works for any image that embeds a standard version resource.
///
/// # Errors
///
/// Returns [`FileOpError::VersionNotFound`] when no version block exists
/// in the file.
#[allow(clippy::cast_possible_truncation)]
pub async fn file_version(path: &Path) -> Result<FileVersion> {
    let bytes = read_bytes(path).await?;
    let Some(at) = bytes
        .windows(FIXEDFILEINFO_SIGNATURE.len())
        .position(|w| w == FIXEDFILEINFO_SIGNATURE)
    else {
        return Err(FileOpError::VersionNotFound {
            path: path.display().to_string(),
        }
        .into());
    };
    let (Some(ms), Some(ls)) = (
        read_u32_le(&bytes, at + FILE_VERSION_MS_OFFSET),
        read_u32_le(&bytes, at + FILE_VERSION_LS_OFFSET),
    ) else {
        return Err(FileOpError::VersionNotFound {
            path: path.display().to_string(),
        }
        .into());
    };
    Ok(FileVersion::new(
        (ms >> 16) as u16,
        (ms & 0xFFFF) as u16,
        (ls >> 16) as u16,
        (ls & 0xFFFF) as u16,
    ))
}

/// Identify the processor architecture an executable image targets.
///
/// Recognizes PE, ELF and Mach-O containers. A recognized container with
/// an unfamiliar machine field reports [`Arch::Unknown`].
///
/// # Errors
///
/// Returns [`FileOpError::NotExecutable`] when the file is not a
/// recognized executable image at all.
pub async fn executable_architecture(path: &Path) -> Result<Arch> {
    let header = read_until(path, HEADER_SNIFF_LIMIT).await?;

    if header.starts_with(b"MZ") {
        return Ok(pe_architecture(&header));
    }
    if header.starts_with(&[0x7F, b'E', b'L', b'F']) {
        return Ok(elf_architecture(&header));
    }
    if let Some(magic) = read_u32_le(&header, 0) {
        if magic == 0xFEED_FACF || magic == 0xFEED_FACE {
            return Ok(macho_architecture(&header));
        }
    }
    Err(FileOpError::NotExecutable {
        path: path.display().to_string(),
    }
    .into())
}

fn pe_architecture(header: &[u8]) -> Arch {
    let Some(pe_offset) = read_u32_le(header, 0x3C) else {
        return Arch::Unknown;
    };
    let Ok(pe_offset) = usize::try_from(pe_offset) else {
        return Arch::Unknown;
    };
    if header.get(pe_offset..pe_offset + 4) != Some(b"PE\0\0".as_slice()) {
        return Arch::Unknown;
    }
    match read_u16_le(header, pe_offset + 4) {
        Some(0x014C) => Arch::X86,
        Some(0x8664) => Arch::X64,
        Some(0xAA64) => Arch::Arm64,
        _ => Arch::Unknown,
    }
}

fn elf_architecture(header: &[u8]) -> Arch {
    // e_machine sits at offset 18 in both 32 and 64 bit headers.
    let machine = match header.get(5) {
        Some(2) => header
            .get(18..20)
            .map(|b| u16::from_be_bytes([b[0], b[1]])),
        _ => read_u16_le(header, 18),
    };
    match machine {
        Some(3) => Arch::X86,
        Some(62) => Arch::X64,
        Some(183) => Arch::Arm64,
        _ => Arch::Unknown,
    }
}

fn macho_architecture(header: &[u8]) -> Arch {
    match read_u32_le(header, 4) {
        Some(0x0100_0007) => Arch::X64,
        Some(0x0100_000C) => Arch::Arm64,
        Some(0x0000_0007) => Arch::X86,
        _ => Arch::Unknown,
    }
}

fn read_u16_le(bytes: &[u8], at: usize) -> Option<u16> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32_le(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal image carrying only a fixed-info block at an arbitrary
    // offset, the way a real resource section would.
    fn image_with_version(major: u16, minor: u16, build: u16, revision: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes.extend_from_slice(&FIXEDFILEINFO_SIGNATURE);
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes()); // dwStrucVersion
        let ms = (u32::from(major) << 16) | u32::from(minor);
        let ls = (u32::from(build) << 16) | u32::from(revision);
        bytes.extend_from_slice(&ms.to_le_bytes());
        bytes.extend_from_slice(&ls.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 40]);
        bytes
    }

    #[tokio::test]
    async fn version_block_is_found_and_unpacked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.exe");
        tokio::fs::write(&path, image_with_version(4, 8, 15, 16))
            .await
            .unwrap();
        let version = file_version(&path).await.unwrap();
        assert_eq!(version, FileVersion::new(4, 8, 15, 16));
    }

    #[tokio::test]
    async fn missing_version_block_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.bin");
        tokio::fs::write(&path, vec![0u8; 256]).await.unwrap();
        let err = file_version(&path).await.unwrap_err();
        assert!(matches!(
            err,
            bndl_errors::Error::FileOp(FileOpError::VersionNotFound { .. })
        ));
    }

    fn pe_image(machine: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 0x80];
        bytes[0] = b'M';
        bytes[1] = b'Z';
        bytes[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());
        bytes[0x40..0x44].copy_from_slice(b"PE\0\0");
        bytes[0x44..0x46].copy_from_slice(&machine.to_le_bytes());
        bytes
    }

    #[tokio::test]
    async fn pe_machine_field_maps_to_arch() {
        let dir = tempfile::tempdir().unwrap();
        for (machine, arch) in [
            (0x014C, Arch::X86),
            (0x8664, Arch::X64),
            (0xAA64, Arch::Arm64),
            (0x1234, Arch::Unknown),
        ] {
            let path = dir.path().join(format!("pe-{machine:x}.exe"));
            tokio::fs::write(&path, pe_image(machine)).await.unwrap();
            assert_eq!(executable_architecture(&path).await.unwrap(), arch);
        }
    }

    #[tokio::test]
    async fn elf_machine_field_maps_to_arch() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = vec![0u8; 64];
        image[..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        image[4] = 2; // 64-bit
        image[5] = 1; // little endian
        image[18..20].copy_from_slice(&62u16.to_le_bytes());
        let path = dir.path().join("bin.elf");
        tokio::fs::write(&path, image).await.unwrap();
        assert_eq!(executable_architecture(&path).await.unwrap(), Arch::X64);
    }

    #[tokio::test]
    async fn non_image_is_not_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"just text").await.unwrap();
        let err = executable_architecture(&path).await.unwrap_err();
        assert!(matches!(
            err,
            bndl_errors::Error::FileOp(FileOpError::NotExecutable { .. })
        ));
    }
}
