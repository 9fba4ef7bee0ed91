//! Encoding-aware text file reading and writing
//!
//! Reading classifies the encoding from the byte-order mark when one is
//! present and from content heuristics when not; the classification is
//! returned so a later write can preserve it. Files with no mark and no
//! multi-byte UTF-8 are reported as [`TextEncoding::Unspecified`] and
//! decoded as Latin-1, which is lossless for any byte sequence.

use std::path::Path;

use bndl_errors::{FileOpError, Result};

use crate::ops::{read_bytes, write_bytes};
use crate::retry::RetryPolicy;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];

/// Text encoding of a file, as classified on read or requested on write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    /// No mark and no multi-byte content; treated as Latin-1
    Unspecified,
    Utf8,
    Utf8WithBom,
    /// Little-endian UTF-16 without a byte-order mark
    Utf16,
    /// Little-endian UTF-16 with a byte-order mark
    Utf16WithBom,
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unspecified => write!(f, "latin-1"),
            Self::Utf8 => write!(f, "utf-8"),
            Self::Utf8WithBom => write!(f, "utf-8 with BOM"),
            Self::Utf16 => write!(f, "utf-16le"),
            Self::Utf16WithBom => write!(f, "utf-16le with BOM"),
        }
    }
}

/// Read a text file, classifying its encoding.
///
/// # Errors
///
/// Returns [`FileOpError::MalformedText`] when a byte-order mark promises
/// an encoding the content does not satisfy.
pub async fn read_text(path: &Path) -> Result<(String, TextEncoding)> {
    let bytes = read_bytes(path).await?;
    decode(&bytes, path)
}

fn decode(bytes: &[u8], path: &Path) -> Result<(String, TextEncoding)> {
    if bytes.starts_with(&UTF8_BOM) {
        let text = std::str::from_utf8(&bytes[UTF8_BOM.len()..]).map_err(|_| {
            FileOpError::MalformedText {
                path: path.display().to_string(),
                encoding: "utf-8".to_string(),
            }
        })?;
        return Ok((text.to_string(), TextEncoding::Utf8WithBom));
    }
    if bytes.starts_with(&UTF16_LE_BOM) {
        let text = decode_utf16_le(&bytes[UTF16_LE_BOM.len()..], path)?;
        return Ok((text, TextEncoding::Utf16WithBom));
    }
    if looks_like_utf16_le(bytes) {
        let text = decode_utf16_le(bytes, path)?;
        return Ok((text, TextEncoding::Utf16));
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        if text.is_ascii() {
            return Ok((text.to_string(), TextEncoding::Unspecified));
        }
        return Ok((text.to_string(), TextEncoding::Utf8));
    }
    // Latin-1 maps every byte to the scalar of the same value.
    let text = bytes.iter().map(|&b| char::from(b)).collect();
    Ok((text, TextEncoding::Unspecified))
}

fn decode_utf16_le(bytes: &[u8], path: &Path) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(FileOpError::MalformedText {
            path: path.display().to_string(),
            encoding: "utf-16le".to_string(),
        }
        .into());
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| {
        FileOpError::MalformedText {
            path: path.display().to_string(),
            encoding: "utf-16le".to_string(),
        }
        .into()
    })
}

// Mostly-ASCII UTF-16LE text has zero high bytes at odd offsets. Require
// a majority so binary content does not get misclassified.
fn looks_like_utf16_le(bytes: &[u8]) -> bool {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return false;
    }
    let high_zeros = bytes
        .iter()
        .skip(1)
        .step_by(2)
        .filter(|&&b| b == 0)
        .count();
    high_zeros * 2 > bytes.len() / 2
}

/// Write a text file in the given encoding.
///
/// # Errors
///
/// Returns [`FileOpError::UnencodableText`] when the text contains a
/// character the encoding cannot represent.
pub async fn write_text(
    path: &Path,
    text: &str,
    encoding: TextEncoding,
    policy: RetryPolicy,
) -> Result<()> {
    let bytes = encode(text, encoding)?;
    write_bytes(path, &bytes, policy).await
}

fn encode(text: &str, encoding: TextEncoding) -> Result<Vec<u8>> {
    match encoding {
        TextEncoding::Unspecified => {
            let mut out = Vec::with_capacity(text.len());
            for ch in text.chars() {
                match u8::try_from(u32::from(ch)) {
                    Ok(byte) => out.push(byte),
                    Err(_) => {
                        return Err(FileOpError::UnencodableText {
                            encoding: "latin-1".to_string(),
                            codepoint: u32::from(ch),
                        }
                        .into());
                    }
                }
            }
            Ok(out)
        }
        TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
        TextEncoding::Utf8WithBom => {
            let mut out = Vec::with_capacity(UTF8_BOM.len() + text.len());
            out.extend_from_slice(&UTF8_BOM);
            out.extend_from_slice(text.as_bytes());
            Ok(out)
        }
        TextEncoding::Utf16 | TextEncoding::Utf16WithBom => {
            let mut out = Vec::with_capacity(text.len() * 2 + 2);
            if encoding == TextEncoding::Utf16WithBom {
                out.extend_from_slice(&UTF16_LE_BOM);
            }
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn utf8_bom_classified_and_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bom.txt");
        write_text(&path, "héllo", TextEncoding::Utf8WithBom, RetryPolicy::none())
            .await
            .unwrap();

        let raw = tokio::fs::read(&path).await.unwrap();
        assert_eq!(&raw[..3], &UTF8_BOM);

        let (text, encoding) = read_text(&path).await.unwrap();
        assert_eq!(text, "héllo");
        assert_eq!(encoding, TextEncoding::Utf8WithBom);
    }

    #[tokio::test]
    async fn utf16_bom_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.txt");
        write_text(&path, "wide π", TextEncoding::Utf16WithBom, RetryPolicy::none())
            .await
            .unwrap();
        let (text, encoding) = read_text(&path).await.unwrap();
        assert_eq!(text, "wide π");
        assert_eq!(encoding, TextEncoding::Utf16WithBom);
    }

    #[tokio::test]
    async fn bare_utf16_detected_by_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare16.txt");
        write_text(&path, "settings=1", TextEncoding::Utf16, RetryPolicy::none())
            .await
            .unwrap();
        let (text, encoding) = read_text(&path).await.unwrap();
        assert_eq!(text, "settings=1");
        assert_eq!(encoding, TextEncoding::Utf16);
    }

    #[tokio::test]
    async fn ascii_without_mark_is_unspecified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        tokio::fs::write(&path, b"key=value\n").await.unwrap();
        let (text, encoding) = read_text(&path).await.unwrap();
        assert_eq!(text, "key=value\n");
        assert_eq!(encoding, TextEncoding::Unspecified);
    }

    #[tokio::test]
    async fn multibyte_without_mark_is_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.txt");
        tokio::fs::write(&path, "naïve".as_bytes()).await.unwrap();
        let (_, encoding) = read_text(&path).await.unwrap();
        assert_eq!(encoding, TextEncoding::Utf8);
    }

    #[tokio::test]
    async fn latin1_bytes_decode_losslessly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.txt");
        // 0xE9 is é in Latin-1 and invalid as a lone UTF-8 byte.
        tokio::fs::write(&path, [b'c', b'a', b'f', 0xE9]).await.unwrap();
        let (text, encoding) = read_text(&path).await.unwrap();
        assert_eq!(text, "café");
        assert_eq!(encoding, TextEncoding::Unspecified);

        write_text(&path, &text, encoding, RetryPolicy::none())
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), [b'c', b'a', b'f', 0xE9]);
    }

    #[tokio::test]
    async fn latin1_write_rejects_wide_characters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reject.txt");
        let err = write_text(&path, "π", TextEncoding::Unspecified, RetryPolicy::none())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            bndl_errors::Error::FileOp(FileOpError::UnencodableText { codepoint: 0x3C0, .. })
        ));
    }

    #[tokio::test]
    async fn truncated_utf16_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("torn.txt");
        tokio::fs::write(&path, [0xFF, 0xFE, 0x41]).await.unwrap();
        let err = read_text(&path).await.unwrap_err();
        assert!(matches!(
            err,
            bndl_errors::Error::FileOp(FileOpError::MalformedText { .. })
        ));
    }
}
