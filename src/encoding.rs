// 🔤 Encoding Resolver - raw upload bytes → text
//
// The POS exports arrive as UTF-8 from the web console but as Windows-1252 or
// Latin-1 when re-saved from a spreadsheet. The whole buffer is decoded with
// each candidate in order; the first clean decode wins.

use crate::error::{IngestError, IngestResult};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::debug;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Bytes with no assigned character in code page 1252.
const CP1252_UNDEFINED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

// ============================================================================
// SOURCE ENCODING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceEncoding {
    Utf8,
    Windows1252,
    Latin1,
}

impl SourceEncoding {
    /// Default candidate order used when nothing is configured.
    pub const DEFAULT_ORDER: [SourceEncoding; 3] = [
        SourceEncoding::Utf8,
        SourceEncoding::Windows1252,
        SourceEncoding::Latin1,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Windows1252 => "windows-1252",
            SourceEncoding::Latin1 => "iso-8859-1",
        }
    }

    /// Parse a configuration label (case-insensitive, common aliases accepted).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "utf-8" | "utf8" => Some(SourceEncoding::Utf8),
            "windows-1252" | "cp1252" | "win-1252" => Some(SourceEncoding::Windows1252),
            "iso-8859-1" | "latin-1" | "latin1" | "iso8859-1" => Some(SourceEncoding::Latin1),
            _ => None,
        }
    }

    /// Decode the whole buffer, or None if any byte sequence is invalid.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            SourceEncoding::Utf8 => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                encoding_rs::UTF_8.decode_without_bom_handling_and_without_replacement(body)
            }
            SourceEncoding::Windows1252 => {
                if bytes.iter().any(|b| CP1252_UNDEFINED.contains(b)) {
                    return None;
                }
                encoding_rs::WINDOWS_1252.decode_without_bom_handling_and_without_replacement(bytes)
            }
            SourceEncoding::Latin1 => Some(encoding_rs::mem::decode_latin1(bytes)),
        }
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Text plus the encoding that produced it.
#[derive(Debug, Clone)]
pub struct DecodedUpload {
    pub text: String,
    pub encoding: SourceEncoding,
}

/// Try each candidate in order against the whole buffer.
///
/// Fails only when every candidate rejects the input; that aborts the upload.
pub fn resolve(bytes: &[u8], candidates: &[SourceEncoding]) -> IngestResult<DecodedUpload> {
    for encoding in candidates {
        match encoding.decode(bytes) {
            Some(text) => {
                debug!(encoding = encoding.label(), bytes = bytes.len(), "decoded upload");
                return Ok(DecodedUpload {
                    text: text.into_owned(),
                    encoding: *encoding,
                });
            }
            None => debug!(encoding = encoding.label(), "decode attempt failed"),
        }
    }

    Err(IngestError::EncodingResolution {
        tried: candidates.iter().map(|e| e.label().to_string()).collect(),
    })
}
