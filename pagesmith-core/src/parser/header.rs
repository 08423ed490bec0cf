//! PDF Header Parser
//!
//! Parses PDF header and version according to ISO 32000-1 Section 7.5.2

use super::lexer::find_bytes;
use super::{ParseError, ParseResult};

/// How far into the file the `%PDF-` marker may appear
const HEADER_SEARCH_WINDOW: usize = 1024;

/// PDF Version information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Check if this version is supported
    pub fn is_supported(&self) -> bool {
        matches!((self.major, self.minor), (1, 0..=7) | (2, 0))
    }
}

impl Default for PdfVersion {
    fn default() -> Self {
        Self::new(1, 7)
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// PDF Header information
#[derive(Debug, Clone, Copy)]
pub struct PdfHeader {
    pub version: PdfVersion,
    /// Byte offset of `%PDF-` (non-zero when the file has leading junk)
    pub offset: usize,
}

impl PdfHeader {
    /// Find and parse the `%PDF-x.y` marker
    pub fn parse(data: &[u8], lenient: bool) -> ParseResult<Self> {
        let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
        let offset = find_bytes(window, b"%PDF-")
            .ok_or_else(|| ParseError::syntax(0, "Missing %PDF- header"))?;

        if offset > 0 && !lenient {
            return Err(ParseError::syntax(
                0,
                format!("{offset} bytes of garbage before %PDF- header"),
            ));
        }

        let version_start = offset + b"%PDF-".len();
        let version = Self::parse_version(&data[version_start..])
            .ok_or_else(|| ParseError::syntax(version_start, "Invalid PDF version number"))?;

        if !version.is_supported() {
            tracing::warn!(%version, "unusual PDF version, continuing");
        }

        Ok(Self { version, offset })
    }

    fn parse_version(bytes: &[u8]) -> Option<PdfVersion> {
        let major = bytes.first().filter(|b| b.is_ascii_digit())? - b'0';
        if bytes.get(1) != Some(&b'.') {
            return None;
        }
        let minor = bytes.get(2).filter(|b| b.is_ascii_digit())? - b'0';
        Some(PdfVersion::new(major, minor))
    }
}
