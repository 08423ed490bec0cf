//! PDF Parser Module
//!
//! Reads a PDF file into an object graph that can be navigated lazily:
//! tokens, objects, cross-reference data, object streams and the page tree.
//! Only the structure needed to carry pages forward is interpreted; content
//! streams are kept as raw bytes.

pub mod document;
pub mod filters;
pub mod header;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod page_tree;
pub mod reader;
pub mod xref;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use self::document::{DocumentMetadata, PdfDocument};
pub use self::objects::{
    ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString,
};
pub use self::page_tree::{PageNode, ParsedPage};
pub use self::reader::PdfReader;

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed syntax at byte {position}: {message}")]
    MalformedSyntax { position: usize, message: String },

    #[error("Unresolved reference: {0} {1} R")]
    UnresolvedReference(u32, u16),

    #[error("Invalid page tree: {0}")]
    InvalidPageTree(String),
}

impl ParseError {
    /// Shorthand for a syntax error at a byte position
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        ParseError::MalformedSyntax {
            position,
            message: message.into(),
        }
    }
}

/// Parsing behaviour switches
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Accept recoverable deviations from the PDF syntax (unknown string
    /// escapes, wrong stream lengths, broken xref offsets) instead of failing
    pub lenient_syntax: bool,
    /// Maximum nesting depth of arrays and dictionaries
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParseOptions {
    /// Reject anything that does not follow the PDF syntax
    pub fn strict() -> Self {
        Self {
            lenient_syntax: false,
            max_depth: 256,
        }
    }

    /// Recover from common writer mistakes, logging each recovery
    pub fn lenient() -> Self {
        Self {
            lenient_syntax: true,
            max_depth: 256,
        }
    }
}
