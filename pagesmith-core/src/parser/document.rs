//! PDF Document wrapper - high-level interface over [`PdfReader`]
//!
//! `PdfDocument` hands out owned copies of objects so callers can keep
//! them while asking for more. The reader and the flattened page tree live
//! behind `RefCell`s, which lets every accessor take `&self` while objects
//! are still parsed lazily and memoized.
//!
//! # Example
//!
//! ```rust,no_run
//! use pagesmith::parser::PdfDocument;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = PdfDocument::open("document.pdf")?;
//! println!("Pages: {}", document.page_count()?);
//!
//! let metadata = document.metadata()?;
//! println!("Title: {:?}", metadata.title);
//! # Ok(())
//! # }
//! ```

use super::header::PdfVersion;
use super::objects::{ObjectId, PdfDictionary, PdfObject};
use super::page_tree::{PageTree, ParsedPage};
use super::reader::PdfReader;
use super::{ParseError, ParseOptions, ParseResult};
use std::cell::RefCell;
use std::path::Path;

/// Document information from the `/Info` dictionary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub version: String,
    pub page_count: Option<usize>,
}

/// A parsed PDF with lazy object resolution and page access
pub struct PdfDocument {
    reader: RefCell<PdfReader>,
    page_tree: RefCell<Option<PageTree>>,
}

impl PdfDocument {
    /// Wrap a reader
    pub fn new(reader: PdfReader) -> Self {
        Self {
            reader: RefCell::new(reader),
            page_tree: RefCell::new(None),
        }
    }

    /// Open a file with lenient parsing
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Ok(Self::new(PdfReader::open(path)?))
    }

    /// Open a file with explicit parse options
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> ParseResult<Self> {
        Ok(Self::new(PdfReader::open_with_options(path, options)?))
    }

    /// Header version of the input
    pub fn version(&self) -> PdfVersion {
        self.reader.borrow().version()
    }

    /// Copy of the trailer dictionary
    pub fn trailer(&self) -> PdfDictionary {
        self.reader.borrow().trailer().clone()
    }

    /// Copy of the document catalog
    pub fn catalog(&self) -> ParseResult<PdfDictionary> {
        self.reader.borrow_mut().catalog().cloned()
    }

    /// Copy of the info dictionary, if any
    pub fn info(&self) -> ParseResult<Option<PdfDictionary>> {
        Ok(self.reader.borrow_mut().info()?.cloned())
    }

    /// Load an object by reference
    pub fn get_object(&self, id: ObjectId) -> ParseResult<PdfObject> {
        self.reader.borrow_mut().get_object(id).cloned()
    }

    /// Resolve a possibly indirect object. Fails with `UnresolvedReference`
    /// when the target does not exist.
    pub fn resolve(&self, object: &PdfObject) -> ParseResult<PdfObject> {
        self.reader.borrow_mut().resolve(object)
    }

    /// Resolve for optional lookups: a dangling reference reads as `null`
    pub fn resolve_or_null(&self, object: &PdfObject) -> ParseResult<PdfObject> {
        match self.resolve(object) {
            Err(ParseError::UnresolvedReference(number, generation)) => {
                tracing::debug!(number, generation, "dangling reference treated as null");
                Ok(PdfObject::Null)
            }
            other => other,
        }
    }

    fn ensure_page_tree(&self) -> ParseResult<()> {
        if self.page_tree.borrow().is_none() {
            let tree = PageTree::load(&mut self.reader.borrow_mut())?;
            *self.page_tree.borrow_mut() = Some(tree);
        }
        Ok(())
    }

    fn with_page_tree<T>(&self, f: impl FnOnce(&PageTree) -> T) -> ParseResult<T> {
        self.ensure_page_tree()?;
        let guard = self.page_tree.borrow();
        let tree = guard
            .as_ref()
            .ok_or_else(|| ParseError::InvalidPageTree("page tree not loaded".to_string()))?;
        Ok(f(tree))
    }

    /// Number of leaf pages
    pub fn page_count(&self) -> ParseResult<usize> {
        self.with_page_tree(|tree| tree.len())
    }

    /// Page at a 0-based index, `None` past the end
    pub fn page_at(&self, index: usize) -> ParseResult<Option<ParsedPage>> {
        self.with_page_tree(|tree| tree.get(index).cloned())
    }

    /// All pages in document order
    pub fn pages(&self) -> ParseResult<Vec<ParsedPage>> {
        self.with_page_tree(|tree| tree.pages().to_vec())
    }

    /// Title, author and friends from `/Info`, plus version and page count
    pub fn metadata(&self) -> ParseResult<DocumentMetadata> {
        let mut metadata = DocumentMetadata {
            version: self.version().to_string(),
            page_count: self.page_count().ok(),
            ..Default::default()
        };

        if let Some(info) = self.info()? {
            let text = |key: &str| -> ParseResult<Option<String>> {
                let Some(value) = info.get(key) else {
                    return Ok(None);
                };
                Ok(self
                    .resolve_or_null(value)?
                    .as_string()
                    .map(|s| decode_text_string(s.as_bytes())))
            };
            metadata.title = text("Title")?;
            metadata.author = text("Author")?;
            metadata.subject = text("Subject")?;
            metadata.keywords = text("Keywords")?;
            metadata.creator = text("Creator")?;
            metadata.producer = text("Producer")?;
        }

        Ok(metadata)
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, UTF-8 with BOM, otherwise
/// one byte per character
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(utf8).into_owned()
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}
