//! High-level PDF Reader API
//!
//! Holds the whole input in memory and loads objects on demand through the
//! cross-reference table. Every object is parsed at most once per reader.

use super::header::{PdfHeader, PdfVersion};
use super::lexer::Lexer;
use super::object_stream::ObjectStream;
use super::objects::{LengthResolver, NoLengthResolver, ObjectId, PdfDictionary, PdfObject};
use super::xref::{XRefEntry, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::HashMap;
use std::path::Path;

/// References followed in a row before giving up (`1 0 R` -> `2 0 R` -> ...)
const MAX_REFERENCE_CHAIN: usize = 32;

/// PDF Reader for random access to the objects of one file
pub struct PdfReader {
    data: Vec<u8>,
    header: PdfHeader,
    xref: XRefTable,
    /// Parsed objects keyed by object number
    object_cache: HashMap<u32, PdfObject>,
    /// Decoded object streams keyed by their object number
    object_stream_cache: HashMap<u32, ObjectStream>,
    options: ParseOptions,
}

/// Resolves indirect `/Length` values straight from their xref offsets
struct DirectLengths<'r> {
    data: &'r [u8],
    xref: &'r XRefTable,
    options: &'r ParseOptions,
}

impl LengthResolver for DirectLengths<'_> {
    fn resolve_length(&self, id: ObjectId) -> Option<usize> {
        let XRefEntry::InUse { offset, .. } = self.xref.get(id.number())? else {
            return None;
        };
        let mut lexer = Lexer::at(self.data, *offset, self.options.clone());
        let (_, object) = PdfObject::parse_indirect(&mut lexer, &NoLengthResolver).ok()?;
        object
            .as_integer()
            .filter(|n| *n >= 0)
            .map(|n| n as usize)
    }
}

impl PdfReader {
    /// Open a PDF file with lenient parsing
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Self::open_with_options(path, ParseOptions::lenient())
    }

    /// Open a PDF file with strict parsing
    pub fn open_strict<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Self::open_with_options(path, ParseOptions::strict())
    }

    /// Open a PDF file; the whole file is read before parsing starts
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> ParseResult<Self> {
        let data = std::fs::read(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), bytes = data.len(), "read input file");
        Self::from_bytes(data, options)
    }

    /// Create a reader over an in-memory PDF
    pub fn from_bytes(data: Vec<u8>, options: ParseOptions) -> ParseResult<Self> {
        if data.is_empty() {
            return Err(ParseError::syntax(0, "Empty file"));
        }

        let header = PdfHeader::parse(&data, options.lenient_syntax)?;
        let xref = XRefTable::parse(&data, &options)?;

        tracing::debug!(
            version = %header.version,
            objects = xref.len(),
            reconstructed = xref.is_reconstructed(),
            "loaded cross-reference data"
        );

        Ok(Self {
            data,
            header,
            xref,
            object_cache: HashMap::new(),
            object_stream_cache: HashMap::new(),
            options,
        })
    }

    /// Get the PDF version
    pub fn version(&self) -> PdfVersion {
        self.header.version
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// The newest trailer dictionary
    pub fn trailer(&self) -> &PdfDictionary {
        self.xref.trailer()
    }

    /// Number of entries in the cross-reference table
    pub fn object_count(&self) -> usize {
        self.xref.len()
    }

    /// Get the document catalog
    pub fn catalog(&mut self) -> ParseResult<&PdfDictionary> {
        let root = self
            .trailer()
            .get("Root")
            .and_then(|r| r.as_reference())
            .ok_or_else(|| ParseError::syntax(0, "Trailer /Root is not a reference"))?;

        self.get_object(root)?
            .as_dict()
            .ok_or_else(|| ParseError::syntax(0, format!("Catalog {root} is not a dictionary")))
    }

    /// Get the document info dictionary, if present and resolvable
    pub fn info(&mut self) -> ParseResult<Option<&PdfDictionary>> {
        let Some(id) = self.trailer().get("Info").and_then(|i| i.as_reference()) else {
            return Ok(None);
        };
        match self.get_object(id) {
            Ok(object) => Ok(object.as_dict()),
            Err(ParseError::UnresolvedReference(..)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Get an object by reference, loading and caching it on first access
    pub fn get_object(&mut self, id: ObjectId) -> ParseResult<&PdfObject> {
        let number = id.number();
        if !self.object_cache.contains_key(&number) {
            let object = self.load_object(id)?;
            self.object_cache.insert(number, object);
        }
        self.object_cache
            .get(&number)
            .ok_or(ParseError::UnresolvedReference(number, id.generation()))
    }

    /// Follow references until a direct object is reached
    pub fn resolve(&mut self, object: &PdfObject) -> ParseResult<PdfObject> {
        let mut current = object.clone();
        for _ in 0..MAX_REFERENCE_CHAIN {
            match current {
                PdfObject::Reference(id) => current = self.get_object(id)?.clone(),
                direct => return Ok(direct),
            }
        }
        Err(ParseError::syntax(0, "Reference chain too long"))
    }

    fn load_object(&mut self, id: ObjectId) -> ParseResult<PdfObject> {
        let unresolved = ParseError::UnresolvedReference(id.number(), id.generation());
        let entry = *self.xref.get(id.number()).ok_or(unresolved)?;

        match entry {
            XRefEntry::Free { .. } => Ok(PdfObject::Null),
            XRefEntry::InUse { offset, generation } => {
                if generation != id.generation() {
                    if !self.options.lenient_syntax {
                        return Err(ParseError::UnresolvedReference(id.number(), id.generation()));
                    }
                    tracing::warn!(
                        object = %id,
                        found = generation,
                        "generation mismatch, using stored object"
                    );
                }

                match self.parse_at(offset, id) {
                    Ok(object) => Ok(object),
                    Err(e) if self.options.lenient_syntax && !self.xref.is_reconstructed() => {
                        tracing::warn!(
                            object = %id,
                            offset,
                            error = %e,
                            "object not at its xref offset, rebuilding table"
                        );
                        self.xref = XRefTable::reconstruct(&self.data, &self.options)?;
                        self.object_stream_cache.clear();
                        self.load_object(id)
                    }
                    Err(e) => Err(e),
                }
            }
            XRefEntry::Compressed { stream, index } => self.load_compressed(id, stream, index),
        }
    }

    /// Parse `N G obj ... endobj` at `offset`, checking it is the object asked for
    fn parse_at(&self, offset: usize, id: ObjectId) -> ParseResult<PdfObject> {
        let resolver = DirectLengths {
            data: &self.data,
            xref: &self.xref,
            options: &self.options,
        };

        let attempt = |offset: usize| -> ParseResult<PdfObject> {
            let mut lexer = Lexer::at(&self.data, offset, self.options.clone());
            let (found, object) = PdfObject::parse_indirect(&mut lexer, &resolver)?;
            if found.number() != id.number() {
                return Err(ParseError::syntax(
                    offset,
                    format!("Expected object {} at offset, found {}", id.number(), found.number()),
                ));
            }
            Ok(object)
        };

        match attempt(offset) {
            // Offsets written relative to the %PDF- marker when junk precedes it
            Err(_) if self.header.offset > 0 => attempt(offset + self.header.offset),
            result => result,
        }
    }

    fn load_compressed(&mut self, id: ObjectId, stream: u32, index: u32) -> ParseResult<PdfObject> {
        if !self.object_stream_cache.contains_key(&stream) {
            let offset = match self.xref.get(stream) {
                Some(XRefEntry::InUse { offset, .. }) => *offset,
                _ => {
                    return Err(ParseError::syntax(
                        0,
                        format!(
                            "Object stream {stream} for object {} is not stored directly",
                            id.number()
                        ),
                    ))
                }
            };
            let container = self.parse_at(offset, ObjectId::new(stream, 0))?;
            let container = container.as_stream().ok_or_else(|| {
                ParseError::syntax(offset, format!("Object {stream} is not an object stream"))
            })?;
            let parsed = ObjectStream::parse(container, &self.options)?;
            tracing::debug!(stream, objects = parsed.len(), "decoded object stream");
            self.object_stream_cache.insert(stream, parsed);
        }

        let unresolved = || ParseError::UnresolvedReference(id.number(), id.generation());
        let container = self.object_stream_cache.get(&stream).ok_or_else(unresolved)?;
        match container.get(index) {
            Some((number, object)) if number == id.number() => Ok(object.clone()),
            _ => container.find(id.number()).cloned().ok_or_else(unresolved),
        }
    }

    /// Convert into a document with page-level access
    pub fn into_document(self) -> super::document::PdfDocument {
        super::document::PdfDocument::new(self)
    }
}
