//! PDF Object Parser
//!
//! Parses PDF objects from tokens according to ISO 32000-1 Section 7.3

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseResult};
use indexmap::IndexMap;
use std::fmt;

/// Indirect object identifier: object number and generation number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    number: u32,
    generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// PDF Name object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PdfName(pub String);

/// PDF String object
#[derive(Debug, Clone, PartialEq)]
pub struct PdfString(pub Vec<u8>);

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

/// PDF Dictionary object. Keys keep the order in which they were read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub IndexMap<PdfName, PdfObject>);

/// PDF Stream object
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    pub data: Vec<u8>,
}

impl PdfStream {
    /// Get the decoded stream data
    pub fn decode(&self) -> ParseResult<Vec<u8>> {
        super::filters::decode_stream(&self.data, &self.dict)
    }

    /// Get the raw (possibly compressed) stream data
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }
}

/// PDF Object types
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Reference(ObjectId),
}

/// Looks up the value of an indirect `/Length` while a stream is being parsed.
///
/// Implementations must not go through the object cache: the stream that
/// needs the length may itself be in the middle of being loaded.
pub trait LengthResolver {
    fn resolve_length(&self, id: ObjectId) -> Option<usize>;
}

/// Resolver for inputs that cannot contain indirect lengths
pub struct NoLengthResolver;

impl LengthResolver for NoLengthResolver {
    fn resolve_length(&self, _id: ObjectId) -> Option<usize> {
        None
    }
}

impl PdfObject {
    /// Parse a PDF object from a lexer
    pub fn parse(lexer: &mut Lexer<'_>) -> ParseResult<Self> {
        Self::parse_with_resolver(lexer, &NoLengthResolver)
    }

    /// Parse a PDF object, resolving indirect stream lengths through `resolver`
    pub fn parse_with_resolver(
        lexer: &mut Lexer<'_>,
        resolver: &dyn LengthResolver,
    ) -> ParseResult<Self> {
        Self::parse_nested(lexer, resolver, 0)
    }

    fn parse_nested(
        lexer: &mut Lexer<'_>,
        resolver: &dyn LengthResolver,
        depth: usize,
    ) -> ParseResult<Self> {
        let token = lexer.next_token()?;
        Self::parse_from_token(lexer, token, resolver, depth)
    }

    /// Parse a PDF object starting from a specific token
    fn parse_from_token(
        lexer: &mut Lexer<'_>,
        token: Token,
        resolver: &dyn LengthResolver,
        depth: usize,
    ) -> ParseResult<Self> {
        if depth > lexer.options().max_depth {
            return Err(ParseError::syntax(
                lexer.position(),
                format!("Nesting deeper than {} levels", lexer.options().max_depth),
            ));
        }

        match token {
            Token::Null => Ok(PdfObject::Null),
            Token::Boolean(b) => Ok(PdfObject::Boolean(b)),
            Token::Integer(i) => Self::parse_integer_or_reference(lexer, i),
            Token::Real(r) => Ok(PdfObject::Real(r)),
            Token::String(s) => Ok(PdfObject::String(PdfString(s))),
            Token::Name(n) => Ok(PdfObject::Name(PdfName(n))),
            Token::ArrayStart => Self::parse_array(lexer, resolver, depth),
            Token::DictStart => Self::parse_dictionary_or_stream(lexer, resolver, depth),
            Token::Comment(_) => Self::parse_nested(lexer, resolver, depth),
            Token::Eof => Err(ParseError::syntax(
                lexer.position(),
                "Unexpected end of file",
            )),
            other => Err(ParseError::syntax(
                lexer.position(),
                format!("Expected PDF object, found {other:?}"),
            )),
        }
    }

    /// An integer may start an `N G R` reference; look two tokens ahead
    fn parse_integer_or_reference(lexer: &mut Lexer<'_>, value: i64) -> ParseResult<Self> {
        let second = lexer.next_token()?;
        if let Token::Integer(generation) = second {
            let third = lexer.next_token()?;
            if third == Token::R {
                let number = u32::try_from(value).map_err(|_| {
                    ParseError::syntax(lexer.position(), format!("Invalid object number {value}"))
                })?;
                let generation = u16::try_from(generation).map_err(|_| {
                    ParseError::syntax(
                        lexer.position(),
                        format!("Invalid generation number {generation}"),
                    )
                })?;
                return Ok(PdfObject::Reference(ObjectId::new(number, generation)));
            }
            lexer.push_token(third);
            lexer.push_token(Token::Integer(generation));
        } else {
            lexer.push_token(second);
        }
        Ok(PdfObject::Integer(value))
    }

    /// Parse a PDF array
    fn parse_array(
        lexer: &mut Lexer<'_>,
        resolver: &dyn LengthResolver,
        depth: usize,
    ) -> ParseResult<Self> {
        let mut elements = Vec::new();

        loop {
            let token = lexer.next_token()?;
            match token {
                Token::ArrayEnd => break,
                Token::Comment(_) => continue,
                Token::Eof => {
                    return Err(ParseError::syntax(lexer.position(), "Unterminated array"))
                }
                _ => elements.push(Self::parse_from_token(lexer, token, resolver, depth + 1)?),
            }
        }

        Ok(PdfObject::Array(PdfArray(elements)))
    }

    /// Parse a PDF dictionary and check if it's followed by a stream
    fn parse_dictionary_or_stream(
        lexer: &mut Lexer<'_>,
        resolver: &dyn LengthResolver,
        depth: usize,
    ) -> ParseResult<Self> {
        let dict = Self::parse_dictionary_inner(lexer, resolver, depth)?;

        loop {
            let token = lexer.next_token()?;
            match token {
                Token::Stream => {
                    let data = Self::parse_stream_data(lexer, &dict, resolver)?;
                    return Ok(PdfObject::Stream(PdfStream { dict, data }));
                }
                Token::Comment(_) => continue,
                _ => {
                    lexer.push_token(token);
                    return Ok(PdfObject::Dictionary(dict));
                }
            }
        }
    }

    /// Parse dictionary entries up to `>>`
    fn parse_dictionary_inner(
        lexer: &mut Lexer<'_>,
        resolver: &dyn LengthResolver,
        depth: usize,
    ) -> ParseResult<PdfDictionary> {
        let mut dict = PdfDictionary::new();

        loop {
            let token = lexer.next_token()?;
            match token {
                Token::DictEnd => break,
                Token::Comment(_) => continue,
                Token::Name(key) => {
                    let value = Self::parse_nested(lexer, resolver, depth + 1)?;
                    // Last duplicate wins
                    dict.0.insert(PdfName(key), value);
                }
                other => {
                    return Err(ParseError::syntax(
                        lexer.position(),
                        format!("Expected dictionary key or '>>', found {other:?}"),
                    ));
                }
            }
        }

        Ok(dict)
    }

    /// Read stream bytes after the `stream` keyword.
    ///
    /// The declared `/Length` is trusted when it lands on `endstream`.
    /// Otherwise (missing, unresolvable or wrong) the data runs up to the
    /// next `endstream` keyword.
    fn parse_stream_data(
        lexer: &mut Lexer<'_>,
        dict: &PdfDictionary,
        resolver: &dyn LengthResolver,
    ) -> ParseResult<Vec<u8>> {
        lexer.read_stream_newline()?;
        let start = lexer.position();
        let lenient = lexer.options().lenient_syntax;

        let declared = match dict.get("Length") {
            Some(PdfObject::Integer(len)) if *len >= 0 => Some(*len as usize),
            Some(PdfObject::Reference(id)) => {
                let resolved = resolver.resolve_length(*id);
                if resolved.is_none() {
                    tracing::debug!(
                        length_ref = %id,
                        "stream length not resolvable, scanning for endstream"
                    );
                }
                resolved
            }
            Some(_) | None if !lenient => {
                return Err(ParseError::syntax(
                    start,
                    "Stream dictionary has no valid /Length",
                ));
            }
            _ => None,
        };

        if let Some(length) = declared {
            if let Some(data) = Self::read_declared_length(lexer, length) {
                return Ok(data);
            }
            if !lenient && !matches!(dict.get("Length"), Some(PdfObject::Reference(_))) {
                return Err(ParseError::syntax(
                    start,
                    format!("Stream /Length {length} does not end at 'endstream'"),
                ));
            }
            tracing::warn!(
                position = start,
                length,
                "stream /Length does not match, scanning for endstream"
            );
            lexer.seek(start);
        }

        Self::scan_to_endstream(lexer, start)
    }

    fn read_declared_length(lexer: &mut Lexer<'_>, length: usize) -> Option<Vec<u8>> {
        let start = lexer.position();
        let data = lexer.read_bytes(length).ok()?.to_vec();
        lexer.skip_whitespace();
        match lexer.next_token() {
            Ok(Token::EndStream) => Some(data),
            _ => {
                lexer.seek(start);
                None
            }
        }
    }

    fn scan_to_endstream(lexer: &mut Lexer<'_>, start: usize) -> ParseResult<Vec<u8>> {
        let end = lexer
            .find_keyword_ahead(b"endstream", usize::MAX)
            .ok_or_else(|| ParseError::syntax(start, "Unterminated stream: no 'endstream'"))?;

        let data = lexer.data();
        let mut data_end = end;
        // The EOL before endstream is not part of the data
        if data_end > start && data[data_end - 1] == b'\n' {
            data_end -= 1;
        }
        if data_end > start && data[data_end - 1] == b'\r' {
            data_end -= 1;
        }

        let bytes = data[start..data_end].to_vec();
        lexer.seek(end + b"endstream".len());
        Ok(bytes)
    }

    /// Parse `N G obj <object> endobj` at the lexer position
    pub fn parse_indirect(
        lexer: &mut Lexer<'_>,
        resolver: &dyn LengthResolver,
    ) -> ParseResult<(ObjectId, Self)> {
        let start = lexer.position();
        let header_error = || ParseError::syntax(start, "Expected 'N G obj' object header");

        let number = match lexer.next_token()? {
            Token::Integer(n) => u32::try_from(n).map_err(|_| header_error())?,
            _ => return Err(header_error()),
        };
        let generation = match lexer.next_token()? {
            Token::Integer(g) => u16::try_from(g).map_err(|_| header_error())?,
            _ => return Err(header_error()),
        };
        if lexer.next_token()? != Token::Obj {
            return Err(header_error());
        }

        let object = Self::parse_with_resolver(lexer, resolver)?;

        match lexer.next_token()? {
            Token::EndObj => {}
            other if lexer.options().lenient_syntax => {
                tracing::warn!(
                    object = number,
                    found = ?other,
                    "missing 'endobj', continuing"
                );
            }
            other => {
                return Err(ParseError::syntax(
                    lexer.position(),
                    format!(
                        "Expected 'endobj' after object {number} {generation}, found {other:?}"
                    ),
                ))
            }
        }

        Ok((ObjectId::new(number, generation), object))
    }

    /// Check if this object is null
    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as real number
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Real(r) => Some(*r),
            PdfObject::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as name
    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as dictionary (a stream's dictionary counts)
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Get as reference
    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            PdfObject::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Append every indirect reference contained in this object, depth first
    pub fn collect_references(&self, out: &mut Vec<ObjectId>) {
        match self {
            PdfObject::Reference(id) => out.push(*id),
            PdfObject::Array(array) => {
                for item in &array.0 {
                    item.collect_references(out);
                }
            }
            PdfObject::Dictionary(dict) => dict.collect_references(out),
            PdfObject::Stream(stream) => stream.dict.collect_references(out),
            _ => {}
        }
    }
}

impl PdfDictionary {
    /// Create a new empty dictionary
    pub fn new() -> Self {
        PdfDictionary(IndexMap::new())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(&PdfName(key.to_string()))
    }

    /// Insert a key-value pair, replacing any previous value for the key
    pub fn insert(&mut self, key: impl Into<String>, value: PdfObject) {
        self.0.insert(PdfName(key.into()), value);
    }

    /// Remove a key, keeping the order of the remaining entries
    pub fn remove(&mut self, key: &str) -> Option<PdfObject> {
        self.0.shift_remove(&PdfName(key.to_string()))
    }

    /// Check if dictionary contains a key
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&PdfName(key.to_string()))
    }

    /// Get the dictionary type (value of /Type key)
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(|obj| obj.as_name()).map(|n| n.as_str())
    }

    /// Iterate entries in encounter order
    pub fn iter(&self) -> impl Iterator<Item = (&PdfName, &PdfObject)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn collect_references(&self, out: &mut Vec<ObjectId>) {
        for value in self.0.values() {
            value.collect_references(out);
        }
    }
}

impl PdfArray {
    /// Create a new empty array
    pub fn new() -> Self {
        PdfArray(Vec::new())
    }

    /// Get array length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if array is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get element at index
    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    /// Push an element
    pub fn push(&mut self, obj: PdfObject) {
        self.0.push(obj);
    }
}

impl PdfString {
    pub fn new(data: Vec<u8>) -> Self {
        PdfString(data)
    }

    /// Get as UTF-8 string if possible
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl PdfName {
    pub fn new(name: impl Into<String>) -> Self {
        PdfName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
