//! PDF Object Stream Parser
//!
//! Handles compressed objects stored in object streams (PDF 1.5+)

use super::lexer::{Lexer, Token};
use super::objects::{NoLengthResolver, PdfObject, PdfStream};
use super::{ParseError, ParseOptions, ParseResult};

/// A decoded `/Type /ObjStm` stream
#[derive(Debug)]
pub struct ObjectStream {
    /// Objects in stream order as (object number, object)
    objects: Vec<(u32, PdfObject)>,
}

impl ObjectStream {
    /// Read the `N` pairs of (object number, relative offset) at the start
    /// of the decoded data
    pub fn read_header(stream: &PdfStream) -> ParseResult<Vec<(u32, usize)>> {
        let (_, header) = Self::decode_with_header(stream, &ParseOptions::lenient())?;
        Ok(header)
    }

    fn decode_with_header(
        stream: &PdfStream,
        options: &ParseOptions,
    ) -> ParseResult<(Vec<u8>, Vec<(u32, usize)>)> {
        let dict = &stream.dict;
        let count = dict
            .get("N")
            .and_then(|o| o.as_integer())
            .filter(|n| *n >= 0)
            .ok_or_else(|| ParseError::syntax(0, "Object stream has no valid /N"))?;

        let data = stream.decode()?;
        let mut lexer = Lexer::new_with_options(&data, options.clone());
        // Each header pair takes at least four bytes ("1 0 "), which bounds /N
        let mut header = Vec::with_capacity(count.min(data.len() as i64 / 4) as usize);

        for _ in 0..count {
            let pair = (lexer.next_token()?, lexer.next_token()?);
            match pair {
                (Token::Integer(number), Token::Integer(offset)) if number >= 0 && offset >= 0 => {
                    header.push((number as u32, offset as usize));
                }
                _ => {
                    return Err(ParseError::syntax(
                        lexer.position(),
                        "Expected object number and offset in object stream header",
                    ))
                }
            }
        }

        Ok((data, header))
    }

    /// Decode the stream and parse every object it contains
    pub fn parse(stream: &PdfStream, options: &ParseOptions) -> ParseResult<Self> {
        let first = stream
            .dict
            .get("First")
            .and_then(|o| o.as_integer())
            .filter(|n| *n >= 0)
            .ok_or_else(|| ParseError::syntax(0, "Object stream has no valid /First"))?
            as usize;

        let (data, header) = Self::decode_with_header(stream, options)?;

        let mut objects = Vec::with_capacity(header.len());
        for (number, offset) in header {
            let mut lexer = Lexer::at(&data, first + offset, options.clone());
            let object = PdfObject::parse_with_resolver(&mut lexer, &NoLengthResolver)?;
            objects.push((number, object));
        }

        Ok(Self { objects })
    }

    /// Object at a position in the stream, with its object number
    pub fn get(&self, index: u32) -> Option<(u32, &PdfObject)> {
        self.objects
            .get(index as usize)
            .map(|(number, object)| (*number, object))
    }

    /// Object by its object number
    pub fn find(&self, number: u32) -> Option<&PdfObject> {
        self.objects
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, object)| object)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::PdfDictionary;

    fn object_stream(body: &[u8], n: i64, first: i64) -> PdfStream {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(crate::parser::PdfName::new("ObjStm")));
        dict.insert("N", PdfObject::Integer(n));
        dict.insert("First", PdfObject::Integer(first));
        PdfStream {
            dict,
            data: body.to_vec(),
        }
    }

    #[test]
    fn test_parse_object_stream() {
        let body = b"10 0 11 6 42    << /Type /Page >>";
        let stream = object_stream(body, 2, 9);
        let parsed = ObjectStream::parse(&stream, &ParseOptions::strict()).unwrap();

        assert_eq!(parsed.len(), 2);
        let (number, first) = parsed.get(0).unwrap();
        assert_eq!(number, 10);
        assert_eq!(first.as_integer(), Some(42));
        assert_eq!(
            parsed.find(11).unwrap().as_dict().unwrap().get_type(),
            Some("Page")
        );
        assert!(parsed.get(2).is_none());
    }

    #[test]
    fn test_read_header() {
        let stream = object_stream(b"5 0 6 3 1 2", 2, 8);
        let header = ObjectStream::read_header(&stream).unwrap();
        assert_eq!(header, vec![(5, 0), (6, 3)]);
    }

    #[test]
    fn test_missing_first() {
        let mut stream = object_stream(b"1 0 null", 1, 4);
        stream.dict.remove("First");
        assert!(ObjectStream::parse(&stream, &ParseOptions::lenient()).is_err());
    }

    #[test]
    fn test_oversized_object_count() {
        let stream = object_stream(b"1 0 ", 1_000_000_000_000_000, 4);
        assert!(matches!(
            ObjectStream::read_header(&stream),
            Err(ParseError::MalformedSyntax { .. })
        ));
        assert!(ObjectStream::parse(&stream, &ParseOptions::lenient()).is_err());
    }

    #[test]
    fn test_truncated_header() {
        let stream = object_stream(b"1 0", 2, 4);
        assert!(ObjectStream::parse(&stream, &ParseOptions::lenient()).is_err());
    }
}
