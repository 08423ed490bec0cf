//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2. The lexer works
//! over the whole file held in memory, so callers can seek to any offset
//! recorded in the cross-reference table.

use super::{ParseError, ParseOptions, ParseResult};

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Boolean: true or false
    Boolean(bool),

    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// String (literal or hexadecimal), already unescaped
    String(Vec<u8>),

    /// Name object (e.g., /Type), with `#xx` escapes decoded
    Name(String),

    /// Left square bracket [
    ArrayStart,

    /// Right square bracket ]
    ArrayEnd,

    /// Dictionary start <<
    DictStart,

    /// Dictionary end >>
    DictEnd,

    /// Stream keyword
    Stream,

    /// Endstream keyword
    EndStream,

    /// Obj keyword
    Obj,

    /// Endobj keyword
    EndObj,

    /// Xref keyword
    XRef,

    /// Trailer keyword
    Trailer,

    /// StartXRef keyword
    StartXRef,

    /// Reference marker `R`
    R,

    /// Null object
    Null,

    /// Comment (usually ignored)
    Comment(Vec<u8>),

    /// End of input
    Eof,
}

/// PDF whitespace characters (ISO 32000-1 Table 1)
pub(crate) fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

/// PDF delimiter characters (ISO 32000-1 Table 2)
pub(crate) fn is_delimiter(ch: u8) -> bool {
    matches!(
        ch,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// PDF Lexer for tokenizing PDF content
pub struct Lexer<'a> {
    data: &'a [u8],
    position: usize,
    token_buffer: Vec<Token>,
    options: ParseOptions,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self::new_with_options(data, ParseOptions::default())
    }

    /// Create a new lexer with custom parsing options
    pub fn new_with_options(data: &'a [u8], options: ParseOptions) -> Self {
        Self {
            data,
            position: 0,
            token_buffer: Vec::new(),
            options,
        }
    }

    /// Create a lexer positioned at `offset`
    pub fn at(data: &'a [u8], offset: usize, options: ParseOptions) -> Self {
        let mut lexer = Self::new_with_options(data, options);
        lexer.seek(offset);
        lexer
    }

    /// Parsing options in effect
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Get the next token
    pub fn next_token(&mut self) -> ParseResult<Token> {
        if let Some(token) = self.token_buffer.pop() {
            return Ok(token);
        }

        self.skip_whitespace();

        let ch = match self.peek_char() {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        match ch {
            b'%' => Ok(self.read_comment()),
            b'/' => self.read_name(),
            b'(' => self.read_literal_string(),
            b'<' => self.read_angle_bracket(),
            b'>' => {
                self.consume_char();
                if self.peek_char() == Some(b'>') {
                    self.consume_char();
                    Ok(Token::DictEnd)
                } else {
                    Err(ParseError::syntax(self.position, "Expected '>' after '>'"))
                }
            }
            b'[' => {
                self.consume_char();
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.consume_char();
                Ok(Token::ArrayEnd)
            }
            b'+' | b'-' | b'0'..=b'9' | b'.' => self.read_number(),
            _ if ch.is_ascii_alphabetic() => self.read_keyword(),
            _ => Err(ParseError::syntax(
                self.position,
                format!("Unexpected character: 0x{ch:02X}"),
            )),
        }
    }

    /// Return a token so the next call to `next_token` yields it again
    pub fn push_token(&mut self, token: Token) {
        self.token_buffer.push(token);
    }

    /// Look at the next token without consuming it
    pub fn peek_token(&mut self) -> ParseResult<Token> {
        let token = self.next_token()?;
        self.push_token(token.clone());
        Ok(token)
    }

    fn peek_char(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    fn consume_char(&mut self) -> Option<u8> {
        let ch = self.peek_char();
        if ch.is_some() {
            self.position += 1;
        }
        ch
    }

    /// Skip whitespace and return the number of bytes skipped
    pub fn skip_whitespace(&mut self) -> usize {
        let start = self.position;
        while let Some(ch) = self.peek_char() {
            if !is_whitespace(ch) {
                break;
            }
            self.position += 1;
        }
        self.position - start
    }

    /// Read a comment (from % to end of line)
    fn read_comment(&mut self) -> Token {
        self.consume_char(); // '%'
        let start = self.position;
        while let Some(ch) = self.peek_char() {
            if ch == b'\n' || ch == b'\r' {
                break;
            }
            self.position += 1;
        }
        Token::Comment(self.data[start..self.position].to_vec())
    }

    /// Read a name object (e.g., /Type)
    fn read_name(&mut self) -> ParseResult<Token> {
        self.consume_char(); // '/'
        let mut name = String::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.consume_char();

            // Handle hex codes in names (e.g., /A#20B means /A B)
            if ch == b'#' {
                let digits = self.data.get(self.position..self.position + 2);
                let value = digits
                    .and_then(|d| std::str::from_utf8(d).ok())
                    .and_then(|d| u8::from_str_radix(d, 16).ok());
                match value {
                    Some(value) => {
                        self.position += 2;
                        name.push(value as char);
                    }
                    None if self.options.lenient_syntax => name.push('#'),
                    None => {
                        return Err(ParseError::syntax(
                            self.position,
                            "Invalid hex code in name",
                        ))
                    }
                }
            } else {
                name.push(ch as char);
            }
        }

        Ok(Token::Name(name))
    }

    /// Read a literal string (parentheses)
    fn read_literal_string(&mut self) -> ParseResult<Token> {
        let start = self.position;
        self.consume_char(); // '('
        let mut string = Vec::new();
        let mut paren_depth = 1;

        while paren_depth > 0 {
            let ch = self
                .consume_char()
                .ok_or_else(|| ParseError::syntax(start, "Unterminated string"))?;

            match ch {
                b'\\' => {
                    let escaped = self
                        .consume_char()
                        .ok_or_else(|| ParseError::syntax(start, "Unterminated string"))?;
                    match escaped {
                        b'n' => string.push(b'\n'),
                        b'r' => string.push(b'\r'),
                        b't' => string.push(b'\t'),
                        b'b' => string.push(b'\x08'),
                        b'f' => string.push(b'\x0C'),
                        b'(' | b')' | b'\\' => string.push(escaped),
                        b'0'..=b'7' => {
                            let mut value = u32::from(escaped - b'0');
                            for _ in 0..2 {
                                match self.peek_char() {
                                    Some(next @ b'0'..=b'7') => {
                                        self.consume_char();
                                        value = value * 8 + u32::from(next - b'0');
                                    }
                                    _ => break,
                                }
                            }
                            // High-order overflow is ignored
                            string.push((value & 0xFF) as u8);
                        }
                        // Line continuation
                        b'\r' => {
                            if self.peek_char() == Some(b'\n') {
                                self.consume_char();
                            }
                        }
                        b'\n' => {}
                        other if self.options.lenient_syntax => {
                            tracing::warn!(
                                position = self.position - 1,
                                "unknown escape sequence \\{} in string, keeping the character",
                                other as char
                            );
                            string.push(other);
                        }
                        other => {
                            return Err(ParseError::syntax(
                                self.position - 1,
                                format!("Invalid escape sequence \\{}", other as char),
                            ))
                        }
                    }
                }
                b'(' => {
                    string.push(ch);
                    paren_depth += 1;
                }
                b')' => {
                    paren_depth -= 1;
                    if paren_depth > 0 {
                        string.push(ch);
                    }
                }
                // Unescaped end-of-line markers read as a single LF
                b'\r' => {
                    if self.peek_char() == Some(b'\n') {
                        self.consume_char();
                    }
                    string.push(b'\n');
                }
                _ => string.push(ch),
            }
        }

        Ok(Token::String(string))
    }

    /// Read angle bracket tokens (hex strings or dict markers)
    fn read_angle_bracket(&mut self) -> ParseResult<Token> {
        let start = self.position;
        self.consume_char(); // '<'

        if self.peek_char() == Some(b'<') {
            self.consume_char();
            return Ok(Token::DictStart);
        }

        let mut digits = Vec::new();
        loop {
            let ch = self
                .consume_char()
                .ok_or_else(|| ParseError::syntax(start, "Unterminated hex string"))?;
            if ch == b'>' {
                break;
            }
            if ch.is_ascii_hexdigit() {
                digits.push(ch);
            } else if !is_whitespace(ch) {
                return Err(ParseError::syntax(
                    self.position - 1,
                    "Invalid character in hex string",
                ));
            }
        }

        // Pad with 0 if odd number of digits
        if digits.len() % 2 != 0 {
            digits.push(b'0');
        }

        let bytes = digits
            .chunks(2)
            .map(|pair| (hex_value(pair[0]) << 4) | hex_value(pair[1]))
            .collect();

        Ok(Token::String(bytes))
    }

    /// Read a number (integer or real)
    fn read_number(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let mut has_dot = false;

        if let Some(b'+' | b'-') = self.peek_char() {
            self.consume_char();
        }

        while let Some(ch) = self.peek_char() {
            match ch {
                b'0'..=b'9' => {
                    self.consume_char();
                }
                b'.' if !has_dot => {
                    self.consume_char();
                    has_dot = true;
                }
                _ => break,
            }
        }

        let text = std::str::from_utf8(&self.data[start..self.position])
            .map_err(|_| ParseError::syntax(start, "Invalid number"))?;

        if has_dot {
            // "5." and ".5" are valid; a bare sign or dot is not
            let value = match text.trim_start_matches(['+', '-']) {
                "." | "" => None,
                _ => text.parse::<f64>().ok(),
            };
            value
                .map(Token::Real)
                .ok_or_else(|| ParseError::syntax(start, format!("Invalid real number: '{text}'")))
        } else {
            match text.parse::<i64>() {
                Ok(value) => Ok(Token::Integer(value)),
                // Out-of-range integers degrade to reals
                Err(_) if text.len() > 1 => text
                    .parse::<f64>()
                    .map(Token::Real)
                    .map_err(|_| ParseError::syntax(start, format!("Invalid integer: '{text}'"))),
                Err(_) => Err(ParseError::syntax(
                    start,
                    format!("Invalid integer: '{text}'"),
                )),
            }
        }
    }

    /// Read a keyword
    fn read_keyword(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let word = self.read_word();
        match word {
            b"true" => Ok(Token::Boolean(true)),
            b"false" => Ok(Token::Boolean(false)),
            b"null" => Ok(Token::Null),
            b"stream" => Ok(Token::Stream),
            b"endstream" => Ok(Token::EndStream),
            b"obj" => Ok(Token::Obj),
            b"endobj" => Ok(Token::EndObj),
            b"xref" => Ok(Token::XRef),
            b"trailer" => Ok(Token::Trailer),
            b"startxref" => Ok(Token::StartXRef),
            b"R" => Ok(Token::R),
            _ => Err(ParseError::syntax(
                start,
                format!("Unknown keyword: {}", String::from_utf8_lossy(word)),
            )),
        }
    }

    /// Read a word (sequence of regular characters)
    fn read_word(&mut self) -> &'a [u8] {
        let start = self.position;
        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.position += 1;
        }
        &self.data[start..self.position]
    }

    /// Read the end-of-line marker that follows the `stream` keyword.
    ///
    /// The marker is CRLF or LF; a lone CR is accepted in lenient mode.
    pub fn read_stream_newline(&mut self) -> ParseResult<()> {
        match self.peek_char() {
            Some(b'\r') => {
                self.consume_char();
                if self.peek_char() == Some(b'\n') {
                    self.consume_char();
                } else if !self.options.lenient_syntax {
                    return Err(ParseError::syntax(
                        self.position,
                        "Expected CRLF or LF after 'stream'",
                    ));
                }
                Ok(())
            }
            Some(b'\n') => {
                self.consume_char();
                Ok(())
            }
            _ if self.options.lenient_syntax => {
                // Some writers put spaces before the newline
                while let Some(b' ' | b'\t') = self.peek_char() {
                    self.consume_char();
                }
                match self.peek_char() {
                    Some(b'\r') => {
                        self.consume_char();
                        if self.peek_char() == Some(b'\n') {
                            self.consume_char();
                        }
                    }
                    Some(b'\n') => {
                        self.consume_char();
                    }
                    _ => {}
                }
                Ok(())
            }
            _ => Err(ParseError::syntax(
                self.position,
                "Expected newline after 'stream'",
            )),
        }
    }

    /// Read exactly `n` raw bytes
    pub fn read_bytes(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                ParseError::syntax(
                    self.position,
                    format!("Cannot read {n} bytes: only {} left", self.remaining()),
                )
            })?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Find the absolute offset of `keyword` at or after the current position,
    /// looking at most `max_bytes` ahead
    pub fn find_keyword_ahead(&self, keyword: &[u8], max_bytes: usize) -> Option<usize> {
        let end = self.position.saturating_add(max_bytes).min(self.data.len());
        find_bytes(&self.data[self.position..end], keyword).map(|i| self.position + i)
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move to an absolute offset, discarding pushed-back tokens
    pub fn seek(&mut self, offset: usize) {
        self.position = offset.min(self.data.len());
        self.token_buffer.clear();
    }

    /// Number of bytes left after the current position
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// The underlying input
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

/// Position of the first occurrence of `needle` in `haystack`
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Position of the last occurrence of `needle` in `haystack`
pub(crate) fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
