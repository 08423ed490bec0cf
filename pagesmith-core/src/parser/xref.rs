//! PDF Cross-Reference Parser
//!
//! Parses classic xref tables and cross-reference streams (ISO 32000-1
//! Sections 7.5.4 and 7.5.8), follows the `/Prev` chain of incremental
//! updates and, for damaged files, rebuilds the table by scanning for
//! `N G obj` headers.

use super::lexer::{find_bytes, is_delimiter, is_whitespace, rfind_bytes, Lexer, Token};
use super::object_stream::ObjectStream;
use super::objects::{NoLengthResolver, PdfDictionary, PdfObject, PdfStream};
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::{HashMap, HashSet};

/// How far from the end of the file `startxref` is searched for
const STARTXREF_WINDOW: usize = 1024;

/// Cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free object
    Free { next: u32, generation: u16 },
    /// Object stored directly in the file at a byte offset
    InUse { offset: usize, generation: u16 },
    /// Object stored inside an object stream
    Compressed { stream: u32, index: u32 },
}

impl XRefEntry {
    /// Generation number; objects in object streams always have generation 0
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => {
                *generation
            }
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

/// One xref section together with its trailer
struct XRefSection {
    entries: Vec<(u32, XRefEntry)>,
    trailer: PdfDictionary,
}

/// Merged cross-reference table
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: PdfDictionary,
    reconstructed: bool,
}

impl XRefTable {
    /// Locate `startxref` and load the whole chain of xref sections.
    ///
    /// In lenient mode a missing or unreadable chain falls back to
    /// [`XRefTable::reconstruct`].
    pub fn parse(data: &[u8], options: &ParseOptions) -> ParseResult<Self> {
        let loaded =
            Self::find_startxref(data).and_then(|offset| Self::load_chain(data, offset, options));

        match loaded {
            Ok(table) if table.trailer.contains_key("Root") => Ok(table),
            Ok(_) if options.lenient_syntax => {
                tracing::warn!("trailer has no /Root, reconstructing cross-reference table");
                Self::reconstruct(data, options)
            }
            Ok(_) => Err(ParseError::syntax(0, "Trailer has no /Root entry")),
            Err(e) if options.lenient_syntax => {
                tracing::warn!(error = %e, "cross-reference data unreadable, reconstructing");
                Self::reconstruct(data, options)
            }
            Err(e) => Err(e),
        }
    }

    /// Find the offset stored after the last `startxref` keyword
    fn find_startxref(data: &[u8]) -> ParseResult<usize> {
        let tail_start = data.len().saturating_sub(STARTXREF_WINDOW);
        let keyword = rfind_bytes(&data[tail_start..], b"startxref")
            .map(|i| tail_start + i)
            .ok_or_else(|| ParseError::syntax(data.len(), "No 'startxref' near end of file"))?;

        let mut lexer = Lexer::new(data);
        lexer.seek(keyword + b"startxref".len());
        match lexer.next_token()? {
            Token::Integer(offset) if offset >= 0 && (offset as usize) < data.len() => {
                Ok(offset as usize)
            }
            other => Err(ParseError::syntax(
                keyword,
                format!("Invalid startxref offset: {other:?}"),
            )),
        }
    }

    /// Follow `/Prev` links from the newest section; newer entries win
    fn load_chain(data: &[u8], start: usize, options: &ParseOptions) -> ParseResult<Self> {
        let mut table = XRefTable::default();
        let mut visited = HashSet::new();
        let mut next = Some(start);
        let mut newest = true;

        while let Some(offset) = next.take() {
            if !visited.insert(offset) {
                tracing::warn!(offset, "cycle in /Prev chain, stopping");
                break;
            }

            let section = Self::parse_section(data, offset, options)?;

            next = section
                .trailer
                .get("Prev")
                .and_then(|p| p.as_integer())
                .filter(|p| *p >= 0)
                .map(|p| p as usize);

            // Hybrid file: the stream referenced by /XRefStm supplements this section
            let mut entries = section.entries;
            if let Some(stm) = section.trailer.get("XRefStm").and_then(|o| o.as_integer()) {
                match Self::parse_section(data, stm as usize, options) {
                    Ok(hybrid) => {
                        entries.retain(|(num, entry)| {
                            !matches!(entry, XRefEntry::Free { .. })
                                || !hybrid.entries.iter().any(|(n, _)| n == num)
                        });
                        entries.extend(hybrid.entries);
                    }
                    Err(e) if options.lenient_syntax => {
                        tracing::warn!(offset = stm, error = %e, "ignoring unreadable /XRefStm");
                    }
                    Err(e) => return Err(e),
                }
            }

            for (number, entry) in entries {
                table.entries.entry(number).or_insert(entry);
            }

            if newest {
                table.trailer = section.trailer;
                newest = false;
            } else {
                for (key, value) in section.trailer.iter() {
                    if !table.trailer.0.contains_key(key) {
                        table.trailer.0.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        table.trailer.remove("Prev");
        table.trailer.remove("XRefStm");
        Ok(table)
    }

    /// Parse a classic `xref` table or an xref stream object at `offset`
    fn parse_section(
        data: &[u8],
        offset: usize,
        options: &ParseOptions,
    ) -> ParseResult<XRefSection> {
        let mut lexer = Lexer::at(data, offset, options.clone());
        lexer.skip_whitespace();
        if data[lexer.position()..].starts_with(b"xref") {
            Self::parse_table(data, lexer.position() + b"xref".len(), options)
        } else {
            let (_, object) = PdfObject::parse_indirect(&mut lexer, &NoLengthResolver)?;
            match object {
                PdfObject::Stream(stream) if stream.dict.get_type() == Some("XRef") => {
                    Self::parse_stream(&stream)
                }
                _ => Err(ParseError::syntax(
                    offset,
                    "Expected 'xref' table or /Type /XRef stream",
                )),
            }
        }
    }

    /// Parse the subsections of a classic table up to `trailer`
    fn parse_table(
        data: &[u8],
        mut pos: usize,
        options: &ParseOptions,
    ) -> ParseResult<XRefSection> {
        let mut entries = Vec::new();

        loop {
            let word_start = skip_ws(data, pos);
            if data[word_start..].starts_with(b"trailer") {
                pos = word_start + b"trailer".len();
                break;
            }

            let first = read_number(data, &mut pos)?;
            let count = read_number(data, &mut pos)?;

            for i in 0..count {
                let entry_start = skip_ws(data, pos);
                let offset = read_number(data, &mut pos)?;
                let generation = read_number(data, &mut pos)?;
                let flag_pos = skip_ws(data, pos);
                pos = flag_pos + 1;

                let generation = u16::try_from(generation).map_err(|_| {
                    ParseError::syntax(entry_start, "Generation number out of range")
                })?;
                let number = first
                    .checked_add(i)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| ParseError::syntax(entry_start, "Object number out of range"))?;

                let entry = match data.get(flag_pos) {
                    Some(b'n') => XRefEntry::InUse {
                        offset: offset as usize,
                        generation,
                    },
                    Some(b'f') => XRefEntry::Free {
                        next: offset as u32,
                        generation,
                    },
                    _ => {
                        return Err(ParseError::syntax(
                            flag_pos,
                            "Expected 'n' or 'f' in xref entry",
                        ))
                    }
                };
                entries.push((number, entry));
            }
        }

        let mut lexer = Lexer::at(data, pos, options.clone());
        let trailer = match PdfObject::parse(&mut lexer)? {
            PdfObject::Dictionary(dict) => dict,
            _ => return Err(ParseError::syntax(pos, "Trailer is not a dictionary")),
        };

        Ok(XRefSection { entries, trailer })
    }

    /// Decode the binary entries of a `/Type /XRef` stream
    fn parse_stream(stream: &PdfStream) -> ParseResult<XRefSection> {
        let dict = &stream.dict;
        let int_array = |key: &str| -> Option<Vec<i64>> {
            dict.get(key)?
                .as_array()?
                .0
                .iter()
                .map(|o| o.as_integer())
                .collect()
        };

        let size = dict
            .get("Size")
            .and_then(|o| o.as_integer())
            .ok_or_else(|| ParseError::syntax(0, "Xref stream has no /Size"))?;

        let widths = int_array("W")
            .filter(|w| w.len() == 3 && w.iter().all(|x| (0..=8).contains(x)))
            .ok_or_else(|| ParseError::syntax(0, "Xref stream has invalid /W"))?;
        let widths: Vec<usize> = widths.into_iter().map(|w| w as usize).collect();

        let index = int_array("Index").unwrap_or_else(|| vec![0, size]);
        if index.len() % 2 != 0 {
            return Err(ParseError::syntax(0, "Xref stream /Index has odd length"));
        }

        let data = stream.decode()?;
        let row_len: usize = widths.iter().sum();
        if row_len == 0 {
            return Err(ParseError::syntax(0, "Xref stream rows are empty"));
        }
        let mut rows = data.chunks_exact(row_len);

        let mut entries = Vec::new();
        for pair in index.chunks(2) {
            let (first, count) = (pair[0], pair[1]);
            for i in 0..count {
                let Some(row) = rows.next() else {
                    tracing::warn!(expected = count, "xref stream data shorter than /Index");
                    break;
                };
                let (f1, rest) = row.split_at(widths[0]);
                let (f2, f3) = rest.split_at(widths[1]);
                let kind = if widths[0] == 0 { 1 } else { be_number(f1) };
                let (f2, f3) = (be_number(f2), be_number(f3));

                let entry = match kind {
                    0 => XRefEntry::Free {
                        next: f2 as u32,
                        generation: f3 as u16,
                    },
                    1 => XRefEntry::InUse {
                        offset: f2 as usize,
                        generation: f3 as u16,
                    },
                    2 => XRefEntry::Compressed {
                        stream: f2 as u32,
                        index: f3 as u32,
                    },
                    // Unknown types are treated as references to the null object
                    _ => continue,
                };
                let number = first
                    .checked_add(i)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| ParseError::syntax(0, "Xref stream /Index out of range"))?;
                entries.push((number, entry));
            }
        }

        let mut trailer = dict.clone();
        for key in ["W", "Index", "Length", "Filter", "DecodeParms", "Type"] {
            trailer.remove(key);
        }

        Ok(XRefSection { entries, trailer })
    }

    /// Rebuild the table by scanning the whole file for `N G obj`
    pub fn reconstruct(data: &[u8], options: &ParseOptions) -> ParseResult<Self> {
        let mut table = XRefTable {
            reconstructed: true,
            ..Default::default()
        };

        // Later definitions of the same number win (incremental updates)
        for (number, generation, offset) in scan_object_headers(data) {
            table
                .entries
                .insert(number, XRefEntry::InUse { offset, generation });
        }

        let mut catalog = None;
        let mut xref_stream_trailer = None;
        let mut compressed = Vec::new();

        let mut direct: Vec<(u32, usize)> = table
            .entries
            .iter()
            .filter_map(|(num, e)| match e {
                XRefEntry::InUse { offset, .. } => Some((*num, *offset)),
                _ => None,
            })
            .collect();
        direct.sort_by_key(|(_, offset)| *offset);

        for (number, offset) in direct {
            let mut lexer = Lexer::at(data, offset, options.clone());
            let Ok((id, object)) = PdfObject::parse_indirect(&mut lexer, &NoLengthResolver) else {
                continue;
            };
            match object.as_dict().and_then(|d| d.get_type()) {
                Some("Catalog") => catalog = Some(id),
                Some("XRef") => xref_stream_trailer = object.as_dict().cloned(),
                Some("ObjStm") => {
                    if let Some(stream) = object.as_stream() {
                        match ObjectStream::read_header(stream) {
                            Ok(header) => {
                                for (index, (inner, _)) in header.into_iter().enumerate() {
                                    compressed.push((inner, number, index as u32));
                                }
                            }
                            Err(e) => tracing::warn!(
                                stream = number,
                                error = %e,
                                "skipping unreadable object stream"
                            ),
                        }
                    }
                }
                _ => {}
            }
        }

        for (inner, stream, index) in compressed {
            table
                .entries
                .entry(inner)
                .or_insert(XRefEntry::Compressed { stream, index });
        }

        let mut trailer = find_last_trailer(data, options)
            .or(xref_stream_trailer)
            .unwrap_or_default();
        for key in ["Prev", "XRefStm", "W", "Index", "Length", "Filter", "DecodeParms", "Type"] {
            trailer.remove(key);
        }

        if !trailer.contains_key("Root") {
            let root = catalog.ok_or_else(|| {
                ParseError::syntax(0, "Cannot reconstruct: no trailer and no /Catalog object")
            })?;
            trailer.insert("Root", PdfObject::Reference(root));
        }

        let size = table.entries.keys().max().map_or(1, |max| i64::from(*max) + 1);
        trailer.insert("Size", PdfObject::Integer(size));
        table.trailer = trailer;

        tracing::info!(
            objects = table.entries.len(),
            "reconstructed cross-reference table"
        );
        Ok(table)
    }

    /// Get an xref entry by object number
    pub fn get(&self, number: u32) -> Option<&XRefEntry> {
        self.entries.get(&number)
    }

    /// The newest trailer dictionary
    pub fn trailer(&self) -> &PdfDictionary {
        &self.trailer
    }

    /// Whether the table was rebuilt by scanning instead of read from the file
    pub fn is_reconstructed(&self) -> bool {
        self.reconstructed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XRefEntry)> {
        self.entries.iter()
    }
}

fn be_number(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn skip_ws(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    pos
}

fn read_number(data: &[u8], pos: &mut usize) -> ParseResult<u64> {
    let start = skip_ws(data, *pos);
    let mut end = start;
    while end < data.len() && data[end].is_ascii_digit() {
        end += 1;
    }
    if end == start {
        return Err(ParseError::syntax(start, "Expected number in xref table"));
    }
    *pos = end;
    std::str::from_utf8(&data[start..end])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::syntax(start, "Number out of range in xref table"))
}

/// All `N G obj` headers in file order as (number, generation, offset)
fn scan_object_headers(data: &[u8]) -> Vec<(u32, u16, usize)> {
    let mut found = Vec::new();
    let mut search = 0;

    while let Some(i) = find_bytes(&data[search..], b"obj") {
        let keyword = search + i;
        search = keyword + 3;

        if data.get(keyword + 3).is_some_and(|b| !is_whitespace(*b) && !is_delimiter(*b)) {
            continue;
        }
        if let Some(header) = object_header_before(data, keyword) {
            found.push(header);
        }
    }

    found
}

/// Walk back from `obj` over `<generation> <number>`
fn object_header_before(data: &[u8], keyword: usize) -> Option<(u32, u16, usize)> {
    let digits_before = |end: usize| -> Option<usize> {
        let mut start = end;
        while start > 0 && data[start - 1].is_ascii_digit() {
            start -= 1;
        }
        (start < end).then_some(start)
    };
    let ws_before = |end: usize| -> Option<usize> {
        let mut start = end;
        while start > 0 && is_whitespace(data[start - 1]) {
            start -= 1;
        }
        (start < end).then_some(start)
    };

    let gen_end = ws_before(keyword).unwrap_or(keyword);
    let gen_start = digits_before(gen_end)?;
    let num_end = ws_before(gen_start)?;
    let num_start = digits_before(num_end)?;

    if num_start > 0 && !is_whitespace(data[num_start - 1]) && !is_delimiter(data[num_start - 1]) {
        return None;
    }

    let number = std::str::from_utf8(&data[num_start..num_end]).ok()?.parse().ok()?;
    let generation = std::str::from_utf8(&data[gen_start..gen_end]).ok()?.parse().ok()?;
    Some((number, generation, num_start))
}

/// The last `trailer << ... >>` in the file that parses
fn find_last_trailer(data: &[u8], options: &ParseOptions) -> Option<PdfDictionary> {
    let mut end = data.len();
    while let Some(i) = rfind_bytes(&data[..end], b"trailer") {
        let mut lexer = Lexer::at(data, i + b"trailer".len(), options.clone());
        if let Ok(PdfObject::Dictionary(dict)) = PdfObject::parse(&mut lexer) {
            return Some(dict);
        }
        end = i;
    }
    None
}
