//! PDF Stream Filters
//!
//! Decodes the streams the parser itself has to read: cross-reference
//! streams and object streams (ISO 32000-1 Section 7.4). Page content is
//! never decoded; it is copied through byte for byte.

use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

#[cfg(feature = "compression")]
use flate2::read::ZlibDecoder;
#[cfg(feature = "compression")]
use std::io::Read;

/// Filters the parser can undo
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    ASCIIHexDecode,
    ASCII85Decode,
    FlateDecode,
}

impl Filter {
    /// Parse filter from name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            _ => None,
        }
    }
}

fn decode_error(message: impl Into<String>) -> ParseError {
    ParseError::syntax(0, message)
}

/// Decode stream data according to the `/Filter` and `/DecodeParms` entries
pub fn decode_stream(data: &[u8], dict: &PdfDictionary) -> ParseResult<Vec<u8>> {
    let filters: Vec<&str> = match dict.get("Filter") {
        None => return Ok(data.to_vec()),
        Some(PdfObject::Name(name)) => vec![name.as_str()],
        Some(PdfObject::Array(array)) => array
            .0
            .iter()
            .map(|obj| {
                obj.as_name()
                    .map(|n| n.as_str())
                    .ok_or_else(|| decode_error("Invalid filter in array"))
            })
            .collect::<ParseResult<_>>()?,
        Some(_) => return Err(decode_error("Invalid Filter type")),
    };

    let params: Vec<Option<&PdfDictionary>> = match dict.get("DecodeParms") {
        Some(PdfObject::Dictionary(d)) => vec![Some(d)],
        Some(PdfObject::Array(array)) => array.0.iter().map(|p| p.as_dict()).collect(),
        _ => Vec::new(),
    };

    let mut result = data.to_vec();
    for (i, name) in filters.iter().enumerate() {
        let filter = Filter::from_name(name)
            .ok_or_else(|| decode_error(format!("Unsupported filter: {name}")))?;
        result = apply_filter(&result, filter)?;
        if let Some(Some(parms)) = params.get(i) {
            result = apply_predictor(result, parms)?;
        }
    }

    Ok(result)
}

fn apply_filter(data: &[u8], filter: Filter) -> ParseResult<Vec<u8>> {
    match filter {
        Filter::FlateDecode => decode_flate(data),
        Filter::ASCIIHexDecode => decode_ascii_hex(data),
        Filter::ASCII85Decode => decode_ascii85(data),
    }
}

#[cfg(feature = "compression")]
fn decode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut result = Vec::new();
    match decoder.read_to_end(&mut result) {
        Ok(_) => Ok(result),
        // A truncated zlib trailer still yields usable data
        Err(e) if !result.is_empty() => {
            tracing::warn!(error = %e, decoded = result.len(), "flate stream ended early");
            Ok(result)
        }
        Err(e) => Err(decode_error(format!("Flate decode error: {e}"))),
    }
}

#[cfg(not(feature = "compression"))]
fn decode_flate(_data: &[u8]) -> ParseResult<Vec<u8>> {
    Err(decode_error(
        "FlateDecode requires the 'compression' feature",
    ))
}

fn decode_ascii_hex(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &ch in data {
        if ch == b'>' {
            break;
        }
        if super::lexer::is_whitespace(ch) {
            continue;
        }
        let digit = hex_digit_value(ch)
            .ok_or_else(|| decode_error(format!("Invalid hex digit 0x{ch:02X}")))?;
        match high.take() {
            Some(h) => result.push((h << 4) | digit),
            None => high = Some(digit),
        }
    }
    if let Some(h) = high {
        result.push(h << 4);
    }

    Ok(result)
}

fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

fn decode_ascii85(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut group = [0u8; 5];
    let mut len = 0;

    let mut input = data.iter().copied().peekable();
    while let Some(ch) = input.next() {
        match ch {
            b'~' if input.peek() == Some(&b'>') => break,
            b'z' if len == 0 => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[len] = ch - b'!';
                len += 1;
                if len == 5 {
                    result.extend_from_slice(&ascii85_group(&group)?);
                    len = 0;
                }
            }
            _ if super::lexer::is_whitespace(ch) => {}
            _ => return Err(decode_error(format!("Invalid ASCII85 byte 0x{ch:02X}"))),
        }
    }

    if len == 1 {
        return Err(decode_error("Truncated ASCII85 group"));
    }
    if len > 0 {
        for slot in group.iter_mut().skip(len) {
            *slot = b'u' - b'!';
        }
        let bytes = ascii85_group(&group)?;
        result.extend_from_slice(&bytes[..len - 1]);
    }

    Ok(result)
}

fn ascii85_group(group: &[u8; 5]) -> ParseResult<[u8; 4]> {
    let value = group
        .iter()
        .try_fold(0u64, |acc, &d| Some(acc * 85 + u64::from(d)))
        .filter(|v| *v <= u64::from(u32::MAX))
        .ok_or_else(|| decode_error("ASCII85 group out of range"))?;
    Ok((value as u32).to_be_bytes())
}

/// Undo a TIFF or PNG predictor described by `/DecodeParms`
fn apply_predictor(data: Vec<u8>, parms: &PdfDictionary) -> ParseResult<Vec<u8>> {
    let int = |key: &str, default: i64| {
        parms
            .get(key)
            .and_then(|o| o.as_integer())
            .unwrap_or(default)
    };

    let predictor = int("Predictor", 1);
    if predictor <= 1 || data.is_empty() {
        return Ok(data);
    }

    let positive = |key: &str, default: i64| {
        usize::try_from(int(key, default).max(1))
            .map_err(|_| decode_error(format!("/DecodeParms /{key} out of range")))
    };
    let colors = positive("Colors", 1)?;
    let bits = positive("BitsPerComponent", 8)?;
    let columns = positive("Columns", 1)?;

    let overflow = || decode_error("Predictor row size overflows");
    let pixel_bits = colors.checked_mul(bits).ok_or_else(overflow)?;
    let bytes_per_pixel = pixel_bits.div_ceil(8);
    let row_len = pixel_bits
        .checked_mul(columns)
        .ok_or_else(overflow)?
        .div_ceil(8);
    if row_len > data.len() {
        return Err(decode_error(format!(
            "Predictor row of {row_len} bytes exceeds {} bytes of data",
            data.len()
        )));
    }

    match predictor {
        2 => Ok(undo_tiff(data, row_len, bytes_per_pixel)),
        10..=15 => undo_png(&data, row_len, bytes_per_pixel),
        other => Err(decode_error(format!("Unsupported predictor {other}"))),
    }
}

fn undo_tiff(mut data: Vec<u8>, row_len: usize, bpp: usize) -> Vec<u8> {
    for row in data.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    data
}

fn undo_png(data: &[u8], row_len: usize, bpp: usize) -> ParseResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_len];

    for encoded in data.chunks(row_len + 1) {
        let (tag, row) = match encoded.split_first() {
            Some(split) => split,
            None => break,
        };
        let mut current = row.to_vec();
        current.resize(row_len, 0);

        for i in 0..row_len {
            let left = if i >= bpp { current[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
            current[i] = match tag {
                0 => current[i],
                1 => current[i].wrapping_add(left),
                2 => current[i].wrapping_add(up),
                3 => current[i].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => current[i].wrapping_add(paeth(left, up, up_left)),
                other => return Err(decode_error(format!("Invalid PNG filter type {other}"))),
            };
        }

        result.extend_from_slice(&current[..row.len().min(row_len)]);
        previous = current;
    }

    Ok(result)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
