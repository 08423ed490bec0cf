//! Shared fixtures for integration tests

#![allow(dead_code)]

use pagesmith::parser::{PdfDocument, PdfObject};
use std::collections::BTreeMap;

/// Assembles a PDF from object bodies with correct byte offsets
#[derive(Default)]
pub struct PdfBuilder {
    objects: BTreeMap<u32, Vec<u8>>,
    compressed: BTreeMap<u32, String>,
    trailer_entries: Vec<String>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog (1), Pages (2), pages 3.. with their own content streams
    /// numbered after the pages; content of page N is `BT (Page N) Tj ET`
    pub fn pages(count: u32) -> Self {
        let kids: Vec<String> = (0..count).map(|i| format!("{} 0 R", 3 + i)).collect();
        let mut builder = Self::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(
                2,
                &format!(
                    "<< /Type /Pages /Kids [{}] /Count {count} /MediaBox [0 0 612 792] >>",
                    kids.join(" ")
                ),
            );
        for i in 0..count {
            let content = 3 + count + i;
            builder = builder
                .object(3 + i, &format!("<< /Type /Page /Parent 2 0 R /Contents {content} 0 R >>"))
                .stream(content, "", format!("BT (Page {}) Tj ET", i + 1).as_bytes());
        }
        builder
    }

    pub fn object(mut self, number: u32, body: &str) -> Self {
        self.objects.insert(number, body.as_bytes().to_vec());
        self
    }

    /// Stream object; `/Length` is added unless `dict_entries` has one
    pub fn stream(mut self, number: u32, dict_entries: &str, data: &[u8]) -> Self {
        let length = if dict_entries.contains("/Length") {
            String::new()
        } else {
            format!(" /Length {}", data.len())
        };
        let mut body = format!("<< {dict_entries}{length} >>\nstream\n").into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.objects.insert(number, body);
        self
    }

    /// Object stored in an object stream by `build_xref_stream`
    pub fn compressed(mut self, number: u32, body: &str) -> Self {
        self.objects.remove(&number);
        self.compressed.insert(number, body.to_string());
        self
    }

    pub fn trailer_entry(mut self, entry: &str) -> Self {
        self.trailer_entries.push(entry.to_string());
        self
    }

    fn write_objects(&self, out: &mut Vec<u8>) -> BTreeMap<u32, usize> {
        let mut offsets = BTreeMap::new();
        for (number, body) in &self.objects {
            offsets.insert(*number, out.len());
            out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }
        offsets
    }

    /// Classic xref table
    pub fn build(&self) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let offsets = self.write_objects(&mut out);
        let size = offsets.keys().max().map_or(1, |max| max + 1);

        let xref_offset = out.len();
        out.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
        for number in 0..size {
            let line = match offsets.get(&number) {
                Some(offset) => format!("{offset:010} 00000 n \n"),
                None if number == 0 => "0000000000 65535 f \n".to_string(),
                None => "0000000000 00000 f \n".to_string(),
            };
            out.extend_from_slice(line.as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {size} /Root 1 0 R {} >>\nstartxref\n{xref_offset}\n%%EOF\n",
                self.trailer_entries.join(" ")
            )
            .as_bytes(),
        );
        out
    }

    /// Cross-reference stream plus one object stream holding the
    /// `compressed` objects. With `flate` both streams are FlateDecode
    /// encoded and the xref rows use the PNG Up predictor.
    pub fn build_xref_stream(&self, flate: bool) -> Vec<u8> {
        let mut out = b"%PDF-1.5\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let mut offsets = self.write_objects(&mut out);

        let highest = self
            .objects
            .keys()
            .chain(self.compressed.keys())
            .max()
            .copied()
            .unwrap_or(0);
        let container = highest + 1;
        let xref_number = highest + 2;

        let mut compressed_index = BTreeMap::new();
        let mut header = String::new();
        let mut bodies = String::new();
        for (index, (number, body)) in self.compressed.iter().enumerate() {
            header.push_str(&format!("{number} {} ", bodies.len()));
            bodies.push_str(body);
            bodies.push('\n');
            compressed_index.insert(*number, index as u16);
        }
        let data = format!("{header}{bodies}").into_bytes();
        let (data, filter) = encode(&data, flate);

        offsets.insert(container, out.len());
        out.extend_from_slice(
            format!(
                "{container} 0 obj\n<< /Type /ObjStm /N {} /First {} /Length {}{filter} >>\nstream\n",
                self.compressed.len(),
                header.len(),
                data.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(&data);
        out.extend_from_slice(b"\nendstream\nendobj\n");

        let size = xref_number + 1;
        let xref_offset = out.len();
        offsets.insert(xref_number, xref_offset);

        let mut rows = Vec::new();
        for number in 0..size {
            let (kind, field2, field3): (u8, u32, u16) =
                if let Some(offset) = offsets.get(&number) {
                    (1, *offset as u32, 0)
                } else if let Some(index) = compressed_index.get(&number) {
                    (2, container, *index)
                } else if number == 0 {
                    (0, 0, 0xFFFF)
                } else {
                    (0, 0, 0)
                };
            let mut row = vec![kind];
            row.extend_from_slice(&field2.to_be_bytes());
            row.extend_from_slice(&field3.to_be_bytes());
            rows.push(row);
        }

        let (rows, filter) = if flate {
            let predicted = png_up(&rows);
            let (encoded, filter) = encode(&predicted, true);
            (
                encoded,
                format!("{filter} /DecodeParms << /Predictor 12 /Columns 7 >>"),
            )
        } else {
            (rows.concat(), String::new())
        };

        out.extend_from_slice(
            format!(
                "{xref_number} 0 obj\n<< /Type /XRef /Size {size} /W [1 4 2] /Root 1 0 R {} /Length {}{filter} >>\nstream\n",
                self.trailer_entries.join(" "),
                rows.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(&rows);
        out.extend_from_slice(
            format!("\nendstream\nendobj\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes(),
        );
        out
    }
}

/// PNG "Up" predictor rows, each prefixed with filter type 2
fn png_up(rows: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut previous = vec![0u8; rows.first().map_or(0, Vec::len)];
    for row in rows {
        out.push(2);
        out.extend(row.iter().zip(&previous).map(|(b, p)| b.wrapping_sub(*p)));
        previous = row.clone();
    }
    out
}

#[cfg(feature = "compression")]
fn encode(data: &[u8], flate: bool) -> (Vec<u8>, String) {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    if !flate {
        return (data.to_vec(), String::new());
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    (encoder.finish().unwrap(), " /Filter /FlateDecode".to_string())
}

#[cfg(not(feature = "compression"))]
fn encode(data: &[u8], flate: bool) -> (Vec<u8>, String) {
    assert!(!flate, "FlateDecode fixtures need the compression feature");
    (data.to_vec(), String::new())
}

/// Raw bytes of the content stream of the page at `index`
pub fn page_content(document: &PdfDocument, index: usize) -> Vec<u8> {
    let page = document.page_at(index).unwrap().unwrap();
    let contents = page.dict.get("Contents").unwrap().clone();
    match document.resolve(&contents).unwrap() {
        PdfObject::Stream(stream) => stream.raw_data().to_vec(),
        other => panic!("page {index} contents is not a stream: {other:?}"),
    }
}

/// Open in-memory bytes as a document
pub fn open_bytes(bytes: Vec<u8>) -> PdfDocument {
    pagesmith::parser::PdfReader::from_bytes(bytes, pagesmith::ParseOptions::strict())
        .unwrap()
        .into_document()
}
