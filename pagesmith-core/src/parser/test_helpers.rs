//! Builds small test PDFs with correct xref offsets

use std::collections::{BTreeMap, HashMap};

/// Assembles a PDF from object bodies, computing every byte offset
#[derive(Default)]
pub(crate) struct PdfBuilder {
    version: Option<String>,
    objects: BTreeMap<u32, Vec<u8>>,
    compressed: BTreeMap<u32, String>,
    trailer_entries: Vec<String>,
    offset_shifts: HashMap<u32, usize>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog (1), Pages (2), `page_count` pages (3..) each with its own
    /// content stream numbered after the pages
    pub fn minimal(page_count: u32) -> Self {
        let kids: Vec<String> = (0..page_count).map(|i| format!("{} 0 R", 3 + i)).collect();
        let mut builder = Self::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(
                2,
                &format!(
                    "<< /Type /Pages /Kids [{}] /Count {page_count} >>",
                    kids.join(" ")
                ),
            );

        for i in 0..page_count {
            let page = 3 + i;
            let content = 3 + page_count + i;
            builder = builder
                .object(
                    page,
                    &format!(
                        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {content} 0 R >>"
                    ),
                )
                .stream(content, "", format!("BT (Page {}) Tj ET", i + 1).as_bytes());
        }
        builder
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Add `number 0 obj <body> endobj`
    pub fn object(mut self, number: u32, body: &str) -> Self {
        self.objects.insert(number, body.as_bytes().to_vec());
        self
    }

    /// Add a stream object; `/Length` is appended to `dict_entries`
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

    /// Add an object that `build_xref_stream` packs into an object stream
    pub fn compressed(mut self, number: u32, body: &str) -> Self {
        self.objects.remove(&number);
        self.compressed.insert(number, body.to_string());
        self
    }

    /// Extra trailer entry, e.g. `/Info 9 0 R`
    pub fn trailer_entry(mut self, entry: &str) -> Self {
        self.trailer_entries.push(entry.to_string());
        self
    }

    /// Record a wrong xref offset for `number`, `delta` bytes too far
    pub fn offset_shift(mut self, number: u32, delta: usize) -> Self {
        self.offset_shifts.insert(number, delta);
        self
    }

    fn header(&self) -> Vec<u8> {
        let version = self.version.as_deref().unwrap_or("1.4");
        let mut out = format!("%PDF-{version}\n").into_bytes();
        out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        out
    }

    fn write_objects(&self, out: &mut Vec<u8>) -> BTreeMap<u32, usize> {
        let mut offsets = BTreeMap::new();
        for (number, body) in &self.objects {
            let shift = self.offset_shifts.get(number).copied().unwrap_or(0);
            offsets.insert(*number, out.len() + shift);
            out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }
        offsets
    }

    /// Classic `xref` table and `trailer`
    pub fn build(&self) -> Vec<u8> {
        assert!(
            self.compressed.is_empty(),
            "compressed objects need build_xref_stream"
        );

        let mut out = self.header();
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

    /// Cross-reference stream, with `compressed` objects in one object stream
    pub fn build_xref_stream(&self) -> Vec<u8> {
        let mut out = self.header();
        let mut offsets = self.write_objects(&mut out);

        let highest = self
            .objects
            .keys()
            .chain(self.compressed.keys())
            .max()
            .copied()
            .unwrap_or(0);

        let mut compressed_index = BTreeMap::new();
        let mut next_number = highest + 1;
        if !self.compressed.is_empty() {
            let container = next_number;
            next_number += 1;

            let mut header = String::new();
            let mut bodies = String::new();
            for (index, (number, body)) in self.compressed.iter().enumerate() {
                header.push_str(&format!("{number} {} ", bodies.len()));
                bodies.push_str(body);
                bodies.push('\n');
                compressed_index.insert(*number, (container, index as u32));
            }
            let data = format!("{header}{bodies}");

            offsets.insert(container, out.len());
            out.extend_from_slice(
                format!(
                    "{container} 0 obj\n<< /Type /ObjStm /N {} /First {} /Length {} >>\nstream\n{data}\nendstream\nendobj\n",
                    self.compressed.len(),
                    header.len(),
                    data.len()
                )
                .as_bytes(),
            );
        }

        let xref_number = next_number;
        let size = xref_number + 1;
        let xref_offset = out.len();
        offsets.insert(xref_number, xref_offset);

        let mut rows = Vec::new();
        for number in 0..size {
            let (kind, field2, field3): (u8, u32, u16) =
                if let Some(offset) = offsets.get(&number) {
                    (1, *offset as u32, 0)
                } else if let Some((container, index)) = compressed_index.get(&number) {
                    (2, *container, *index as u16)
                } else if number == 0 {
                    (0, 0, 0xFFFF)
                } else {
                    (0, 0, 0)
                };
            rows.push(kind);
            rows.extend_from_slice(&field2.to_be_bytes());
            rows.extend_from_slice(&field3.to_be_bytes());
        }

        out.extend_from_slice(
            format!(
                "{xref_number} 0 obj\n<< /Type /XRef /Size {size} /W [1 4 2] /Root 1 0 R {} /Length {} >>\nstream\n",
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
