//! PDF writer for extracted pages
//!
//! Serializes an [`ExtractionSet`] as a fresh, self-contained file: a new
//! catalog (object 1), a single flat `Pages` node (object 2), one page object
//! per requested page (objects `3..3+n`), then every retained object in
//! ascending original number, then the info dictionary. All references are
//! rewritten through the new numbering; references that fall outside the
//! extraction are written as `null`.

use crate::operations::{ExtractionSet, OperationResult};
use crate::parser::header::PdfVersion;
use crate::parser::{ObjectId, PdfDictionary, PdfDocument, PdfObject};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const CATALOG_NUMBER: u32 = 1;
const PAGES_NUMBER: u32 = 2;
const FIRST_PAGE_NUMBER: u32 = 3;

/// What was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub pages: usize,
    /// Indirect objects written, catalog and page tree included
    pub objects: usize,
    pub bytes: u64,
}

/// Old object number -> new object number
struct Renumbering {
    /// First output copy of each selected source page
    pages: HashMap<u32, u32>,
    objects: HashMap<u32, u32>,
    info: Option<u32>,
    size: u32,
}

impl Renumbering {
    fn new(set: &ExtractionSet) -> Self {
        let mut pages = HashMap::new();
        let mut next = FIRST_PAGE_NUMBER;
        for page in &set.pages {
            pages.entry(page.source.number()).or_insert(next);
            next += 1;
        }

        let mut objects = HashMap::new();
        for number in set.retained_numbers() {
            objects.insert(number, next);
            next += 1;
        }

        let info = set.info.as_ref().map(|_| {
            next += 1;
            next - 1
        });

        Self {
            pages,
            objects,
            info,
            size: next,
        }
    }

    fn map(&self, id: ObjectId) -> Option<ObjectId> {
        self.objects
            .get(&id.number())
            .or_else(|| self.pages.get(&id.number()))
            .map(|number| ObjectId::new(*number, 0))
    }

    /// Copy of `object` with every reference renumbered or nulled
    fn rewrite(&self, object: &PdfObject) -> PdfObject {
        match object {
            PdfObject::Reference(id) => match self.map(*id) {
                Some(new_id) => PdfObject::Reference(new_id),
                None => PdfObject::Null,
            },
            PdfObject::Array(array) => PdfObject::Array(crate::parser::PdfArray(
                array.0.iter().map(|item| self.rewrite(item)).collect(),
            )),
            PdfObject::Dictionary(dict) => PdfObject::Dictionary(self.rewrite_dict(dict)),
            PdfObject::Stream(stream) => {
                let mut dict = self.rewrite_dict(&stream.dict);
                dict.insert("Length", PdfObject::Integer(stream.data.len() as i64));
                PdfObject::Stream(crate::parser::PdfStream {
                    dict,
                    data: stream.data.clone(),
                })
            }
            direct => direct.clone(),
        }
    }

    fn rewrite_dict(&self, dict: &PdfDictionary) -> PdfDictionary {
        PdfDictionary(
            dict.0
                .iter()
                .map(|(key, value)| (key.clone(), self.rewrite(value)))
                .collect(),
        )
    }
}

pub struct PdfWriter<W: Write> {
    writer: W,
    xref_positions: BTreeMap<u32, u64>,
    current_position: u64,
}

impl<W: Write> PdfWriter<W> {
    pub fn new_with_writer(writer: W) -> Self {
        Self {
            writer,
            xref_positions: BTreeMap::new(),
            current_position: 0,
        }
    }

    /// Write the extracted pages of `document` as a complete PDF
    pub fn write_extraction(
        &mut self,
        document: &PdfDocument,
        set: &ExtractionSet,
    ) -> OperationResult<WriteSummary> {
        let numbering = Renumbering::new(set);

        self.write_header(document.version())?;
        self.write_catalog(set, &numbering)?;
        self.write_pages(set, &numbering)?;

        for (number, object) in &set.objects {
            let new_number = numbering.objects[number];
            self.write_object(new_number, &numbering.rewrite(object))?;
        }

        if let (Some(info), Some(number)) = (&set.info, numbering.info) {
            self.write_object(number, &PdfObject::Dictionary(numbering.rewrite_dict(info)))?;
        }

        let xref_position = self.current_position;
        self.write_xref(numbering.size)?;
        self.write_trailer(numbering.size, numbering.info, xref_position)?;
        self.writer.flush()?;

        tracing::debug!(
            pages = set.pages.len(),
            objects = self.xref_positions.len(),
            bytes = self.current_position,
            "wrote extracted document"
        );

        Ok(WriteSummary {
            pages: set.pages.len(),
            objects: self.xref_positions.len(),
            bytes: self.current_position,
        })
    }

    /// Give back the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_header(&mut self, version: PdfVersion) -> OperationResult<()> {
        self.write_bytes(format!("%PDF-{version}\n").as_bytes())?;
        // Binary comment to ensure file is treated as binary
        self.write_bytes(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n'])?;
        Ok(())
    }

    fn write_catalog(
        &mut self,
        set: &ExtractionSet,
        numbering: &Renumbering,
    ) -> OperationResult<()> {
        let mut catalog = PdfDictionary::new();
        catalog.insert("Type", PdfObject::Name(crate::parser::PdfName::new("Catalog")));
        catalog.insert(
            "Pages",
            PdfObject::Reference(ObjectId::new(PAGES_NUMBER, 0)),
        );
        for (key, value) in set.catalog_entries.iter() {
            catalog.0.insert(key.clone(), numbering.rewrite(value));
        }
        self.write_object(CATALOG_NUMBER, &PdfObject::Dictionary(catalog))
    }

    fn write_pages(&mut self, set: &ExtractionSet, numbering: &Renumbering) -> OperationResult<()> {
        let kids: Vec<PdfObject> = (0..set.pages.len() as u32)
            .map(|i| PdfObject::Reference(ObjectId::new(FIRST_PAGE_NUMBER + i, 0)))
            .collect();

        let mut pages = PdfDictionary::new();
        pages.insert("Type", PdfObject::Name(crate::parser::PdfName::new("Pages")));
        pages.insert("Kids", PdfObject::Array(crate::parser::PdfArray(kids)));
        pages.insert("Count", PdfObject::Integer(set.pages.len() as i64));
        self.write_object(PAGES_NUMBER, &PdfObject::Dictionary(pages))?;

        for (i, page) in set.pages.iter().enumerate() {
            let mut dict = numbering.rewrite_dict(&page.dict);
            dict.insert(
                "Parent",
                PdfObject::Reference(ObjectId::new(PAGES_NUMBER, 0)),
            );
            self.write_object(FIRST_PAGE_NUMBER + i as u32, &PdfObject::Dictionary(dict))?;
        }
        Ok(())
    }

    fn write_object(&mut self, number: u32, object: &PdfObject) -> OperationResult<()> {
        self.xref_positions.insert(number, self.current_position);

        self.write_bytes(format!("{number} 0 obj\n").as_bytes())?;
        self.write_object_value(object)?;
        self.write_bytes(b"\nendobj\n")?;
        Ok(())
    }

    fn write_object_value(&mut self, object: &PdfObject) -> OperationResult<()> {
        match object {
            PdfObject::Null => self.write_bytes(b"null")?,
            PdfObject::Boolean(b) => self.write_bytes(if *b { b"true" } else { b"false" })?,
            PdfObject::Integer(i) => self.write_bytes(i.to_string().as_bytes())?,
            PdfObject::Real(f) => self.write_bytes(format_real(*f).as_bytes())?,
            PdfObject::String(s) => self.write_bytes(&escape_string(s.as_bytes()))?,
            PdfObject::Name(n) => self.write_bytes(&escape_name(n.as_str()))?,
            PdfObject::Array(arr) => {
                self.write_bytes(b"[")?;
                for (i, obj) in arr.0.iter().enumerate() {
                    if i > 0 {
                        self.write_bytes(b" ")?;
                    }
                    self.write_object_value(obj)?;
                }
                self.write_bytes(b"]")?;
            }
            PdfObject::Dictionary(dict) => self.write_dictionary(dict)?,
            PdfObject::Stream(stream) => {
                self.write_dictionary(&stream.dict)?;
                self.write_bytes(b"\nstream\n")?;
                self.write_bytes(&stream.data)?;
                self.write_bytes(b"\nendstream")?;
            }
            PdfObject::Reference(id) => self.write_bytes(id.to_string().as_bytes())?,
        }
        Ok(())
    }

    fn write_dictionary(&mut self, dict: &PdfDictionary) -> OperationResult<()> {
        self.write_bytes(b"<<")?;
        for (key, value) in dict.iter() {
            self.write_bytes(b"\n")?;
            self.write_bytes(&escape_name(key.as_str()))?;
            self.write_bytes(b" ")?;
            self.write_object_value(value)?;
        }
        self.write_bytes(b"\n>>")?;
        Ok(())
    }

    fn write_xref(&mut self, size: u32) -> OperationResult<()> {
        self.write_bytes(format!("xref\n0 {size}\n").as_bytes())?;
        self.write_bytes(b"0000000000 65535 f \n")?;

        for number in 1..size {
            match self.xref_positions.get(&number).copied() {
                Some(position) => {
                    self.write_bytes(format!("{position:010} {:05} n \n", 0).as_bytes())?
                }
                // Free entry for gap
                None => self.write_bytes(b"0000000000 00000 f \n")?,
            }
        }
        Ok(())
    }

    fn write_trailer(
        &mut self,
        size: u32,
        info: Option<u32>,
        xref_position: u64,
    ) -> OperationResult<()> {
        let mut trailer = PdfDictionary::new();
        trailer.insert("Size", PdfObject::Integer(i64::from(size)));
        trailer.insert(
            "Root",
            PdfObject::Reference(ObjectId::new(CATALOG_NUMBER, 0)),
        );
        if let Some(info) = info {
            trailer.insert("Info", PdfObject::Reference(ObjectId::new(info, 0)));
        }

        self.write_bytes(b"trailer\n")?;
        self.write_dictionary(&trailer)?;
        self.write_bytes(b"\nstartxref\n")?;
        self.write_bytes(xref_position.to_string().as_bytes())?;
        self.write_bytes(b"\n%%EOF\n")?;
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> OperationResult<()> {
        self.writer.write_all(data)?;
        self.current_position += data.len() as u64;
        Ok(())
    }
}

impl PdfWriter<BufWriter<NamedTempFile>> {
    /// Write to `path` atomically.
    ///
    /// The output goes to a temporary file next to `path` which is renamed
    /// over it only after everything was written and synced. On any error
    /// the temporary file is removed and `path` is left untouched.
    pub fn write_to_file(
        path: &Path,
        document: &PdfDocument,
        set: &ExtractionSet,
    ) -> OperationResult<WriteSummary> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = NamedTempFile::new_in(dir)?;
        let mut writer = PdfWriter::new_with_writer(BufWriter::new(temp));
        let summary = writer.write_extraction(document, set)?;

        let temp = writer
            .into_inner()
            .into_inner()
            .map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;

        tracing::debug!(path = %path.display(), bytes = summary.bytes, "committed output file");
        Ok(summary)
    }
}

/// Shortest decimal form that reads back as the same value. PDF has no
/// exponent syntax; `Display` for `f64` never produces one.
fn format_real(value: f64) -> String {
    if !value.is_finite() || value == 0.0 {
        return "0".to_string();
    }
    value.to_string()
}

/// Literal string with `(`, `)`, `\` and CR escaped
fn escape_string(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(b'(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out.push(b')');
    out
}

/// Name with `#xx` escapes for bytes outside the regular character range.
/// Parsed names hold one char per source byte, so chars up to U+00FF are
/// written back as that single byte.
fn escape_name(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1);
    out.push(b'/');
    let mut utf8 = [0u8; 4];
    for ch in name.chars() {
        let bytes: &[u8] = match u8::try_from(u32::from(ch)) {
            Ok(byte) => {
                utf8[0] = byte;
                &utf8[..1]
            }
            Err(_) => ch.encode_utf8(&mut utf8).as_bytes(),
        };
        for &b in bytes {
            let regular = (0x21..=0x7E).contains(&b)
                && b != b'#'
                && !crate::parser::lexer::is_delimiter(b);
            if regular {
                out.push(b);
            } else {
                out.extend_from_slice(format!("#{b:02X}").as_bytes());
            }
        }
    }
    out
}
