//! Page extraction functionality
//!
//! Computes everything a set of selected pages needs in order to be written
//! into a new file: the effective page dictionaries (inherited attributes
//! made explicit, `/Parent` dropped) and the transitive closure of indirect
//! objects they reference. Page-tree nodes are never part of the closure;
//! the writer rebuilds the tree from scratch.

use super::{OperationError, OperationResult, PageSelection};
use crate::parser::page_tree::INHERITABLE_KEYS;
use crate::parser::{
    ObjectId, ParseError, ParseOptions, ParsedPage, PdfDictionary, PdfDocument, PdfObject,
};
use crate::writer::{PdfWriter, WriteSummary};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;

/// Catalog entries carried into the output when metadata is preserved
pub const CARRIED_CATALOG_KEYS: [&str; 6] = [
    "Metadata",
    "ViewerPreferences",
    "Lang",
    "MarkInfo",
    "PageLayout",
    "PageMode",
];

/// Options for page extraction
#[derive(Debug, Clone)]
pub struct PageExtractionOptions {
    /// Carry `/Info` and document-level catalog entries forward
    pub preserve_metadata: bool,
    /// Keep `/Annots` on extracted pages
    pub preserve_annotations: bool,
}

impl Default for PageExtractionOptions {
    fn default() -> Self {
        Self {
            preserve_metadata: true,
            preserve_annotations: true,
        }
    }
}

/// A page as it will be written
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPage {
    /// Page object in the source file
    pub source: ObjectId,
    /// 1-based page number in the source file
    pub page_number: usize,
    /// Page dictionary without `/Parent`, inherited attributes materialised
    pub dict: PdfDictionary,
}

/// Everything needed to write the selected pages
#[derive(Debug, Clone, Default)]
pub struct ExtractionSet {
    /// Pages in request order, duplicates included
    pub pages: Vec<SelectedPage>,
    /// Retained objects keyed by their original object number
    pub objects: BTreeMap<u32, PdfObject>,
    /// Document information dictionary, when carried forward
    pub info: Option<PdfDictionary>,
    /// Document-level catalog entries to copy
    pub catalog_entries: PdfDictionary,
}

impl ExtractionSet {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Original object numbers of the retained objects, ascending
    pub fn retained_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.objects.keys().copied()
    }

    /// Whether an original object is part of the closure
    pub fn retains(&self, number: u32) -> bool {
        self.objects.contains_key(&number)
    }
}

/// Page extractor for one source document
pub struct PageExtractor<'d> {
    document: &'d PdfDocument,
    options: PageExtractionOptions,
}

impl<'d> PageExtractor<'d> {
    /// Create a new page extractor
    pub fn new(document: &'d PdfDocument) -> Self {
        Self::with_options(document, PageExtractionOptions::default())
    }

    /// Create a new page extractor with custom options
    pub fn with_options(document: &'d PdfDocument, options: PageExtractionOptions) -> Self {
        Self { document, options }
    }

    /// Expand a selection against the document and extract it
    pub fn extract_selection(&self, selection: &PageSelection) -> OperationResult<ExtractionSet> {
        let count = self.document.page_count()?;
        let page_numbers = selection.page_numbers(count)?;
        self.extract(&page_numbers)
    }

    /// Extract pages by 1-based page number, in the given order
    pub fn extract(&self, page_numbers: &[usize]) -> OperationResult<ExtractionSet> {
        if page_numbers.is_empty() {
            return Err(OperationError::NoPagesToProcess);
        }

        let all_pages = self.document.pages()?;
        let count = all_pages.len();
        for &page in page_numbers {
            if page == 0 || page > count {
                return Err(OperationError::PageIndexOutOfRange { page, count });
            }
        }

        let mut set = ExtractionSet::default();
        let mut roots = Vec::new();

        for &page_number in page_numbers {
            let page = &all_pages[page_number - 1];
            let dict = self.effective_dict(page);
            dict.iter()
                .for_each(|(_, value)| value.collect_references(&mut roots));
            set.pages.push(SelectedPage {
                source: page.obj_ref,
                page_number,
                dict,
            });
        }

        if self.options.preserve_metadata {
            let catalog = self.document.catalog()?;
            for key in CARRIED_CATALOG_KEYS {
                if let Some(value) = catalog.get(key) {
                    value.collect_references(&mut roots);
                    set.catalog_entries.insert(key, value.clone());
                }
            }
            if let Some(info) = self.document.info()? {
                for (_, value) in info.iter() {
                    value.collect_references(&mut roots);
                }
                set.info = Some(info);
            }
        }

        // Page-tree nodes are never copied as ordinary objects
        let tree_nodes: HashSet<u32> = all_pages.iter().map(|p| p.obj_ref.number()).collect();
        set.objects = self.closure(roots, &tree_nodes)?;

        tracing::debug!(
            pages = set.pages.len(),
            objects = set.objects.len(),
            "computed extraction closure"
        );
        Ok(set)
    }

    /// Own entries minus `/Parent`, plus inherited attributes it lacks
    fn effective_dict(&self, page: &ParsedPage) -> PdfDictionary {
        let mut dict = page.dict.clone();
        dict.remove("Parent");
        for key in INHERITABLE_KEYS {
            if !dict.contains_key(key) {
                if let Some(value) = page.inherited.get(key) {
                    dict.insert(key, value.clone());
                }
            }
        }
        if !self.options.preserve_annotations {
            dict.remove("Annots");
        }
        dict
    }

    /// Breadth-first walk over indirect references
    fn closure(
        &self,
        roots: Vec<ObjectId>,
        tree_nodes: &HashSet<u32>,
    ) -> OperationResult<BTreeMap<u32, PdfObject>> {
        let mut retained = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<ObjectId> = roots.into();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.number()) || tree_nodes.contains(&id.number()) {
                continue;
            }

            let object = match self.document.get_object(id) {
                Ok(object) => object,
                Err(ParseError::UnresolvedReference(..)) => {
                    tracing::debug!(object = %id, "dropping dangling reference");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if object.is_null() {
                continue;
            }
            if matches!(
                object.as_dict().and_then(|d| d.get_type()),
                Some("Page" | "Pages")
            ) {
                continue;
            }

            let mut refs = Vec::new();
            object.collect_references(&mut refs);
            queue.extend(refs);
            retained.insert(id.number(), object);
        }

        Ok(retained)
    }
}

/// Open `input`, extract `selection` and write it atomically to `output`
pub fn extract_selection_to_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    selection: &PageSelection,
    output: Q,
    parse_options: ParseOptions,
    options: PageExtractionOptions,
) -> OperationResult<WriteSummary> {
    let document = PdfDocument::open_with_options(input.as_ref(), parse_options)?;
    let set = PageExtractor::with_options(&document, options).extract_selection(selection)?;
    PdfWriter::write_to_file(output.as_ref(), &document, &set)
}

/// Extract pages (1-based, in order) from a PDF file to a new file
pub fn extract_pages_to_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    page_numbers: &[usize],
    output: Q,
) -> OperationResult<WriteSummary> {
    let document = PdfDocument::open(input.as_ref())?;
    let set = PageExtractor::new(&document).extract(page_numbers)?;
    PdfWriter::write_to_file(output.as_ref(), &document, &set)
}
