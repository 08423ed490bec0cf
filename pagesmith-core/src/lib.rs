//! # pagesmith
//!
//! A pure Rust PDF page extractor: read a PDF, pick pages, write a new PDF
//! that contains only those pages and everything they depend on.
//!
//! ## Features
//!
//! - **Native Parsing**: Tokenizer, object parser, cross-reference tables and
//!   streams, object streams, tolerant rebuild of broken xref data
//! - **Page Selection**: `"1-3,5,1"` style selections, duplicates and order
//!   preserved
//! - **Dependency Closure**: Only objects reachable from the selected pages are
//!   written; inherited attributes are materialised on each page
//! - **Atomic Output**: Output goes to a temporary file that is renamed into
//!   place once complete
//! - **Batch Jobs**: JSON job descriptions run on a worker pool
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagesmith::operations::page_extraction::extract_selection_to_file;
//! use pagesmith::operations::{PageExtractionOptions, PageSelection};
//! use pagesmith::parser::ParseOptions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let selection = PageSelection::parse("3,1-2")?;
//! let summary = extract_selection_to_file(
//!     "report.pdf",
//!     &selection,
//!     "excerpt.pdf",
//!     ParseOptions::default(),
//!     PageExtractionOptions::default(),
//! )?;
//! println!("Wrote {} pages ({} bytes)", summary.pages, summary.bytes);
//! # Ok(())
//! # }
//! ```
//!
//! ### Working with the parsed document
//!
//! ```rust,no_run
//! use pagesmith::parser::PdfDocument;
//! use pagesmith::operations::PageExtractor;
//! use pagesmith::writer::PdfWriter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = PdfDocument::open("report.pdf")?;
//! println!("Pages: {}", document.page_count()?);
//!
//! let set = PageExtractor::new(&document).extract(&[2, 2, 1])?;
//! println!("Retained objects: {}", set.objects.len());
//!
//! let mut writer = PdfWriter::new_with_writer(Vec::new());
//! writer.write_extraction(&document, &set)?;
//! let bytes = writer.into_inner();
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`parser`] - PDF parsing and lazy object resolution
//!   - [`parser::PdfDocument`] - High-level document interface
//!   - [`parser::PdfObject`] - Low-level PDF objects
//! - [`operations`] - Page selection syntax and page extraction
//! - [`writer`] - Renumbering writer with atomic file output
//! - [`job`] - JSON job descriptions
//! - [`batch`] - Parallel execution of jobs

pub mod batch;
pub mod job;
pub mod operations;
pub mod parser;
pub mod writer;

// Re-export parsing types
pub use parser::{
    DocumentMetadata, ObjectId, ParseError, ParseOptions, ParsedPage, PdfArray, PdfDictionary,
    PdfDocument, PdfName, PdfObject, PdfReader, PdfStream, PdfString,
};

// Re-export operations
pub use operations::page_extraction::{extract_pages_to_file, extract_selection_to_file};
pub use operations::{
    ExtractionSet, OperationError, OperationResult, PageExtractionOptions, PageExtractor,
    PageRange, PageSelection,
};

pub use batch::{BatchOptions, BatchProcessor, BatchSummary, JobResult};
pub use job::{ExtractionJob, JobOptions};
pub use writer::{PdfWriter, WriteSummary};

/// Current version of pagesmith
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
