//! PDF operations module
//!
//! Page selection syntax and the page extraction operation built on the
//! parser.

pub mod page_extraction;

pub use page_extraction::{ExtractionSet, PageExtractionOptions, PageExtractor, SelectedPage};

use crate::parser::ParseError;
use std::fmt;

/// Result type for operations
pub type OperationResult<T> = Result<T, OperationError>;

/// Operation-specific errors
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// Requested page does not exist (1-based page number)
    #[error("Page {page} out of range (document has {count} pages)")]
    PageIndexOutOfRange { page: usize, count: usize },

    /// Selection text could not be parsed
    #[error("Invalid page selection: {0}")]
    InvalidPageSelection(String),

    /// Selection resolved to no pages at all
    #[error("No pages to process")]
    NoPagesToProcess,

    /// Job description is not valid JSON or has the wrong shape
    #[error("Invalid job description: {0}")]
    InvalidJob(#[from] serde_json::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One item of a page selection, with 1-based page numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRange {
    /// All pages
    All,
    /// Single page
    Single(usize),
    /// Inclusive range, `start <= end`
    Range(usize, usize),
}

fn parse_page_number(text: &str, item: &str) -> OperationResult<usize> {
    let page = text.trim().parse::<usize>().map_err(|_| {
        OperationError::InvalidPageSelection(format!("'{item}' is not a page number or range"))
    })?;
    if page == 0 {
        return Err(OperationError::InvalidPageSelection(format!(
            "'{item}': page numbers start at 1"
        )));
    }
    Ok(page)
}

impl PageRange {
    /// Parse a single item
    ///
    /// Examples:
    /// - "all" -> All pages
    /// - "3" -> Single page
    /// - "1-5" -> Range of pages
    pub fn parse(s: &str) -> OperationResult<Self> {
        let s = s.trim();

        if s.is_empty() {
            return Err(OperationError::InvalidPageSelection(
                "empty selection item".to_string(),
            ));
        }

        if s.eq_ignore_ascii_case("all") {
            return Ok(PageRange::All);
        }

        if let Some((start, end)) = s.split_once('-') {
            let start = parse_page_number(start, s)?;
            let end = parse_page_number(end, s)?;
            if start > end {
                return Err(OperationError::InvalidPageSelection(format!(
                    "'{s}': start {start} is greater than end {end}"
                )));
            }
            return Ok(PageRange::Range(start, end));
        }

        Ok(PageRange::Single(parse_page_number(s, s)?))
    }

    /// Page numbers covered by this item, checked against `count`
    pub fn page_numbers(&self, count: usize) -> OperationResult<Vec<usize>> {
        let check = |page: usize| {
            if page > count {
                Err(OperationError::PageIndexOutOfRange { page, count })
            } else {
                Ok(page)
            }
        };
        match *self {
            PageRange::All => Ok((1..=count).collect()),
            PageRange::Single(page) => Ok(vec![check(page)?]),
            PageRange::Range(start, end) => {
                check(start)?;
                check(end)?;
                Ok((start..=end).collect())
            }
        }
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRange::All => write!(f, "all"),
            PageRange::Single(page) => write!(f, "{page}"),
            PageRange::Range(start, end) => write!(f, "{start}-{end}"),
        }
    }
}

/// Ordered page selection; duplicates are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    ranges: Vec<PageRange>,
}

impl PageSelection {
    /// Every page in document order
    pub fn all() -> Self {
        Self {
            ranges: vec![PageRange::All],
        }
    }

    /// Parse a comma separated list such as `"1-3,5,1"`
    pub fn parse(s: &str) -> OperationResult<Self> {
        let ranges = s
            .split(',')
            .map(PageRange::parse)
            .collect::<OperationResult<Vec<_>>>()?;
        Ok(Self { ranges })
    }

    /// Parse several selection strings and concatenate them in order.
    /// No strings at all means every page.
    pub fn parse_many<S: AsRef<str>>(items: &[S]) -> OperationResult<Self> {
        if items.is_empty() {
            return Ok(Self::all());
        }
        let mut ranges = Vec::new();
        for item in items {
            ranges.extend(Self::parse(item.as_ref())?.ranges);
        }
        Ok(Self { ranges })
    }

    pub fn ranges(&self) -> &[PageRange] {
        &self.ranges
    }

    /// Expand to 1-based page numbers in request order
    pub fn page_numbers(&self, count: usize) -> OperationResult<Vec<usize>> {
        let mut pages = Vec::new();
        for range in &self.ranges {
            pages.extend(range.page_numbers(count)?);
        }
        if pages.is_empty() {
            return Err(OperationError::NoPagesToProcess);
        }
        Ok(pages)
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.ranges.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", items.join(","))
    }
}
