//! JSON job descriptions
//!
//! A job names a source file, a destination file and the pages to carry
//! over:
//!
//! ```json
//! {
//!   "sourcePath": "report.pdf",
//!   "destinationPath": "summary.pdf",
//!   "pageSelections": ["1-3", "7", "1"]
//! }
//! ```
//!
//! `pageSelections` may be omitted to copy every page. A JSON array of such
//! objects describes a batch, see [`crate::batch`].

use crate::operations::page_extraction::extract_selection_to_file;
use crate::operations::{OperationResult, PageExtractionOptions, PageSelection};
use crate::parser::ParseOptions;
use crate::writer::WriteSummary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One source-to-destination extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionJob {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_selections: Option<Vec<String>>,
}

/// Settings shared by every job of a run
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub parse: ParseOptions,
    pub extraction: PageExtractionOptions,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JobFile {
    Batch(Vec<ExtractionJob>),
    Single(ExtractionJob),
}

impl ExtractionJob {
    /// Job copying every page
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(source: P, destination: Q) -> Self {
        Self {
            source_path: source.into(),
            destination_path: destination.into(),
            page_selections: None,
        }
    }

    /// Append a selection such as `"2-4"` or `"1,1,2"`
    pub fn with_pages(mut self, selection: impl Into<String>) -> Self {
        self.page_selections
            .get_or_insert_with(Vec::new)
            .push(selection.into());
        self
    }

    /// Parsed page selection; no selections means every page
    pub fn selection(&self) -> OperationResult<PageSelection> {
        match &self.page_selections {
            Some(items) => PageSelection::parse_many(items),
            None => Ok(PageSelection::all()),
        }
    }

    /// Short human readable label
    pub fn display_name(&self) -> String {
        format!(
            "{} -> {}",
            self.source_path.display(),
            self.destination_path.display()
        )
    }

    /// Open the source, extract the selected pages and commit the output.
    /// The selection is validated before the source is opened.
    pub fn run(&self, options: &JobOptions) -> OperationResult<WriteSummary> {
        let selection = self.selection()?;
        tracing::debug!(job = %self.display_name(), %selection, "running extraction job");

        let summary = extract_selection_to_file(
            &self.source_path,
            &selection,
            &self.destination_path,
            options.parse.clone(),
            options.extraction.clone(),
        )?;

        tracing::info!(
            job = %self.display_name(),
            pages = summary.pages,
            bytes = summary.bytes,
            "extraction complete"
        );
        Ok(summary)
    }
}

/// Parse a single job object or an array of them
pub fn parse_jobs(json: &str) -> OperationResult<Vec<ExtractionJob>> {
    Ok(match serde_json::from_str::<JobFile>(json)? {
        JobFile::Batch(jobs) => jobs,
        JobFile::Single(job) => vec![job],
    })
}

/// Read and parse a job file
pub fn load_jobs<P: AsRef<Path>>(path: P) -> OperationResult<Vec<ExtractionJob>> {
    let json = std::fs::read_to_string(path.as_ref())?;
    let jobs = parse_jobs(&json)?;
    tracing::debug!(path = %path.as_ref().display(), jobs = jobs.len(), "loaded job file");
    Ok(jobs)
}
