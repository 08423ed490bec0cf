//! Batch processing for multiple extraction jobs
//!
//! Jobs are independent: each worker opens its own source document, so
//! nothing is shared between threads except the job queue, the result
//! channel and a cancellation flag. Results always come back in submission
//! order, whatever order the workers finish in.
//!
//! # Example
//!
//! ```rust,no_run
//! use pagesmith::batch::{BatchOptions, BatchProcessor};
//! use pagesmith::job::ExtractionJob;
//!
//! let mut processor = BatchProcessor::new(BatchOptions::default().with_parallelism(4));
//! processor.add_job(ExtractionJob::new("a.pdf", "a-first.pdf").with_pages("1"));
//! processor.add_job(ExtractionJob::new("b.pdf", "b-all.pdf"));
//!
//! let summary = processor.execute();
//! println!("{} succeeded, {} failed", summary.successful, summary.failed);
//! ```

use crate::job::{ExtractionJob, JobOptions};
use crate::writer::WriteSummary;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Options for batch processing
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Number of parallel workers
    pub parallelism: usize,
    /// Whether jobs not yet started are cancelled after the first failure
    pub stop_on_error: bool,
    /// Parse and extraction settings applied to every job
    pub job_options: JobOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallelism: num_cpus::get().min(8),
            stop_on_error: false,
            job_options: JobOptions::default(),
        }
    }
}

impl BatchOptions {
    /// Set the number of parallel workers
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Set whether to stop on first error
    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn with_job_options(mut self, job_options: JobOptions) -> Self {
        self.job_options = job_options;
        self
    }
}

/// Result of a single job in the batch
#[derive(Debug, Clone)]
pub enum JobResult {
    Success {
        job_name: String,
        duration: Duration,
        summary: WriteSummary,
    },
    Failed {
        job_name: String,
        duration: Duration,
        error: String,
    },
    /// Never started because the batch was cancelled
    Cancelled { job_name: String },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobResult::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobResult::Cancelled { .. })
    }

    pub fn job_name(&self) -> &str {
        match self {
            JobResult::Success { job_name, .. }
            | JobResult::Failed { job_name, .. }
            | JobResult::Cancelled { job_name } => job_name,
        }
    }

    /// Error message (if failed)
    pub fn error(&self) -> Option<&str> {
        match self {
            JobResult::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobResult::Success {
                job_name,
                duration,
                summary,
            } => write!(
                f,
                "{job_name}: {} pages, {} bytes in {:.2}s",
                summary.pages,
                summary.bytes,
                duration.as_secs_f64()
            ),
            JobResult::Failed {
                job_name, error, ..
            } => write!(f, "{job_name}: failed: {error}"),
            JobResult::Cancelled { job_name } => write!(f, "{job_name}: cancelled"),
        }
    }
}

/// Outcome of a whole batch
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub total_jobs: usize,
    pub successful: usize,
    pub failed: usize,
    /// Whether the batch was cancelled before every job started
    pub cancelled: bool,
    pub duration: Duration,
    /// Per job results in submission order
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    fn empty() -> Self {
        Self {
            total_jobs: 0,
            successful: 0,
            failed: 0,
            cancelled: false,
            duration: Duration::ZERO,
            results: Vec::new(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.successful == self.total_jobs
    }
}

/// Runs extraction jobs on a pool of worker threads
pub struct BatchProcessor {
    options: BatchOptions,
    jobs: Vec<ExtractionJob>,
    cancelled: Arc<AtomicBool>,
}

impl BatchProcessor {
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options,
            jobs: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_job(&mut self, job: ExtractionJob) {
        self.jobs.push(job);
    }

    pub fn add_jobs(&mut self, jobs: impl IntoIterator<Item = ExtractionJob>) {
        self.jobs.extend(jobs);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Cancel every job that has not started yet
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run all jobs and wait for them
    pub fn execute(self) -> BatchSummary {
        let start_time = Instant::now();
        let total_jobs = self.jobs.len();
        if total_jobs == 0 {
            return BatchSummary::empty();
        }

        let names: Vec<String> = self.jobs.iter().map(ExtractionJob::display_name).collect();
        let num_workers = self.options.parallelism.clamp(1, total_jobs);
        tracing::debug!(jobs = total_jobs, workers = num_workers, "starting batch");

        let (job_sender, job_receiver) = mpsc::channel::<(usize, ExtractionJob)>();
        let job_receiver = Arc::new(Mutex::new(job_receiver));
        let (result_sender, result_receiver) = mpsc::channel::<(usize, JobResult)>();

        let workers: Vec<_> = (0..num_workers)
            .map(|id| {
                let receiver = Arc::clone(&job_receiver);
                let results = result_sender.clone();
                let cancelled = Arc::clone(&self.cancelled);
                let job_options = self.options.job_options.clone();
                let stop_on_error = self.options.stop_on_error;

                thread::spawn(move || loop {
                    let message = match receiver.lock() {
                        Ok(receiver) => receiver.recv(),
                        Err(_) => break,
                    };
                    let Ok((idx, job)) = message else {
                        break;
                    };

                    let result = run_job(id, &job, &job_options, &cancelled);
                    if result.is_failed() && stop_on_error {
                        cancelled.store(true, Ordering::SeqCst);
                    }
                    if results.send((idx, result)).is_err() {
                        break;
                    }
                })
            })
            .collect();

        for (idx, job) in self.jobs.into_iter().enumerate() {
            if job_sender.send((idx, job)).is_err() {
                break;
            }
        }

        // Close both channels so workers and the collector below terminate
        drop(job_sender);
        drop(result_sender);

        let mut slots: Vec<Option<JobResult>> = vec![None; total_jobs];
        for (idx, result) in result_receiver {
            slots[idx] = Some(result);
        }
        for worker in workers {
            let _ = worker.join();
        }

        let results: Vec<JobResult> = slots
            .into_iter()
            .zip(names)
            .map(|(slot, job_name)| {
                slot.unwrap_or_else(|| JobResult::Failed {
                    job_name,
                    duration: Duration::ZERO,
                    error: "worker terminated unexpectedly".to_string(),
                })
            })
            .collect();

        let successful = results.iter().filter(|r| r.is_success()).count();
        let failed = results.iter().filter(|r| r.is_failed()).count();
        let summary = BatchSummary {
            total_jobs,
            successful,
            failed,
            cancelled: self.cancelled.load(Ordering::SeqCst),
            duration: start_time.elapsed(),
            results,
        };

        tracing::debug!(
            successful,
            failed,
            elapsed_ms = summary.duration.as_millis() as u64,
            "batch finished"
        );
        summary
    }
}

fn run_job(
    worker: usize,
    job: &ExtractionJob,
    options: &JobOptions,
    cancelled: &AtomicBool,
) -> JobResult {
    let job_name = job.display_name();
    if cancelled.load(Ordering::SeqCst) {
        return JobResult::Cancelled { job_name };
    }

    let start = Instant::now();
    match job.run(options) {
        Ok(summary) => JobResult::Success {
            job_name,
            duration: start.elapsed(),
            summary,
        },
        Err(e) => {
            tracing::warn!(worker, job = %job_name, error = %e, "job failed");
            JobResult::Failed {
                job_name,
                duration: start.elapsed(),
                error: e.to_string(),
            }
        }
    }
}

/// Run a set of jobs with the given options
pub fn run_jobs(jobs: Vec<ExtractionJob>, options: BatchOptions) -> BatchSummary {
    let mut processor = BatchProcessor::new(options);
    processor.add_jobs(jobs);
    processor.execute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::PdfBuilder;
    use crate::parser::PdfDocument;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn write_source(dir: &Path, name: &str, pages: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, PdfBuilder::minimal(pages).build()).unwrap();
        path
    }

    #[test]
    fn test_batch_options_default() {
        let options = BatchOptions::default();
        assert!(options.parallelism > 0);
        assert!(options.parallelism <= 8);
        assert!(!options.stop_on_error);
    }

    #[test]
    fn test_batch_options_builder() {
        let options = BatchOptions::default()
            .with_parallelism(0)
            .stop_on_error(true);
        assert_eq!(options.parallelism, 1);
        assert!(options.stop_on_error);
    }

    #[test]
    fn test_empty_batch_execution() {
        let summary = BatchProcessor::new(BatchOptions::default()).execute();
        assert_eq!(summary.total_jobs, 0);
        assert!(summary.results.is_empty());
        assert!(!summary.cancelled);
    }

    #[test]
    fn test_results_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "in.pdf", 3);

        let jobs: Vec<_> = (1..=6)
            .map(|i| {
                ExtractionJob::new(&source, dir.path().join(format!("out{i}.pdf")))
                    .with_pages(((i - 1) % 3 + 1).to_string())
            })
            .collect();
        let expected: Vec<_> = jobs.iter().map(ExtractionJob::display_name).collect();

        let summary = run_jobs(jobs, BatchOptions::default().with_parallelism(3));
        assert_eq!(summary.successful, 6);
        assert!(summary.all_succeeded());
        let names: Vec<_> = summary.results.iter().map(|r| r.job_name().to_string()).collect();
        assert_eq!(names, expected);

        let output = PdfDocument::open(dir.path().join("out5.pdf")).unwrap();
        assert_eq!(output.page_count().unwrap(), 1);
    }

    #[test]
    fn test_failures_are_collected() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "in.pdf", 2);

        let summary = run_jobs(
            vec![
                ExtractionJob::new(&source, dir.path().join("ok.pdf")),
                ExtractionJob::new(&source, dir.path().join("bad.pdf")).with_pages("9"),
                ExtractionJob::new(dir.path().join("missing.pdf"), dir.path().join("x.pdf")),
            ],
            BatchOptions::default().with_parallelism(2),
        );

        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 2);
        assert!(summary.results[1].error().unwrap().contains("out of range"));
        assert!(!dir.path().join("bad.pdf").exists());
    }

    #[test]
    fn test_stop_on_error_cancels_remaining() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "in.pdf", 1);

        let summary = run_jobs(
            vec![
                ExtractionJob::new(&source, dir.path().join("a.pdf")).with_pages("5"),
                ExtractionJob::new(&source, dir.path().join("b.pdf")),
            ],
            BatchOptions::default().with_parallelism(1).stop_on_error(true),
        );

        assert!(summary.results[0].is_failed());
        assert!(summary.results[1].is_cancelled());
        assert!(summary.cancelled);
        assert!(!dir.path().join("b.pdf").exists());
    }

    #[test]
    fn test_cancel_before_execute() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "in.pdf", 1);

        let mut processor = BatchProcessor::new(BatchOptions::default());
        processor.add_job(ExtractionJob::new(&source, dir.path().join("a.pdf")));
        processor.cancel();

        let summary = processor.execute();
        assert!(summary.results[0].is_cancelled());
        assert_eq!(
            summary.results[0].to_string(),
            format!("{}: cancelled", summary.results[0].job_name())
        );
    }
}
