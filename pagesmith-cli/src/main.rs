use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use pagesmith::batch::{run_jobs, BatchOptions};
use pagesmith::job::{load_jobs, ExtractionJob, JobOptions};
use pagesmith::{PageExtractionOptions, ParseOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "pagesmith",
    about = "Extract pages from PDF files into a new PDF",
    version,
    author
)]
struct Cli {
    /// Source PDF file
    #[arg(required_unless_present = "job", conflicts_with = "job")]
    source: Option<PathBuf>,

    /// Destination PDF file
    #[arg(required_unless_present = "job", conflicts_with = "job")]
    destination: Option<PathBuf>,

    /// Pages to extract (e.g. "1-3", "5", "1,1,2", "all"); repeatable,
    /// all pages when omitted
    #[arg(short, long = "pages", value_name = "SELECTION")]
    pages: Vec<String>,

    /// JSON job file: one job object or an array of them
    #[arg(short, long, value_name = "FILE", conflicts_with = "pages")]
    job: Option<PathBuf>,

    /// Fail on any deviation from the PDF syntax instead of recovering
    #[arg(long)]
    strict: bool,

    /// Do not carry the info dictionary and document metadata forward
    #[arg(long)]
    no_metadata: bool,

    /// Drop annotations from extracted pages
    #[arg(long)]
    no_annotations: bool,

    /// Worker threads for job files
    #[arg(long, value_name = "N")]
    parallelism: Option<usize>,

    /// Cancel remaining jobs after the first failure
    #[arg(long)]
    stop_on_error: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "pagesmith=info",
        2 => "pagesmith=debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn job_options(cli: &Cli) -> JobOptions {
    JobOptions {
        parse: if cli.strict {
            ParseOptions::strict()
        } else {
            ParseOptions::lenient()
        },
        extraction: PageExtractionOptions {
            preserve_metadata: !cli.no_metadata,
            preserve_annotations: !cli.no_annotations,
        },
    }
}

fn run_single(cli: &Cli, source: PathBuf, destination: PathBuf) -> Result<()> {
    let job = ExtractionJob {
        source_path: source,
        destination_path: destination,
        page_selections: (!cli.pages.is_empty()).then(|| cli.pages.clone()),
    };

    let summary = job
        .run(&job_options(cli))
        .with_context(|| format!("Failed to extract pages from {}", job.source_path.display()))?;

    println!(
        "Extracted {} pages to {} ({} bytes)",
        summary.pages,
        job.destination_path.display(),
        summary.bytes
    );
    Ok(())
}

fn run_job_file(cli: &Cli, path: &Path) -> Result<()> {
    let jobs = load_jobs(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;

    let mut options = BatchOptions::default()
        .stop_on_error(cli.stop_on_error)
        .with_job_options(job_options(cli));
    if let Some(parallelism) = cli.parallelism {
        options = options.with_parallelism(parallelism);
    }

    let summary = run_jobs(jobs, options);
    for result in &summary.results {
        if result.is_success() {
            println!("{result}");
        } else {
            eprintln!("{result}");
        }
    }

    if !summary.all_succeeded() {
        bail!(
            "{} of {} jobs did not complete",
            summary.total_jobs - summary.successful,
            summary.total_jobs
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match (&cli.job, cli.source.clone(), cli.destination.clone()) {
        (Some(path), _, _) => run_job_file(&cli, path),
        (None, Some(source), Some(destination)) => run_single(&cli, source, destination),
        _ => bail!("Either <SOURCE> <DESTINATION> or --job FILE is required"),
    }
}
