//! Integration tests for the pagesmith CLI
//!
//! Drives the compiled binary: argument handling, single extractions, job
//! files and failure exit codes.

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

/// Test helper to get the CLI binary path
fn get_cli_path() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    if path.ends_with("deps") {
        path.pop(); // Remove "deps" directory
    }
    path.push("pagesmith");
    #[cfg(windows)]
    path.set_extension("exe");
    path
}

fn run_cli_command(args: &[&str]) -> Result<std::process::Output> {
    let output = Command::new(get_cli_path())
        .env_remove("RUST_LOG")
        .args(args)
        .output()?;
    Ok(output)
}

/// Write a PDF with `pages` pages whose content streams read `(Page N)`
fn write_fixture(dir: &TempDir, name: &str, pages: usize) -> PathBuf {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {pages} /MediaBox [0 0 612 792] >>",
            (0..pages)
                .map(|i| format!("{} 0 R", 3 + i))
                .collect::<Vec<_>>()
                .join(" ")
        ),
    ];
    for i in 0..pages {
        objects.push(format!("<< /Type /Page /Parent 2 0 R /Contents {} 0 R >>", 3 + pages + i));
    }
    for i in 0..pages {
        let content = format!("BT (Page {}) Tj ET", i + 1);
        objects.push(format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()));
    }

    let mut out = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(
        format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes(),
    );
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );

    let path = dir.path().join(name);
    fs::write(&path, out).unwrap();
    path
}

/// Page labels `(Page N)` in output order
fn page_labels(path: &Path) -> Vec<String> {
    let content = fs::read(path).unwrap();
    let text = String::from_utf8_lossy(&content);
    text.match_indices("(Page ")
        .map(|(i, _)| {
            let rest = &text[i + 1..];
            rest[..rest.find(')').unwrap()].to_string()
        })
        .collect()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_cli_help() {
    let output = run_cli_command(&["--help"]).unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--pages"));
    assert!(stdout.contains("--job"));
}

#[test]
fn test_cli_requires_arguments() {
    let output = run_cli_command(&[]).unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_cli_extract_selected_pages() {
    let temp_dir = tempdir().unwrap();
    let source = write_fixture(&temp_dir, "source.pdf", 4);
    let destination = temp_dir.path().join("out.pdf");

    let output = run_cli_command(&[arg(&source), arg(&destination), "--pages", "3,1-2"]).unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Extracted 3 pages"));

    // Only content streams carry the labels, one per retained stream
    let content = fs::read(&destination).unwrap();
    assert!(content.starts_with(b"%PDF-1.4"));
    let mut labels = page_labels(&destination);
    labels.sort();
    assert_eq!(labels, vec!["Page 1", "Page 2", "Page 3"]);
}

#[test]
fn test_cli_defaults_to_all_pages() {
    let temp_dir = tempdir().unwrap();
    let source = write_fixture(&temp_dir, "source.pdf", 3);
    let destination = temp_dir.path().join("all.pdf");

    let output = run_cli_command(&[arg(&source), arg(&destination)]).unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Extracted 3 pages"));
}

#[test]
fn test_cli_repeated_pages_flag() {
    let temp_dir = tempdir().unwrap();
    let source = write_fixture(&temp_dir, "source.pdf", 3);
    let destination = temp_dir.path().join("out.pdf");

    let output = run_cli_command(&[
        arg(&source),
        arg(&destination),
        "-p",
        "2",
        "-p",
        "2",
        "--pages",
        "1",
    ])
    .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Extracted 3 pages"));

    // Page 2 is duplicated but its content stream is written once
    let mut labels = page_labels(&destination);
    labels.sort();
    assert_eq!(labels, vec!["Page 1", "Page 2"]);
}

#[test]
fn test_cli_page_out_of_range() {
    let temp_dir = tempdir().unwrap();
    let source = write_fixture(&temp_dir, "source.pdf", 5);
    let destination = temp_dir.path().join("out.pdf");

    let output = run_cli_command(&[arg(&source), arg(&destination), "--pages", "99"]).unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Page 99 out of range"), "{stderr}");
    assert!(!destination.exists());
}

#[test]
fn test_cli_invalid_selection() {
    let temp_dir = tempdir().unwrap();
    let source = write_fixture(&temp_dir, "source.pdf", 3);
    let destination = temp_dir.path().join("out.pdf");

    let output = run_cli_command(&[arg(&source), arg(&destination), "--pages", "2-1"]).unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid page selection"));
}

#[test]
fn test_cli_missing_source() {
    let temp_dir = tempdir().unwrap();
    let output = run_cli_command(&[
        arg(&temp_dir.path().join("missing.pdf")),
        arg(&temp_dir.path().join("out.pdf")),
    ])
    .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to extract pages"));
}

#[test]
fn test_cli_not_a_pdf() {
    let temp_dir = tempdir().unwrap();
    let source = temp_dir.path().join("notes.pdf");
    fs::write(&source, "just some text").unwrap();

    let output = run_cli_command(&[
        arg(&source),
        arg(&temp_dir.path().join("out.pdf")),
        "--strict",
    ])
    .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_cli_job_file_batch() {
    let temp_dir = tempdir().unwrap();
    let source = write_fixture(&temp_dir, "source.pdf", 3);
    let first = temp_dir.path().join("first.pdf");
    let rest = temp_dir.path().join("rest.pdf");

    let jobs = serde_json::json!([
        {"sourcePath": source, "destinationPath": first, "pageSelections": ["1"]},
        {"sourcePath": source, "destinationPath": rest, "pageSelections": ["2-3"]}
    ]);
    let job_file = temp_dir.path().join("jobs.json");
    fs::write(&job_file, jobs.to_string()).unwrap();

    let output = run_cli_command(&["--job", arg(&job_file), "--parallelism", "2"]).unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(page_labels(&first), vec!["Page 1"]);
    let mut labels = page_labels(&rest);
    labels.sort();
    assert_eq!(labels, vec!["Page 2", "Page 3"]);
}

#[test]
fn test_cli_job_file_with_failure() {
    let temp_dir = tempdir().unwrap();
    let source = write_fixture(&temp_dir, "source.pdf", 2);
    let good = temp_dir.path().join("good.pdf");

    let jobs = serde_json::json!([
        {"sourcePath": source, "destinationPath": good},
        {"sourcePath": source, "destinationPath": temp_dir.path().join("bad.pdf"), "pageSelections": ["7"]}
    ]);
    let job_file = temp_dir.path().join("jobs.json");
    fs::write(&job_file, jobs.to_string()).unwrap();

    let output = run_cli_command(&["--job", arg(&job_file)]).unwrap();
    assert!(!output.status.success());
    assert!(good.exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 of 2 jobs did not complete"));
}

#[test]
fn test_cli_job_and_positional_conflict() {
    let temp_dir = tempdir().unwrap();
    let source = write_fixture(&temp_dir, "source.pdf", 1);
    let output = run_cli_command(&[
        arg(&source),
        arg(&temp_dir.path().join("out.pdf")),
        "--job",
        "jobs.json",
    ])
    .unwrap();
    assert!(!output.status.success());
}
