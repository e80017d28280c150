/// Integration tests for the aggregate `excel2pdf` flow.
///
/// Renderers are in-process fakes, so no Excel or LibreOffice is needed.
mod common;

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use common::{write_workbook, FakeRenderer};
use excel2pdf::cli::{run_aggregate, AggregateArgs, EXIT_FAILED, EXIT_INVALID_INPUT, EXIT_SUCCESS};
use excel2pdf::convert::{run_batch, BatchOptions};
use excel2pdf::render::PdfRenderer;
use pretty_assertions::assert_eq;

fn args(items: &[&str]) -> AggregateArgs {
    let mut argv = vec!["excel2pdf"];
    argv.extend_from_slice(items);
    AggregateArgs::parse_from(argv)
}

fn pdfs_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".pdf"))
        .collect();
    names.sort();
    names
}

/// A folder with one workbook and one text file yields exactly one PDF.
#[test]
fn test_folder_ignores_non_workbooks() {
    let dir = tempfile::tempdir().unwrap();
    write_workbook(&dir.path().join("sales.xlsx"));
    fs::write(dir.path().join("readme.txt"), "not a workbook").unwrap();

    let renderers: Vec<Box<dyn PdfRenderer>> = vec![Box::new(FakeRenderer::ok("libreoffice"))];
    let code = run_aggregate(&args(&[dir.path().to_str().unwrap()]), &renderers).unwrap();

    assert_eq!(code, EXIT_SUCCESS);
    assert_eq!(pdfs_in(dir.path()), vec!["sales.pdf"]);
}

/// When every renderer fails for one file the batch still converts the rest
/// and exits with 3.
#[test]
fn test_failed_file_does_not_stop_batch() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("pdf");
    write_workbook(&dir.path().join("a_good.xlsx"));
    write_workbook(&dir.path().join("b_broken.xlsx"));
    write_workbook(&dir.path().join("c_good.xlsx"));

    let renderers: Vec<Box<dyn PdfRenderer>> = vec![
        Box::new(FakeRenderer::failing("excel", &["broken", "good"])),
        Box::new(FakeRenderer::failing("libreoffice", &["broken"])),
    ];
    let report_path = dir.path().join("report.json");
    let code = run_aggregate(
        &args(&[
            dir.path().to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--report",
            report_path.to_str().unwrap(),
        ]),
        &renderers,
    )
    .unwrap();

    assert_eq!(code, EXIT_FAILED);
    assert_eq!(pdfs_in(&out), vec!["a_good.pdf", "c_good.pdf"]);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    let statuses: Vec<_> = report["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["status"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(statuses, vec!["complete", "failed", "complete"]);
    assert_eq!(report["jobs"][0]["renderer"], "libreoffice");
    assert!(report["jobs"][1]["error"]
        .as_str()
        .unwrap()
        .contains("excel:"));
}

/// The console line for a failed file names that file and the reason.
#[test]
fn test_failure_line_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    write_workbook(&dir.path().join("a_good.xlsx"));
    write_workbook(&dir.path().join("b_broken.xlsx"));

    let renderers: Vec<Box<dyn PdfRenderer>> =
        vec![Box::new(FakeRenderer::failing("libreoffice", &["broken"]))];
    let report = run_batch(dir.path(), &BatchOptions::default(), &renderers).unwrap();

    let lines: Vec<String> = report.jobs.iter().filter_map(|j| j.progress_line()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        format!("✓ a_good.xlsx -> {}", dir.path().join("a_good.pdf").display())
    );
    assert!(
        lines[1].starts_with("✗ b_broken.xlsx failed: Could not export to PDF: libreoffice: "),
        "{}",
        lines[1]
    );
}

#[test]
fn test_invalid_targets_exit_2() {
    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("notes.txt");
    fs::write(&txt, "x").unwrap();
    let renderers: Vec<Box<dyn PdfRenderer>> = vec![Box::new(FakeRenderer::ok("libreoffice"))];

    let code = run_aggregate(&args(&[txt.to_str().unwrap()]), &renderers).unwrap();
    assert_eq!(code, EXIT_INVALID_INPUT);

    let missing = dir.path().join("missing.xlsx");
    let code = run_aggregate(&args(&[missing.to_str().unwrap()]), &renderers).unwrap();
    assert_eq!(code, EXIT_INVALID_INPUT);
}

/// The renderer receives the print-ready copy, never the original.
#[test]
fn test_single_file_renders_working_copy() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Budget.xlsx");
    write_workbook(&input);
    let before = fs::read(&input).unwrap();

    let fake = FakeRenderer::ok("excel");
    let seen = fake.seen.clone();
    let renderers: Vec<Box<dyn PdfRenderer>> = vec![Box::new(fake)];
    let code = run_aggregate(&args(&[input.to_str().unwrap(), "--fitwide", "2"]), &renderers).unwrap();

    assert_eq!(code, EXIT_SUCCESS);
    assert!(dir.path().join("Budget.pdf").exists());
    let seen: Vec<PathBuf> = seen.borrow().clone();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].ends_with("Budget_print_ready.xlsx"));
    assert!(!seen[0].exists(), "working copy must be removed after the job");
    assert_eq!(fs::read(&input).unwrap(), before);
}
