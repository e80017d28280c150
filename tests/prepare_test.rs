/// Integration tests for print-ready working copies.
mod common;

use std::fs;
use std::io::Read;
use std::path::Path;

use common::write_workbook;
use excel2pdf::config::PrintConfig;
use excel2pdf::prepare::prepare;
use excel2pdf::workbook::Workbook;

fn read_part(path: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut xml = String::new();
    archive.by_name(name).unwrap().read_to_string(&mut xml).unwrap();
    xml
}

#[test]
fn test_prepared_copy_carries_print_settings() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.xlsx");
    write_workbook(&input);
    let before = fs::read(&input).unwrap();

    let prepared = prepare(&input, &PrintConfig::new(true, 2)).unwrap();
    assert_ne!(prepared.path(), input.as_path());
    assert!(prepared.path().ends_with("report_print_ready.xlsx"));

    let xml = read_part(prepared.path(), "xl/worksheets/sheet1.xml");
    assert!(xml.contains(r#"<pageSetUpPr fitToPage="1"/>"#), "{xml}");
    assert!(xml.contains(r#"gridLines="1""#), "{xml}");
    assert!(xml.contains(r#"headings="1""#), "{xml}");
    assert!(xml.contains(r#"orientation="landscape""#), "{xml}");
    assert!(xml.contains(r#"fitToWidth="2""#), "{xml}");
    assert!(xml.contains(r#"fitToHeight="0""#), "{xml}");
    // "Region" (6) + padding clamps up to the minimum of 8.
    assert!(xml.contains(r#"<col min="1" max="1" width="8""#), "{xml}");
    // "1,234,567.89" (12) + padding.
    assert!(xml.contains(r#"<col min="2" max="2" width="14""#), "{xml}");

    // Every other part is carried over.
    assert_eq!(
        read_part(prepared.path(), "xl/styles.xml"),
        read_part(&input, "xl/styles.xml")
    );
    assert_eq!(fs::read(&input).unwrap(), before);
}

#[test]
fn test_prepared_copy_is_still_a_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.xlsx");
    write_workbook(&input);

    let prepared = prepare(&input, &PrintConfig::default()).unwrap();
    let book = Workbook::open(prepared.path()).unwrap();
    let names: Vec<_> = book.worksheets().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Data"]);
    assert_eq!(book.worksheets()[0].cells.len(), 3);
}

#[test]
fn test_working_copy_removed_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.xlsx");
    write_workbook(&input);

    let prepared = prepare(&input, &PrintConfig::default()).unwrap();
    let path = prepared.path().to_path_buf();
    assert!(path.exists());
    drop(prepared);
    assert!(!path.exists());
    assert!(input.exists());
}
