//! Print-ready working copies.
//!
//! The input workbook is never written. Auto-fit widths and print settings
//! go into a copy inside a private temporary directory that lives as long
//! as the returned [`PreparedWorkbook`].

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

use crate::autofit::autofit;
use crate::config::{AutofitOptions, PrintConfig};
use crate::workbook::{Workbook, WorkbookError};

/// Suffix appended to the input's stem to name the working copy.
pub const WORKING_COPY_SUFFIX: &str = "_print_ready";

/// Extensions whose package can be rewritten in place.
const PREPARABLE_EXTENSIONS: [&str; 2] = ["xlsx", "xlsm"];

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("{0} cannot be prepared (only .xlsx and .xlsm packages are rewritten)")]
    Unsupported(PathBuf),

    #[error("failed to create working directory: {0}")]
    TempDir(#[source] std::io::Error),

    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}

/// A working copy on disk, deleted when dropped.
#[derive(Debug)]
pub struct PreparedWorkbook {
    _dir: TempDir,
    path: PathBuf,
}

impl PreparedWorkbook {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether `path` is a package [`prepare`] can rewrite.
pub fn is_preparable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| PREPARABLE_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(ext)))
}

/// Path of the working copy for `input` inside `dir`:
/// `<dir>/<stem>_print_ready.<ext>`.
pub fn working_copy_path(dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| "xlsx".to_string());
    dir.join(format!("{stem}{WORKING_COPY_SUFFIX}.{ext}"))
}

/// Writes a print-ready copy of `input`: every worksheet auto-fitted and
/// given `print` settings.
pub fn prepare(input: &Path, print: &PrintConfig) -> Result<PreparedWorkbook, PrepareError> {
    prepare_with(input, print, &AutofitOptions::default())
}

pub fn prepare_with(
    input: &Path,
    print: &PrintConfig,
    autofit_options: &AutofitOptions,
) -> Result<PreparedWorkbook, PrepareError> {
    if !is_preparable(input) {
        return Err(PrepareError::Unsupported(input.to_path_buf()));
    }

    let mut workbook = Workbook::open(input)?;
    for sheet in workbook.worksheets_mut() {
        if let Some(error) = sheet.load_error() {
            warn!(sheet = %sheet.name, error = %error, "worksheet left as is");
            continue;
        }
        autofit(sheet, autofit_options);
        sheet.print = Some(*print);
        debug!(
            sheet = %sheet.name,
            columns = sheet.column_widths.len(),
            "worksheet prepared"
        );
    }

    let dir = tempfile::Builder::new()
        .prefix("excel2pdf-")
        .tempdir()
        .map_err(PrepareError::TempDir)?;
    let path = working_copy_path(dir.path(), input);
    workbook.save_as(&path)?;

    Ok(PreparedWorkbook { _dir: dir, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_copy_path() {
        let dir = Path::new("/tmp/work");
        assert_eq!(
            working_copy_path(dir, Path::new("/data/Q3 Report.xlsx")),
            PathBuf::from("/tmp/work/Q3 Report_print_ready.xlsx")
        );
        assert_eq!(
            working_copy_path(dir, Path::new("macro.XLSM")),
            PathBuf::from("/tmp/work/macro_print_ready.xlsm")
        );
    }

    #[test]
    fn test_legacy_formats_are_unsupported() {
        assert!(is_preparable(Path::new("a.xlsx")));
        assert!(is_preparable(Path::new("a.XLSM")));
        assert!(!is_preparable(Path::new("a.xls")));
        assert!(!is_preparable(Path::new("a.xlsb")));

        let err = prepare(Path::new("legacy.xls"), &PrintConfig::default()).unwrap_err();
        assert!(matches!(err, PrepareError::Unsupported(_)));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = prepare(Path::new("/nonexistent/book.xlsx"), &PrintConfig::default()).unwrap_err();
        assert!(matches!(err, PrepareError::Workbook(WorkbookError::Io(_))));
    }
}
