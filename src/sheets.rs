//! Per-sheet export: one PDF for each visible worksheet.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::automation::{Automation, AutomationError, PageSetup};
use crate::config::Orientation;
use crate::job::{BatchReport, ConversionJob, JobMode};
use crate::telemetry::record_job_telemetry;

/// Extensions picked up when converting a folder.
pub const SHEET_EXTENSIONS: [&str; 4] = ["xls", "xlsx", "xlsm", "xlsb"];

/// Suffix of the default output folder next to a workbook.
pub const OUTPUT_DIR_SUFFIX: &str = "_PDFs";

#[derive(Debug, Error)]
pub enum SheetExportError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Automation(#[from] AutomationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetExportOptions {
    pub include_hidden: bool,
    /// One page wide, automatic height.
    pub fit_to_page: bool,
    /// `None` keeps each sheet's own orientation.
    pub landscape: Option<bool>,
}

impl Default for SheetExportOptions {
    fn default() -> Self {
        Self {
            include_hidden: false,
            fit_to_page: true,
            landscape: None,
        }
    }
}

impl SheetExportOptions {
    fn page_setup(&self) -> PageSetup {
        PageSetup {
            gridlines: None,
            headings: None,
            fit_to_pages_wide: self.fit_to_page.then_some(1),
            orientation: self.landscape.map(Orientation::from_landscape),
        }
    }
}

/// Replaces characters that are not allowed in file names with `_`.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect()
}

/// `<parent>/<stem>_PDFs`.
pub fn default_output_dir(workbook: &Path) -> PathBuf {
    let stem = workbook.file_stem().unwrap_or_default().to_string_lossy();
    let parent = workbook.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}{OUTPUT_DIR_SUFFIX}"))
}

/// `"<stem> - <sheet>.pdf"` with both parts made safe.
pub fn sheet_pdf_name(workbook: &Path, sheet: &str) -> String {
    let stem = workbook.file_stem().unwrap_or_default().to_string_lossy();
    format!("{} - {}.pdf", safe_name(&stem), safe_name(sheet))
}

/// Exports every visible worksheet of `path` into its own PDF and returns
/// the files written, in sheet order.
///
/// A sheet that fails to export is logged and skipped. The engine is quit
/// before returning on every path.
pub fn export_workbook_sheets_to_pdf(
    automation: &dyn Automation,
    path: &Path,
    out_dir: Option<&Path>,
    options: &SheetExportOptions,
) -> Result<Vec<PathBuf>, SheetExportError> {
    if !path.exists() {
        return Err(SheetExportError::NotFound(path.to_path_buf()));
    }
    // Engines resolve relative paths against their own working directory.
    let path = fs::canonicalize(path).map_err(|source| SheetExportError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let out_dir = out_dir.map_or_else(|| default_output_dir(&path), Path::to_path_buf);
    fs::create_dir_all(&out_dir).map_err(|source| SheetExportError::OutputDir {
        path: out_dir.clone(),
        source,
    })?;
    let out_dir = fs::canonicalize(&out_dir).unwrap_or(out_dir);

    let mut session = automation.launch()?;
    session.open_workbook(&path, true)?;

    let setup = options.page_setup();
    let mut created = Vec::new();
    for sheet in session.sheet_names()? {
        if !options.include_hidden {
            let visible = session.is_sheet_visible(&sheet).unwrap_or_else(|e| {
                debug!(sheet = %sheet, error = %e, "visibility unreadable, assuming visible");
                true
            });
            if !visible {
                debug!(sheet = %sheet, "skipping hidden sheet");
                continue;
            }
        }

        if let Err(e) = session.apply_page_setup(&sheet, &setup) {
            debug!(sheet = %sheet, error = %e, "page setup not applied");
        }

        let pdf = out_dir.join(sheet_pdf_name(&path, &sheet));
        match session.export_pdf(&pdf, Some(&sheet)) {
            Ok(()) => {
                info!(sheet = %sheet, pdf = %pdf.display(), "sheet exported");
                created.push(pdf);
            }
            Err(e) => warn!(sheet = %sheet, error = %e, "failed to export sheet"),
        }
    }

    if let Err(e) = session.close_workbook() {
        debug!(error = %e, "workbook did not close cleanly");
    }
    Ok(created)
}

/// Options of a folder run.
#[derive(Debug, Clone, Default)]
pub struct FolderOptions {
    pub recursive: bool,
    /// Mirror the folder layout under this root instead of writing next to
    /// each workbook.
    pub output_root: Option<PathBuf>,
    pub sheets: SheetExportOptions,
}

fn is_sheet_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SHEET_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(ext)))
}

/// Workbooks under `folder`, sorted. Office lock files (`~$...`) are skipped.
/// Symlinked directories are not descended into; symlinked workbooks count.
pub fn find_workbooks(folder: &Path, recursive: bool) -> Result<Vec<PathBuf>, SheetExportError> {
    let mut found = Vec::new();
    let mut pending = vec![folder.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| SheetExportError::Read {
            path: dir.clone(),
            source,
        })?;
        for entry in entries.filter_map(Result::ok) {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if path.is_file()
                && is_sheet_workbook(&path)
                && !entry.file_name().to_string_lossy().starts_with("~$")
            {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Output directory for `workbook` under `root`, mirroring its position
/// relative to `folder`.
pub fn mirrored_output_dir(root: &Path, folder: &Path, workbook: &Path) -> PathBuf {
    let relative = workbook
        .parent()
        .and_then(|parent| parent.strip_prefix(folder).ok())
        .unwrap_or_else(|| Path::new(""));
    root.join(relative)
}

/// Runs [`export_workbook_sheets_to_pdf`] for every workbook in `folder`.
/// A workbook that fails is recorded and the rest are still converted.
pub fn export_folder(
    automation: &dyn Automation,
    folder: &Path,
    options: &FolderOptions,
) -> Result<BatchReport, SheetExportError> {
    if !folder.is_dir() {
        return Err(SheetExportError::NotFound(folder.to_path_buf()));
    }

    let mut report = BatchReport::new();
    for workbook in find_workbooks(folder, options.recursive)? {
        let mut job = ConversionJob::new(&workbook, JobMode::PerSheet);
        job.start_processing();

        let out_dir = options
            .output_root
            .as_deref()
            .map(|root| mirrored_output_dir(root, folder, &workbook));
        match export_workbook_sheets_to_pdf(automation, &workbook, out_dir.as_deref(), &options.sheets) {
            Ok(created) => {
                for pdf in &created {
                    println!("Created: {}", pdf.display());
                }
                job.mark_complete(None, created);
            }
            Err(e) => {
                eprintln!("Failed: {}: {}", workbook.display(), e);
                job.mark_failed(e.to_string());
            }
        }

        record_job_telemetry(&job);
        report.push(job);
    }
    Ok(report)
}
