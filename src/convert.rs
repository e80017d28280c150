//! Aggregate export: one PDF per workbook.
//!
//! Each input is prepared into a print-ready working copy, then handed to
//! the renderers in order until one of them produces the PDF.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PrintConfig;
use crate::job::{BatchReport, ConversionJob, JobMode};
use crate::prepare::{prepare, PrepareError};
use crate::render::PdfRenderer;
use crate::telemetry::record_job_telemetry;

/// Extensions accepted by the aggregate converter.
pub const EXCEL_EXTENSIONS: [&str; 3] = ["xlsx", "xlsm", "xls"];

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    #[error("Not an Excel file: {0}")]
    NotAWorkbook(PathBuf),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why one renderer did not produce the PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererAttempt {
    pub renderer: &'static str,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("could not prepare working copy: {0}")]
    Prepare(#[from] PrepareError),

    #[error("cannot create {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not export to PDF: {}", Attempts(.0))]
    AllRenderersFailed(Vec<RendererAttempt>),
}

struct Attempts<'a>(&'a [RendererAttempt]);

impl fmt::Display for Attempts<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no renderer available");
        }
        for (i, attempt) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", attempt.renderer, attempt.reason)?;
        }
        Ok(())
    }
}

/// Extension check for the aggregate converter, case-insensitive.
pub fn is_excel_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| EXCEL_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(ext)))
}

/// Converts `input` into `output`, returning the name of the renderer that
/// produced it.
pub fn convert(
    input: &Path,
    output: &Path,
    print: &PrintConfig,
    renderers: &[Box<dyn PdfRenderer>],
) -> Result<&'static str, ConvertError> {
    let prepared = match prepare(input, print) {
        Ok(prepared) => Some(prepared),
        Err(PrepareError::Unsupported(path)) => {
            warn!(input = %path.display(), "format cannot be prepared, rendering original");
            None
        }
        Err(e) => return Err(e.into()),
    };
    let source = prepared.as_ref().map_or(input, |p| p.path());

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConvertError::OutputDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut attempts = Vec::new();
    for renderer in renderers {
        if !renderer.is_available() {
            debug!(renderer = renderer.name(), "renderer unavailable, skipping");
            continue;
        }
        match renderer.render(source, output, print) {
            Ok(()) => {
                info!(renderer = renderer.name(), output = %output.display(), "rendered");
                return Ok(renderer.name());
            }
            Err(e) => {
                info!(renderer = renderer.name(), error = %e, "renderer failed");
                attempts.push(RendererAttempt {
                    renderer: renderer.name(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Err(ConvertError::AllRenderersFailed(attempts))
}

/// Options of one aggregate run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Output directory; defaults to the folder, or the file's parent.
    pub out_dir: Option<PathBuf>,
    pub print: PrintConfig,
}

/// Workbooks to convert for `target` and the default output directory.
///
/// A folder yields every workbook directly inside it, sorted by path.
pub fn collect_inputs(target: &Path) -> Result<(Vec<PathBuf>, PathBuf), InputError> {
    if target.is_dir() {
        let entries = fs::read_dir(target).map_err(|source| InputError::Read {
            path: target.to_path_buf(),
            source,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_excel_file(p))
            .collect();
        files.sort();
        Ok((files, target.to_path_buf()))
    } else if target.is_file() {
        if !is_excel_file(target) {
            return Err(InputError::NotAWorkbook(target.to_path_buf()));
        }
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok((vec![target.to_path_buf()], parent))
    } else {
        Err(InputError::NotFound(target.to_path_buf()))
    }
}

/// `<out_dir>/<stem>.pdf`.
pub fn output_path(out_dir: &Path, input: &Path) -> PathBuf {
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push(".pdf");
    out_dir.join(name)
}

/// Converts every workbook of `target`. Failures are recorded in the report
/// and do not stop the batch.
pub fn run_batch(
    target: &Path,
    options: &BatchOptions,
    renderers: &[Box<dyn PdfRenderer>],
) -> Result<BatchReport, InputError> {
    let (inputs, default_out) = collect_inputs(target)?;
    let out_dir = options.out_dir.clone().unwrap_or(default_out);
    fs::create_dir_all(&out_dir).map_err(|source| InputError::OutputDir {
        path: out_dir.clone(),
        source,
    })?;

    let mut report = BatchReport::new();
    for input in inputs {
        let mut job = ConversionJob::new(&input, JobMode::Aggregate);
        job.start_processing();

        let pdf = output_path(&out_dir, &input);
        match convert(&input, &pdf, &options.print, renderers) {
            Ok(renderer) => job.mark_complete(Some(renderer), vec![pdf]),
            Err(e) => job.mark_failed(e.to_string()),
        }
        if let Some(line) = job.progress_line() {
            println!("{line}");
        }

        record_job_telemetry(&job);
        report.push(job);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{MockPdfRenderer, RenderError};
    use mockall::predicate::*;
    use pretty_assertions::assert_eq;

    fn renderer(name: &'static str, available: bool, ok: bool) -> Box<dyn PdfRenderer> {
        let mut mock = MockPdfRenderer::new();
        mock.expect_name().return_const(name);
        mock.expect_is_available().return_const(available);
        mock.expect_render().returning(move |_, output, _| {
            if ok {
                fs::write(output, b"%PDF-1.7").map_err(RenderError::Io)
            } else {
                Err(RenderError::MissingOutput(output.to_path_buf()))
            }
        });
        Box::new(mock)
    }

    fn workbook(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut book = rust_xlsxwriter::Workbook::new();
        book.add_worksheet().write_string(0, 0, "hello").unwrap();
        book.save(&path).unwrap();
        path
    }

    #[test]
    fn test_is_excel_file() {
        assert!(is_excel_file(Path::new("a.xlsx")));
        assert!(is_excel_file(Path::new("a.XLSM")));
        assert!(is_excel_file(Path::new("a.xls")));
        assert!(!is_excel_file(Path::new("a.xlsb")));
        assert!(!is_excel_file(Path::new("a.txt")));
        assert!(!is_excel_file(Path::new("xlsx")));
    }

    #[test]
    fn test_first_available_success_wins() {
        let dir = tempfile::tempdir().unwrap();
        let input = workbook(dir.path(), "book.xlsx");
        let output = dir.path().join("out").join("book.pdf");

        let renderers = vec![
            renderer("excel", false, true),
            renderer("libreoffice", true, true),
        ];
        let used = convert(&input, &output, &PrintConfig::default(), &renderers).unwrap();
        assert_eq!(used, "libreoffice");
        assert!(output.exists());
    }

    #[test]
    fn test_renders_working_copy_not_original() {
        let dir = tempfile::tempdir().unwrap();
        let input = workbook(dir.path(), "book.xlsx");
        let output = dir.path().join("book.pdf");

        let mut mock = MockPdfRenderer::new();
        mock.expect_name().return_const("excel");
        mock.expect_is_available().return_const(true);
        mock.expect_render()
            .with(
                function(|p: &Path| p.ends_with("book_print_ready.xlsx") && p.exists()),
                always(),
                always(),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));
        let renderers: Vec<Box<dyn PdfRenderer>> = vec![Box::new(mock)];

        convert(&input, &output, &PrintConfig::default(), &renderers).unwrap();
    }

    #[test]
    fn test_all_failures_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let input = workbook(dir.path(), "book.xlsx");
        let output = dir.path().join("book.pdf");

        let renderers = vec![renderer("excel", true, false), renderer("libreoffice", true, false)];
        let err = convert(&input, &output, &PrintConfig::default(), &renderers).unwrap_err();
        match &err {
            ConvertError::AllRenderersFailed(attempts) => {
                let names: Vec<_> = attempts.iter().map(|a| a.renderer).collect();
                assert_eq!(names, vec!["excel", "libreoffice"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("Could not export to PDF: excel: "));
    }

    #[test]
    fn test_no_renderer_available() {
        let dir = tempfile::tempdir().unwrap();
        let input = workbook(dir.path(), "book.xlsx");
        let err = convert(&input, &dir.path().join("b.pdf"), &PrintConfig::default(), &[]).unwrap_err();
        assert_eq!(err.to_string(), "Could not export to PDF: no renderer available");
    }

    #[test]
    fn test_legacy_input_is_rendered_directly() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("legacy.xls");
        fs::write(&input, b"not really xls").unwrap();

        let mut mock = MockPdfRenderer::new();
        mock.expect_name().return_const("libreoffice");
        mock.expect_is_available().return_const(true);
        mock.expect_render()
            .with(eq(input.clone()), always(), always())
            .times(1)
            .returning(|_, _, _| Ok(()));
        let renderers: Vec<Box<dyn PdfRenderer>> = vec![Box::new(mock)];

        convert(&input, &dir.path().join("legacy.pdf"), &PrintConfig::default(), &renderers).unwrap();
    }

    #[test]
    fn test_collect_inputs() {
        let dir = tempfile::tempdir().unwrap();
        workbook(dir.path(), "b.xlsx");
        workbook(dir.path(), "a.XLSX");
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("nested.xlsx")).unwrap();

        let (files, out) = collect_inputs(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.XLSX", "b.xlsx"]);
        assert_eq!(out, dir.path());

        let txt = dir.path().join("notes.txt");
        assert!(matches!(collect_inputs(&txt), Err(InputError::NotAWorkbook(_))));
        assert!(matches!(
            collect_inputs(&dir.path().join("missing")),
            Err(InputError::NotFound(_))
        ));
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("/out"), Path::new("/in/Report v2.1.xlsm")),
            PathBuf::from("/out/Report v2.1.pdf")
        );
    }
}
