//! Command-line front ends.
//!
//! `excel2pdf` renders each workbook into one PDF with Excel or LibreOffice.
//! `sheets2pdf` drives Excel to write one PDF per visible worksheet.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::automation::Automation;
use crate::config::PrintConfig;
use crate::convert::{run_batch, BatchOptions};
use crate::job::{BatchReport, ConversionJob, JobMode};
use crate::render::PdfRenderer;
use crate::sheets::{
    export_folder, export_workbook_sheets_to_pdf, FolderOptions, SheetExportError,
    SheetExportOptions,
};
use crate::telemetry::record_job_telemetry;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_INVALID_INPUT: u8 = 2;
pub const EXIT_FAILED: u8 = 3;

/// Convert Excel workbooks to PDF with gridlines, headings and fit-to-width.
#[derive(Debug, Parser)]
#[command(name = "excel2pdf", version)]
pub struct AggregateArgs {
    /// Workbook (.xlsx, .xlsm, .xls) or folder of workbooks
    pub target: PathBuf,

    /// Output folder (default: next to the input)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Landscape orientation
    #[arg(long)]
    pub landscape: bool,

    /// Fit to N pages wide
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub fitwide: i64,

    /// Write a JSON report of every conversion to FILE
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

impl AggregateArgs {
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            out_dir: self.out.clone(),
            print: PrintConfig::new(self.landscape, self.fitwide),
        }
    }
}

/// Runs `excel2pdf` and returns the process exit code.
pub fn run_aggregate(args: &AggregateArgs, renderers: &[Box<dyn PdfRenderer>]) -> Result<u8> {
    let report = match run_batch(&args.target, &args.batch_options(), renderers) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{e}");
            return Ok(EXIT_INVALID_INPUT);
        }
    };

    write_report(&report, args.report.as_ref())?;
    Ok(if report.has_failures() {
        EXIT_FAILED
    } else {
        EXIT_SUCCESS
    })
}

fn write_report(report: &BatchReport, path: Option<&PathBuf>) -> Result<()> {
    if let Some(path) = path {
        report.write_json(path)?;
    }
    Ok(())
}

/// Export each visible worksheet of Excel workbooks to its own PDF.
#[derive(Debug, Parser)]
#[command(name = "sheets2pdf", version)]
pub struct SheetsCli {
    #[command(subcommand)]
    pub command: SheetsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SheetsCommand {
    /// Convert one workbook
    Convert(ConvertArgs),
    /// Convert every workbook in a folder
    ConvertFolder(ConvertFolderArgs),
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Path to the workbook
    pub file: PathBuf,

    /// Output folder (default: <workbook>_PDFs next to it)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub sheet: SheetFlags,
}

#[derive(Debug, Args)]
pub struct ConvertFolderArgs {
    /// Folder to scan for workbooks
    pub folder: PathBuf,

    /// Mirror the folder layout under this folder
    #[arg(short = 'o', long = "output-root")]
    pub output_root: Option<PathBuf>,

    /// Scan subfolders (default)
    #[arg(long, conflicts_with = "no_recursive")]
    pub recursive: bool,

    /// Only scan the top folder
    #[arg(long)]
    pub no_recursive: bool,

    #[command(flatten)]
    pub sheet: SheetFlags,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct SheetFlags {
    /// Also export hidden sheets
    #[arg(long)]
    pub include_hidden: bool,

    /// Force portrait orientation
    #[arg(long)]
    pub portrait: bool,

    /// Force landscape orientation
    #[arg(long)]
    pub landscape: bool,

    /// Keep each sheet's own scaling instead of one page wide
    #[arg(long)]
    pub no_fit: bool,
}

impl SheetFlags {
    /// `None` when both orientations were requested.
    pub fn options(&self) -> Option<SheetExportOptions> {
        let landscape = match (self.portrait, self.landscape) {
            (true, true) => return None,
            (true, false) => Some(false),
            (false, true) => Some(true),
            (false, false) => None,
        };
        Some(SheetExportOptions {
            include_hidden: self.include_hidden,
            fit_to_page: !self.no_fit,
            landscape,
        })
    }
}

const ORIENTATION_CONFLICT: &str = "Choose either --portrait or --landscape, not both.";

/// Runs `sheets2pdf` and returns the process exit code.
pub fn run_sheets(cli: &SheetsCli, automation: &dyn Automation) -> Result<u8> {
    match &cli.command {
        SheetsCommand::Convert(args) => {
            let Some(options) = args.sheet.options() else {
                eprintln!("{ORIENTATION_CONFLICT}");
                return Ok(EXIT_INVALID_INPUT);
            };

            let mut job = ConversionJob::new(&args.file, JobMode::PerSheet);
            job.start_processing();
            let result =
                export_workbook_sheets_to_pdf(automation, &args.file, args.output.as_deref(), &options);
            let code = match result {
                Ok(created) => {
                    for pdf in &created {
                        println!("Created: {}", pdf.display());
                    }
                    println!("Done. Created {} PDF(s).", created.len());
                    job.mark_complete(None, created);
                    EXIT_SUCCESS
                }
                Err(e @ SheetExportError::NotFound(_)) => {
                    eprintln!("{e}");
                    return Ok(EXIT_INVALID_INPUT);
                }
                Err(e) => {
                    eprintln!("Failed: {e}");
                    job.mark_failed(e.to_string());
                    EXIT_FAILED
                }
            };
            record_job_telemetry(&job);
            Ok(code)
        }
        SheetsCommand::ConvertFolder(args) => {
            let Some(sheets) = args.sheet.options() else {
                eprintln!("{ORIENTATION_CONFLICT}");
                return Ok(EXIT_INVALID_INPUT);
            };
            let options = FolderOptions {
                recursive: !args.no_recursive,
                output_root: args.output_root.clone(),
                sheets,
            };

            let report = match export_folder(automation, &args.folder, &options) {
                Ok(report) => report,
                Err(e @ SheetExportError::NotFound(_)) => {
                    eprintln!("Folder not found: {}", args.folder.display());
                    tracing::debug!(error = %e, "folder rejected");
                    return Ok(EXIT_INVALID_INPUT);
                }
                Err(e) => {
                    eprintln!("{e}");
                    return Ok(EXIT_FAILED);
                }
            };

            println!("Done. Created {} PDF(s).", report.created_count());
            Ok(if report.has_failures() {
                EXIT_FAILED
            } else {
                EXIT_SUCCESS
            })
        }
    }
}
