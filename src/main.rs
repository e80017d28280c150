//! excel2pdf
//!
//! Converts Excel workbooks into PDFs that keep gridlines, row and column
//! headings, and fit-to-width scaling, with columns wide enough that numbers
//! never print as `####`.
//!
//! Each workbook is first written to a print-ready working copy, then
//! rendered with Microsoft Excel when it can be automated and with headless
//! LibreOffice otherwise.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `EXCEL2PDF_SOFFICE`: LibreOffice binary to use
//! - `EXCEL2PDF_NO_EXCEL`: skip Excel even when it is installed
//! - `RUST_LOG`: Log level (default: warn)

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error};

use excel2pdf::cli::{run_aggregate, AggregateArgs, EXIT_FAILED};
use excel2pdf::config::Config;
use excel2pdf::render::default_renderers;
use excel2pdf::telemetry;

fn main() -> ExitCode {
    let args = AggregateArgs::parse();
    telemetry::init_logging();

    let config = Config::from_env();
    debug!(?config, "Configuration loaded");

    let renderers = default_renderers(&config);
    match run_aggregate(&args, &renderers) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{:#}", e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}
