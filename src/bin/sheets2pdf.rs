//! sheets2pdf
//!
//! Writes one PDF per visible worksheet by driving Microsoft Excel (COM on
//! Windows, AppleScript on macOS).

use clap::Parser;
use std::process::ExitCode;
use tracing::error;

use excel2pdf::automation::ExcelAutomation;
use excel2pdf::cli::{run_sheets, SheetsCli, EXIT_FAILED};
use excel2pdf::config::Config;
use excel2pdf::telemetry;

fn main() -> ExitCode {
    let cli = SheetsCli::parse();
    telemetry::init_logging();

    let automation = ExcelAutomation::new(&Config::from_env());
    match run_sheets(&cli, &automation) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{:#}", e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}
