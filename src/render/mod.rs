//! PDF renderers.
//!
//! Each renderer hands a prepared workbook to an external engine and asks it
//! for a PDF. The orchestrator tries them in order and keeps the first
//! success.

pub mod excel;
pub mod libreoffice;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::automation::{AutomationError, ExcelAutomation};
use crate::config::{Config, PrintConfig};

pub use excel::ExcelRenderer;
pub use libreoffice::LibreOfficeRenderer;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{0} is not installed")]
    Unavailable(&'static str),

    #[error("{0}")]
    Automation(#[from] AutomationError),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("converter exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("no PDF was produced at {0}")]
    MissingOutput(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Strategy that turns a workbook file into a PDF.
#[cfg_attr(test, mockall::automock)]
pub trait PdfRenderer {
    /// Short name shown in reports.
    fn name(&self) -> &'static str;

    /// Whether the engine behind this renderer exists on this machine.
    fn is_available(&self) -> bool;

    /// Renders `workbook` to `output`. `print` is applied natively where the
    /// engine supports it.
    fn render(&self, workbook: &Path, output: &Path, print: &PrintConfig) -> Result<(), RenderError>;
}

/// Renderers in preference order: Excel, then LibreOffice.
pub fn default_renderers(config: &Config) -> Vec<Box<dyn PdfRenderer>> {
    vec![
        Box::new(ExcelRenderer::new(ExcelAutomation::new(config))),
        Box::new(LibreOfficeRenderer::new(config)),
    ]
}
