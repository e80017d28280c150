//! Spreadsheet automation engine.
//!
//! An [`Automation`] launches an engine process and hands back an
//! [`AutomationSession`] holding at most one open workbook. Sessions are
//! used through a [`SessionGuard`], which quits the engine on every exit
//! path so no background process is left behind.

pub mod excel;
pub mod host;

use std::ops::{Deref, DerefMut};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::config::{Orientation, PrintConfig};

pub use excel::{ExcelAutomation, ExcelSession, ScriptDialect};
pub use host::{OsaScriptHost, PowerShellHost, ScriptHost};

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("automation engine unavailable: {0}")]
    Unavailable(String),

    #[error("failed to launch automation host: {0}")]
    Launch(#[source] std::io::Error),

    #[error("automation call failed: {0}")]
    Script(String),

    #[error("automation host protocol error: {0}")]
    Protocol(String),

    #[error("no workbook is open")]
    NoWorkbook,

    #[error("I/O error talking to automation host: {0}")]
    Io(#[from] std::io::Error),
}

/// Page-setup fields to write on one sheet. `None` fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageSetup {
    pub gridlines: Option<bool>,
    pub headings: Option<bool>,
    /// Scale to this many pages across with zoom and height fitting off.
    pub fit_to_pages_wide: Option<u32>,
    pub orientation: Option<Orientation>,
}

impl PageSetup {
    pub fn is_empty(&self) -> bool {
        *self == PageSetup::default()
    }
}

impl From<&PrintConfig> for PageSetup {
    fn from(print: &PrintConfig) -> Self {
        Self {
            gridlines: Some(print.gridlines),
            headings: Some(print.headings),
            fit_to_pages_wide: Some(print.pages_wide),
            orientation: Some(print.orientation),
        }
    }
}

/// Operations the converters need from a running spreadsheet engine.
pub trait AutomationSession {
    fn open_workbook(&mut self, path: &Path, read_only: bool) -> Result<(), AutomationError>;

    /// Sheet names of the open workbook in stored order.
    fn sheet_names(&mut self) -> Result<Vec<String>, AutomationError>;

    fn is_sheet_visible(&mut self, sheet: &str) -> Result<bool, AutomationError>;

    fn autofit_columns(&mut self, sheet: &str) -> Result<(), AutomationError>;

    fn autofit_rows(&mut self, sheet: &str) -> Result<(), AutomationError>;

    fn apply_page_setup(&mut self, sheet: &str, setup: &PageSetup) -> Result<(), AutomationError>;

    /// Exports the open workbook, or only `sheet` when given, to `output`.
    fn export_pdf(&mut self, output: &Path, sheet: Option<&str>) -> Result<(), AutomationError>;

    fn close_workbook(&mut self) -> Result<(), AutomationError>;

    /// Terminates the engine. Must be safe to call more than once.
    fn quit(&mut self);
}

/// Starts automation engines.
pub trait Automation {
    /// Cheap check whether [`Automation::launch`] can possibly succeed.
    fn is_available(&self) -> bool;

    fn launch(&self) -> Result<SessionGuard, AutomationError>;
}

/// Owns a session and quits it when dropped.
pub struct SessionGuard {
    session: Box<dyn AutomationSession>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn AutomationSession>) -> Self {
        Self { session }
    }
}

impl Deref for SessionGuard {
    type Target = dyn AutomationSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        debug!("quitting automation session");
        self.session.quit();
    }
}
