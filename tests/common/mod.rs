//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use excel2pdf::automation::{Automation, AutomationError, AutomationSession, PageSetup, SessionGuard};
use excel2pdf::config::PrintConfig;
use excel2pdf::render::{PdfRenderer, RenderError};
use rust_xlsxwriter::{Format, Workbook};

/// Writes a small workbook with a text column and a formatted number column.
pub fn write_workbook(path: &Path) {
    let mut book = Workbook::new();
    let money = Format::new().set_num_format("#,##0.00");
    let sheet = book.add_worksheet();
    sheet.set_name("Data").unwrap();
    sheet.write_string(0, 0, "Region").unwrap();
    sheet.write_string(1, 0, "North").unwrap();
    sheet.write_number_with_format(1, 1, 1234567.891, &money).unwrap();
    book.save(path).unwrap();
}

/// Renderer that writes a stub PDF, or fails for inputs whose file name
/// contains one of `fail_on`.
pub struct FakeRenderer {
    pub name: &'static str,
    pub available: bool,
    pub fail_on: Vec<&'static str>,
    pub seen: Rc<RefCell<Vec<PathBuf>>>,
}

impl FakeRenderer {
    pub fn ok(name: &'static str) -> Self {
        Self {
            name,
            available: true,
            fail_on: Vec::new(),
            seen: Rc::default(),
        }
    }

    pub fn failing(name: &'static str, fail_on: &[&'static str]) -> Self {
        Self {
            fail_on: fail_on.to_vec(),
            ..Self::ok(name)
        }
    }
}

impl PdfRenderer for FakeRenderer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn render(&self, workbook: &Path, output: &Path, _print: &PrintConfig) -> Result<(), RenderError> {
        self.seen.borrow_mut().push(workbook.to_path_buf());
        let name = workbook.file_name().unwrap().to_string_lossy().into_owned();
        if self.fail_on.iter().any(|f| name.contains(f)) {
            return Err(RenderError::MissingOutput(output.to_path_buf()));
        }
        fs::write(output, b"%PDF-1.7\n%%EOF\n")?;
        Ok(())
    }
}

/// Everything a [`FakeExcel`] session was asked to do.
#[derive(Debug, Default)]
pub struct Calls {
    pub opened: Vec<(PathBuf, bool)>,
    pub page_setups: Vec<(String, PageSetup)>,
    pub exported: Vec<(PathBuf, Option<String>)>,
    pub closed: u32,
    pub quits: u32,
}

/// Automation engine over an in-memory list of sheets.
#[derive(Clone, Default)]
pub struct FakeExcel {
    pub sheets: Vec<(String, bool)>,
    pub fail_export: HashSet<String>,
    pub fail_open: bool,
    pub calls: Rc<RefCell<Calls>>,
}

impl FakeExcel {
    pub fn with_sheets(sheets: &[(&str, bool)]) -> Self {
        Self {
            sheets: sheets.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
            ..Default::default()
        }
    }
}

impl Automation for FakeExcel {
    fn is_available(&self) -> bool {
        true
    }

    fn launch(&self) -> Result<SessionGuard, AutomationError> {
        Ok(SessionGuard::new(Box::new(self.clone())))
    }
}

impl AutomationSession for FakeExcel {
    fn open_workbook(&mut self, path: &Path, read_only: bool) -> Result<(), AutomationError> {
        if self.fail_open {
            return Err(AutomationError::Script("file is corrupt".into()));
        }
        self.calls.borrow_mut().opened.push((path.to_path_buf(), read_only));
        Ok(())
    }

    fn sheet_names(&mut self) -> Result<Vec<String>, AutomationError> {
        Ok(self.sheets.iter().map(|(n, _)| n.clone()).collect())
    }

    fn is_sheet_visible(&mut self, sheet: &str) -> Result<bool, AutomationError> {
        self.sheets
            .iter()
            .find(|(n, _)| n == sheet)
            .map(|(_, v)| *v)
            .ok_or_else(|| AutomationError::Script(format!("no sheet {sheet}")))
    }

    fn autofit_columns(&mut self, _sheet: &str) -> Result<(), AutomationError> {
        Ok(())
    }

    fn autofit_rows(&mut self, _sheet: &str) -> Result<(), AutomationError> {
        Ok(())
    }

    fn apply_page_setup(&mut self, sheet: &str, setup: &PageSetup) -> Result<(), AutomationError> {
        self.calls.borrow_mut().page_setups.push((sheet.to_string(), *setup));
        Ok(())
    }

    fn export_pdf(&mut self, output: &Path, sheet: Option<&str>) -> Result<(), AutomationError> {
        if sheet.is_some_and(|s| self.fail_export.contains(s)) {
            return Err(AutomationError::Script("printer error".into()));
        }
        fs::write(output, b"%PDF-1.7\n%%EOF\n")?;
        self.calls
            .borrow_mut()
            .exported
            .push((output.to_path_buf(), sheet.map(str::to_string)));
        Ok(())
    }

    fn close_workbook(&mut self) -> Result<(), AutomationError> {
        self.calls.borrow_mut().closed += 1;
        Ok(())
    }

    fn quit(&mut self) {
        self.calls.borrow_mut().quits += 1;
    }
}
