//! Renderer A: Microsoft Excel through automation.

use std::path::Path;
use tracing::{debug, info};

use super::{PdfRenderer, RenderError};
use crate::automation::{Automation, ExcelAutomation, PageSetup};
use crate::config::PrintConfig;

/// Opens the workbook in Excel, re-applies print settings natively and
/// exports every sheet into one PDF.
pub struct ExcelRenderer<A = ExcelAutomation> {
    automation: A,
}

impl<A: Automation> ExcelRenderer<A> {
    pub fn new(automation: A) -> Self {
        Self { automation }
    }
}

impl<A: Automation> PdfRenderer for ExcelRenderer<A> {
    fn name(&self) -> &'static str {
        "excel"
    }

    fn is_available(&self) -> bool {
        self.automation.is_available()
    }

    fn render(&self, workbook: &Path, output: &Path, print: &PrintConfig) -> Result<(), RenderError> {
        let mut session = self.automation.launch()?;
        session.open_workbook(workbook, false)?;

        let setup = PageSetup::from(print);
        for sheet in session.sheet_names()? {
            // Engine-side autofit is a refinement of the widths already written.
            if let Err(e) = session.autofit_columns(&sheet) {
                debug!(sheet = %sheet, error = %e, "column autofit skipped");
            }
            if let Err(e) = session.autofit_rows(&sheet) {
                debug!(sheet = %sheet, error = %e, "row autofit skipped");
            }
            session.apply_page_setup(&sheet, &setup)?;
        }

        session.export_pdf(output, None)?;
        session.close_workbook()?;
        info!(output = %output.display(), "exported with Excel");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{AutomationError, AutomationSession, SessionGuard};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        calls: Vec<String>,
        fail_page_setup: bool,
    }

    struct FakeSession(Rc<RefCell<Log>>);

    impl FakeSession {
        fn push(&self, call: String) {
            self.0.borrow_mut().calls.push(call);
        }
    }

    impl AutomationSession for FakeSession {
        fn open_workbook(&mut self, path: &Path, read_only: bool) -> Result<(), AutomationError> {
            self.push(format!("open {} {read_only}", path.display()));
            Ok(())
        }
        fn sheet_names(&mut self) -> Result<Vec<String>, AutomationError> {
            Ok(vec!["A".into(), "B".into()])
        }
        fn is_sheet_visible(&mut self, _: &str) -> Result<bool, AutomationError> {
            Ok(true)
        }
        fn autofit_columns(&mut self, _: &str) -> Result<(), AutomationError> {
            Err(AutomationError::Script("not supported".into()))
        }
        fn autofit_rows(&mut self, sheet: &str) -> Result<(), AutomationError> {
            self.push(format!("rows {sheet}"));
            Ok(())
        }
        fn apply_page_setup(&mut self, sheet: &str, setup: &PageSetup) -> Result<(), AutomationError> {
            if self.0.borrow().fail_page_setup {
                return Err(AutomationError::Script("page setup rejected".into()));
            }
            self.push(format!("setup {sheet} {:?}", setup.fit_to_pages_wide));
            Ok(())
        }
        fn export_pdf(&mut self, output: &Path, sheet: Option<&str>) -> Result<(), AutomationError> {
            self.push(format!("export {} {sheet:?}", output.display()));
            Ok(())
        }
        fn close_workbook(&mut self) -> Result<(), AutomationError> {
            self.push("close".into());
            Ok(())
        }
        fn quit(&mut self) {
            self.push("quit".into());
        }
    }

    struct FakeAutomation(Rc<RefCell<Log>>);

    impl Automation for FakeAutomation {
        fn is_available(&self) -> bool {
            true
        }
        fn launch(&self) -> Result<SessionGuard, AutomationError> {
            Ok(SessionGuard::new(Box::new(FakeSession(self.0.clone()))))
        }
    }

    #[test]
    fn test_render_sequence() {
        let log = Rc::new(RefCell::new(Log::default()));
        let renderer = ExcelRenderer::new(FakeAutomation(log.clone()));
        renderer
            .render(Path::new("w.xlsx"), Path::new("o.pdf"), &PrintConfig::new(false, 2))
            .unwrap();
        assert_eq!(
            log.borrow().calls,
            vec![
                "open w.xlsx false",
                "rows A",
                "setup A Some(2)",
                "rows B",
                "setup B Some(2)",
                "export o.pdf None",
                "close",
                "quit",
            ]
        );
    }

    #[test]
    fn test_page_setup_failure_fails_renderer_and_quits() {
        let log = Rc::new(RefCell::new(Log {
            fail_page_setup: true,
            ..Default::default()
        }));
        let renderer = ExcelRenderer::new(FakeAutomation(log.clone()));
        let err = renderer
            .render(Path::new("w.xlsx"), Path::new("o.pdf"), &PrintConfig::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::Automation(AutomationError::Script(_))));
        assert_eq!(log.borrow().calls.last().map(String::as_str), Some("quit"));
        assert!(!log.borrow().calls.iter().any(|c| c.starts_with("export")));
    }
}
