//! Microsoft Excel driven through COM (Windows) or AppleScript (macOS).

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::host::{OsaScriptHost, PowerShellHost, ScriptHost};
use super::{Automation, AutomationError, AutomationSession, PageSetup, SessionGuard};
use crate::config::{Config, Orientation};

/// Default Excel application bundle on macOS.
pub const MAC_EXCEL_APP: &str = "/Applications/Microsoft Excel.app";

/// `XlSheetVisibility.xlSheetVisible`.
const XL_SHEET_VISIBLE: &str = "-1";

/// `XlFixedFormatType.xlTypePDF`.
const XL_TYPE_PDF: u8 = 0;

/// The two automation call shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptDialect {
    /// PowerShell over the Excel COM object model.
    Com,
    /// AppleScript against the Excel scripting dictionary.
    AppleScript,
}

impl ScriptDialect {
    /// Dialect for the running operating system, if Excel automation exists
    /// there at all.
    pub fn for_host() -> Option<Self> {
        if cfg!(target_os = "windows") {
            Some(ScriptDialect::Com)
        } else if cfg!(target_os = "macos") {
            Some(ScriptDialect::AppleScript)
        } else {
            None
        }
    }

    fn launch(self) -> String {
        match self {
            ScriptDialect::Com => concat!(
                "$excel = New-Object -ComObject Excel.Application; ",
                "$excel.Visible = $false; $excel.DisplayAlerts = $false; ",
                "$excel.ScreenUpdating = $false; $wb = $null",
            )
            .to_string(),
            ScriptDialect::AppleScript => tell(&["launch", "set display alerts to false"]),
        }
    }

    fn open(self, path: &Path, read_only: bool) -> String {
        let path = path.to_string_lossy();
        match self {
            ScriptDialect::Com => format!(
                "$wb = $excel.Workbooks.Open({}, 0, ${}); $wb.Name",
                ps_quote(&path),
                read_only
            ),
            ScriptDialect::AppleScript => tell(&[
                &format!(
                    "open workbook workbook file name {} update links do not update links read only {}",
                    as_quote(&path),
                    read_only
                ),
                "return name of active workbook",
            ]),
        }
    }

    fn sheet_names(self, book: &str) -> String {
        match self {
            ScriptDialect::Com => "$wb.Sheets | ForEach-Object { $_.Name }".to_string(),
            ScriptDialect::AppleScript => tell(&[
                "set out to \"\"",
                &format!("repeat with s in (every sheet of workbook {})", as_quote(book)),
                "set out to out & (name of s) & linefeed",
                "end repeat",
                "return out",
            ]),
        }
    }

    fn sheet_visibility(self, book: &str, sheet: &str) -> String {
        match self {
            ScriptDialect::Com => format!("[int]$wb.Sheets.Item({}).Visible", ps_quote(sheet)),
            ScriptDialect::AppleScript => tell(&[&format!(
                "return visible of sheet {} of workbook {}",
                as_quote(sheet),
                as_quote(book)
            )]),
        }
    }

    fn parse_visible(self, output: &str) -> bool {
        let output = output.trim();
        match self {
            ScriptDialect::Com => output == XL_SHEET_VISIBLE,
            ScriptDialect::AppleScript => !(output.eq_ignore_ascii_case("false")
                || output.contains("hidden")),
        }
    }

    fn autofit(self, book: &str, sheet: &str, columns: bool) -> String {
        match self {
            ScriptDialect::Com => format!(
                "$null = $wb.Sheets.Item({}).UsedRange.{}.AutoFit()",
                ps_quote(sheet),
                if columns { "Columns" } else { "Rows" }
            ),
            ScriptDialect::AppleScript => tell(&[&format!(
                "autofit every {} of (used range of sheet {} of workbook {})",
                if columns { "column" } else { "row" },
                as_quote(sheet),
                as_quote(book)
            )]),
        }
    }

    /// COM writes each `PageSetup` property on its own; AppleScript sets
    /// them all inside one `page setup object` block.
    fn page_setup(self, book: &str, sheet: &str, setup: &PageSetup) -> String {
        match self {
            ScriptDialect::Com => {
                let mut parts = vec![format!("$ps = $wb.Sheets.Item({}).PageSetup", ps_quote(sheet))];
                if let Some(on) = setup.gridlines {
                    parts.push(format!("$ps.PrintGridlines = ${on}"));
                }
                if let Some(on) = setup.headings {
                    parts.push(format!("$ps.PrintHeadings = ${on}"));
                }
                if let Some(wide) = setup.fit_to_pages_wide {
                    parts.push("$ps.Zoom = $false".to_string());
                    parts.push(format!("$ps.FitToPagesWide = {wide}"));
                    parts.push("$ps.FitToPagesTall = $false".to_string());
                }
                if let Some(orientation) = setup.orientation {
                    parts.push(format!("$ps.Orientation = {}", orientation.xl_value()));
                }
                parts.join("; ")
            }
            ScriptDialect::AppleScript => {
                let target = format!(
                    "page setup object of sheet {} of workbook {}",
                    as_quote(sheet),
                    as_quote(book)
                );
                let mut lines = vec![format!("tell {target}")];
                if let Some(on) = setup.gridlines {
                    lines.push(format!("set print gridlines to {on}"));
                }
                if let Some(on) = setup.headings {
                    lines.push(format!("set print headings to {on}"));
                }
                if let Some(wide) = setup.fit_to_pages_wide {
                    lines.push("set zoom to false".to_string());
                    lines.push(format!("set fit to pages wide to {wide}"));
                    lines.push("set fit to pages tall to false".to_string());
                }
                if let Some(orientation) = setup.orientation {
                    let value = match orientation {
                        Orientation::Portrait => "portrait",
                        Orientation::Landscape => "landscape",
                    };
                    lines.push(format!("set page orientation to {value}"));
                }
                lines.push("end tell".to_string());
                let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
                tell(&refs)
            }
        }
    }

    fn export(self, book: &str, output: &Path, sheet: Option<&str>) -> String {
        let output = output.to_string_lossy();
        match (self, sheet) {
            (ScriptDialect::Com, None) => {
                format!("$wb.ExportAsFixedFormat({XL_TYPE_PDF}, {})", ps_quote(&output))
            }
            (ScriptDialect::Com, Some(sheet)) => format!(
                "$wb.Sheets.Item({}).ExportAsFixedFormat({XL_TYPE_PDF}, {})",
                ps_quote(sheet),
                ps_quote(&output)
            ),
            (ScriptDialect::AppleScript, None) => tell(&[&format!(
                "save workbook as workbook {} filename {} file format PDF file format",
                as_quote(book),
                as_quote(&output)
            )]),
            (ScriptDialect::AppleScript, Some(sheet)) => tell(&[
                &format!(
                    "activate object sheet {} of workbook {}",
                    as_quote(sheet),
                    as_quote(book)
                ),
                &format!(
                    "save as sheet {} of workbook {} filename {} file format PDF file format",
                    as_quote(sheet),
                    as_quote(book),
                    as_quote(&output)
                ),
            ]),
        }
    }

    fn close(self, book: &str) -> String {
        match self {
            ScriptDialect::Com => "$wb.Close($false); $wb = $null".to_string(),
            ScriptDialect::AppleScript => {
                tell(&[&format!("close workbook {} saving no", as_quote(book))])
            }
        }
    }

    /// Script printing the operating-system process id of the Excel
    /// instance, so it can be killed if it refuses to quit.
    fn process_id(self) -> String {
        match self {
            ScriptDialect::Com => concat!(
                "Add-Type -Namespace Excel2Pdf -Name Win32 -MemberDefinition ",
                "'[DllImport(\"user32.dll\")] public static extern uint ",
                "GetWindowThreadProcessId(IntPtr hWnd, out uint pid);'; ",
                "$__pid = [uint32]0; ",
                "[void][Excel2Pdf.Win32]::GetWindowThreadProcessId([IntPtr]$excel.Hwnd, [ref]$__pid); ",
                "$__pid",
            )
            .to_string(),
            ScriptDialect::AppleScript => concat!(
                "tell application \"System Events\" to return unix id of ",
                "(first process whose bundle identifier is \"com.microsoft.Excel\")",
            )
            .to_string(),
        }
    }

    fn quit(self) -> String {
        match self {
            ScriptDialect::Com => concat!(
                "if ($wb) { $wb.Close($false) }; $excel.Quit(); ",
                "[void][System.Runtime.InteropServices.Marshal]::ReleaseComObject($excel)",
            )
            .to_string(),
            ScriptDialect::AppleScript => tell(&["quit saving no"]),
        }
    }
}

fn tell(lines: &[&str]) -> String {
    let mut script = String::from("tell application \"Microsoft Excel\"\n");
    for line in lines {
        script.push_str(line);
        script.push('\n');
    }
    script.push_str("end tell");
    script
}

/// PowerShell single-quoted literal. Typographic single quotes also close a
/// literal in PowerShell, so they are doubled too.
fn ps_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if matches!(ch, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
            out.push(ch);
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// AppleScript string literal.
fn as_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if matches!(ch, '"' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// A running Excel instance reached through a [`ScriptHost`].
pub struct ExcelSession {
    host: Box<dyn ScriptHost>,
    dialect: ScriptDialect,
    book: Option<String>,
    pid: Option<u32>,
    running: bool,
}

impl ExcelSession {
    /// Starts Excel inside `host`.
    pub fn start(mut host: Box<dyn ScriptHost>, dialect: ScriptDialect) -> Result<Self, AutomationError> {
        if let Err(e) = host.run(&dialect.launch()) {
            host.shutdown();
            return Err(e);
        }
        let pid = match host.run(&dialect.process_id()) {
            Ok(out) => out.trim().parse::<u32>().ok().filter(|pid| *pid != 0),
            Err(e) => {
                debug!(error = %e, "Excel process id unavailable");
                None
            }
        };
        debug!(?pid, "Excel started");
        Ok(Self {
            host,
            dialect,
            book: None,
            pid,
            running: true,
        })
    }

    fn book(&self) -> Result<&str, AutomationError> {
        self.book.as_deref().ok_or(AutomationError::NoWorkbook)
    }

    fn call(&mut self, script: String) -> Result<String, AutomationError> {
        debug!(dialect = ?self.dialect, "automation call");
        self.host.run(&script)
    }
}

impl AutomationSession for ExcelSession {
    fn open_workbook(&mut self, path: &Path, read_only: bool) -> Result<(), AutomationError> {
        let name = self.call(self.dialect.open(path, read_only))?;
        self.book = Some(name.trim().to_string());
        Ok(())
    }

    fn sheet_names(&mut self) -> Result<Vec<String>, AutomationError> {
        let script = self.dialect.sheet_names(self.book()?);
        let output = self.call(script)?;
        let separator = match self.dialect {
            ScriptDialect::Com => '\t',
            ScriptDialect::AppleScript => '\n',
        };
        Ok(output
            .split(separator)
            .map(|s| s.trim_end_matches('\r'))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn is_sheet_visible(&mut self, sheet: &str) -> Result<bool, AutomationError> {
        let script = self.dialect.sheet_visibility(self.book()?, sheet);
        let output = self.call(script)?;
        Ok(self.dialect.parse_visible(&output))
    }

    fn autofit_columns(&mut self, sheet: &str) -> Result<(), AutomationError> {
        let script = self.dialect.autofit(self.book()?, sheet, true);
        self.call(script).map(drop)
    }

    fn autofit_rows(&mut self, sheet: &str) -> Result<(), AutomationError> {
        let script = self.dialect.autofit(self.book()?, sheet, false);
        self.call(script).map(drop)
    }

    fn apply_page_setup(&mut self, sheet: &str, setup: &PageSetup) -> Result<(), AutomationError> {
        if setup.is_empty() {
            return Ok(());
        }
        let script = self.dialect.page_setup(self.book()?, sheet, setup);
        self.call(script).map(drop)
    }

    fn export_pdf(&mut self, output: &Path, sheet: Option<&str>) -> Result<(), AutomationError> {
        let script = self.dialect.export(self.book()?, output, sheet);
        self.call(script).map(drop)
    }

    fn close_workbook(&mut self) -> Result<(), AutomationError> {
        let script = self.dialect.close(self.book()?);
        self.call(script)?;
        self.book = None;
        Ok(())
    }

    fn quit(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Err(e) = self.host.run(&self.dialect.quit()) {
            match self.pid {
                Some(pid) => {
                    warn!(pid, error = %e, "Excel did not quit, terminating it");
                    if let Err(e) = self.host.kill_process(pid) {
                        warn!(pid, error = %e, "failed to terminate Excel");
                    }
                }
                None => warn!(error = %e, "Excel did not quit and its process id is unknown"),
            }
        }
        self.book = None;
        self.host.shutdown();
    }
}

/// Launches Excel on Windows or macOS.
#[derive(Debug, Clone)]
pub struct ExcelAutomation {
    dialect: Option<ScriptDialect>,
    enabled: bool,
}

impl ExcelAutomation {
    pub fn new(config: &Config) -> Self {
        Self {
            dialect: ScriptDialect::for_host(),
            enabled: config.excel_enabled,
        }
    }

    fn powershell() -> Option<PathBuf> {
        which::which("powershell")
            .or_else(|_| which::which("pwsh"))
            .ok()
    }
}

impl Automation for ExcelAutomation {
    fn is_available(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.dialect {
            Some(ScriptDialect::Com) => Self::powershell().is_some(),
            Some(ScriptDialect::AppleScript) => {
                Path::new(MAC_EXCEL_APP).exists() && which::which("osascript").is_ok()
            }
            None => false,
        }
    }

    fn launch(&self) -> Result<SessionGuard, AutomationError> {
        if !self.enabled {
            return Err(AutomationError::Unavailable("disabled by configuration".to_string()));
        }
        let dialect = self.dialect.ok_or_else(|| {
            AutomationError::Unavailable("Excel automation needs Windows or macOS".to_string())
        })?;

        let host: Box<dyn ScriptHost> = match dialect {
            ScriptDialect::Com => {
                let program = Self::powershell().ok_or_else(|| {
                    AutomationError::Unavailable("PowerShell not found".to_string())
                })?;
                Box::new(PowerShellHost::spawn(&program)?)
            }
            ScriptDialect::AppleScript => {
                if !Path::new(MAC_EXCEL_APP).exists() {
                    return Err(AutomationError::Unavailable(format!("{MAC_EXCEL_APP} not found")));
                }
                let program = which::which("osascript").map_err(|_| {
                    AutomationError::Unavailable("osascript not found".to_string())
                })?;
                Box::new(OsaScriptHost::new(program))
            }
        };

        let session = ExcelSession::start(host, dialect)?;
        info!(?dialect, "Excel automation session started");
        Ok(SessionGuard::new(Box::new(session)))
    }
}
