//! Renderer B: headless LibreOffice.
//!
//! LibreOffice has no automation hook here; it prints whatever the prepared
//! workbook says, which is why the working copy carries the print settings.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

use super::{PdfRenderer, RenderError};
use crate::config::{Config, PrintConfig};

/// Application bundle binary on macOS.
pub const MAC_SOFFICE: &str = "/Applications/LibreOffice.app/Contents/MacOS/soffice";

const PATH_CANDIDATES: [&str; 2] = ["soffice", "libreoffice"];

pub struct LibreOfficeRenderer {
    configured: Option<PathBuf>,
}

impl LibreOfficeRenderer {
    pub fn new(config: &Config) -> Self {
        Self {
            configured: config.soffice_path.clone(),
        }
    }

    /// Binary to run: the configured path, the macOS bundle, then `PATH`.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = &self.configured {
            return path.exists().then(|| path.clone());
        }
        let bundle = Path::new(MAC_SOFFICE);
        if bundle.exists() {
            return Some(bundle.to_path_buf());
        }
        PATH_CANDIDATES.iter().find_map(|name| which::which(name).ok())
    }
}

/// Arguments for one headless conversion of `workbook` into `outdir`.
pub fn convert_args(workbook: &Path, outdir: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "--headless",
        "--norestore",
        "--nolockcheck",
        "--convert-to",
        "pdf:calc_pdf_Export",
        "--outdir",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(outdir.as_os_str().to_owned());
    args.push(workbook.as_os_str().to_owned());
    args
}

/// Where LibreOffice writes the PDF for `workbook`: same stem in `outdir`.
pub fn produced_path(workbook: &Path, outdir: &Path) -> PathBuf {
    let mut name = workbook.file_stem().unwrap_or_default().to_os_string();
    name.push(".pdf");
    outdir.join(name)
}

fn remove_stale(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale PDF");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

impl PdfRenderer for LibreOfficeRenderer {
    fn name(&self) -> &'static str {
        "libreoffice"
    }

    fn is_available(&self) -> bool {
        self.locate().is_some()
    }

    fn render(&self, workbook: &Path, output: &Path, _print: &PrintConfig) -> Result<(), RenderError> {
        let program = self
            .locate()
            .ok_or(RenderError::Unavailable("LibreOffice"))?;
        let outdir = match output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&outdir)?;

        // soffice can exit 0 without writing anything; only a fresh file counts.
        let produced = produced_path(workbook, &outdir);
        remove_stale(output)?;
        remove_stale(&produced)?;

        debug!(program = %program.display(), workbook = %workbook.display(), "running soffice");
        let result = Command::new(&program)
            .args(convert_args(workbook, &outdir))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RenderError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(RenderError::ExitStatus {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if !produced.exists() {
            return Err(RenderError::MissingOutput(produced));
        }
        if produced != output {
            fs::rename(&produced, output)?;
        }

        info!(output = %output.display(), "exported with LibreOffice");
        Ok(())
    }
}
