//! Run configuration: print settings, auto-fit bounds, and environment.
//!
//! Environment variables:
//! - `EXCEL2PDF_SOFFICE`: path to the LibreOffice `soffice` binary
//! - `EXCEL2PDF_NO_EXCEL`: disable the Excel renderer (`1`, `true`, ...)
//! - `RUST_LOG`: log filter (default: warn)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Environment variable naming an explicit LibreOffice binary.
pub const ENV_SOFFICE: &str = "EXCEL2PDF_SOFFICE";

/// Environment variable disabling the Excel automation renderer.
pub const ENV_NO_EXCEL: &str = "EXCEL2PDF_NO_EXCEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn from_landscape(landscape: bool) -> Self {
        if landscape {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    /// Value of the `XlPageOrientation` enumeration used by Excel automation.
    pub fn xl_value(self) -> i32 {
        match self {
            Orientation::Portrait => 1,
            Orientation::Landscape => 2,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
        }
    }
}

/// Print settings written into every worksheet of a working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintConfig {
    pub gridlines: bool,
    pub headings: bool,
    /// Fit to this many pages across; always at least 1.
    pub pages_wide: u32,
    /// Fit to this many pages down; `None` leaves height unbounded.
    pub pages_tall: Option<u32>,
    pub orientation: Orientation,
}

impl PrintConfig {
    /// Gridlines and headings on, `fit_wide` pages across (clamped to 1),
    /// unbounded height.
    pub fn new(landscape: bool, fit_wide: i64) -> Self {
        Self {
            gridlines: true,
            headings: true,
            pages_wide: fit_wide.clamp(1, i64::from(u32::MAX)) as u32,
            pages_tall: None,
            orientation: Orientation::from_landscape(landscape),
        }
    }
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self::new(false, 1)
    }
}

/// Bounds for the column auto-fit pass, in Excel width units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutofitOptions {
    pub min_width: f64,
    pub padding: f64,
    pub max_width: f64,
}

impl Default for AutofitOptions {
    fn default() -> Self {
        Self {
            min_width: 8.0,
            padding: 2.0,
            max_width: 120.0,
        }
    }
}

/// Settings resolved from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub soffice_path: Option<PathBuf>,
    pub excel_enabled: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let soffice_path = lookup(ENV_SOFFICE)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let excel_enabled = !lookup(ENV_NO_EXCEL).is_some_and(|v| is_truthy(&v));

        Self {
            soffice_path,
            excel_enabled,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_fit_wide_is_clamped() {
        assert_eq!(PrintConfig::new(false, 0).pages_wide, 1);
        assert_eq!(PrintConfig::new(false, -3).pages_wide, 1);
        assert_eq!(PrintConfig::new(true, 3).pages_wide, 3);
        assert_eq!(PrintConfig::new(true, 3).orientation, Orientation::Landscape);
        assert_eq!(PrintConfig::default().pages_tall, None);
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> =
            [(ENV_SOFFICE, "/opt/lo/soffice"), (ENV_NO_EXCEL, "1")].into();
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.soffice_path, Some(PathBuf::from("/opt/lo/soffice")));
        assert!(!config.excel_enabled);

        let config = Config::from_lookup(|_| None);
        assert_eq!(config.soffice_path, None);
        assert!(config.excel_enabled);

        let config = Config::from_lookup(|k| (k == ENV_NO_EXCEL).then(|| "false".to_string()));
        assert!(config.excel_enabled);
    }
}
