//! excel2pdf library
//!
//! Spreadsheet-to-PDF export that keeps print fidelity. The PDF itself is
//! always produced by an external engine; this crate decides column widths,
//! writes print settings into a working copy, and picks the engine.
//!
//! ## Module Overview
//!
//! - `width`: estimated display length of a cell under its number format
//! - `autofit`: column widths from those estimates
//! - `workbook`: OOXML package reading and worksheet rewriting
//! - `prepare`: print-ready working copies in a temporary directory
//! - `automation`: Excel automation sessions over PowerShell or osascript
//! - `render`: Excel and LibreOffice renderers
//! - `convert`: aggregate export with renderer fallback and batches
//! - `sheets`: one PDF per worksheet
//! - `job`, `telemetry`: per-input job records and structured logging
//! - `cli`: the `excel2pdf` and `sheets2pdf` front ends
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use excel2pdf::{config::{Config, PrintConfig}, convert::convert, render::default_renderers};
//! use std::path::Path;
//!
//! let renderers = default_renderers(&Config::from_env());
//! let used = convert(
//!     Path::new("report.xlsx"),
//!     Path::new("report.pdf"),
//!     &PrintConfig::new(true, 2),
//!     &renderers,
//! )
//! .unwrap();
//! println!("rendered with {used}");
//! ```

pub mod autofit;
pub mod automation;
pub mod cli;
pub mod config;
pub mod convert;
pub mod job;
pub mod prepare;
pub mod render;
pub mod sheets;
pub mod telemetry;
pub mod width;
pub mod workbook;
