//! OOXML workbook package access.
//!
//! A workbook is opened straight from its zip container: the sheet list and
//! relationship targets from `workbook.xml`, number formats from the styles
//! part, and cell values from each worksheet part. Saving writes a new
//! package where only worksheets carrying layout changes are rewritten;
//! every other part is copied over without recompression.

pub mod sheet;
pub mod styles;

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::PrintConfig;
use crate::width::CellValue;
use styles::Styles;

const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const REL_OFFICE_DOCUMENT: &str = "/officeDocument";
const REL_WORKSHEET: &str = "/worksheet";
const REL_STYLES: &str = "/styles";
const REL_SHARED_STRINGS: &str = "/sharedStrings";

/// Upper bound on the read buffer reserved up front for one part.
const PREALLOC_LIMIT: u64 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid workbook package: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed XML attribute: {0}")]
    Attr(#[from] AttrError),

    #[error("missing package part: {0}")]
    MissingPart(String),

    #[error("invalid workbook: {0}")]
    Invalid(String),
}

/// A populated cell with its resolved number format code.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// 1-based row index.
    pub row: u32,
    /// 1-based column index.
    pub col: u32,
    pub value: CellValue,
    pub format: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Worksheet {
    pub name: String,
    pub cells: Vec<Cell>,
    /// Width overrides keyed by 1-based column index.
    pub column_widths: BTreeMap<u32, f64>,
    /// Print settings to write on save.
    pub print: Option<PrintConfig>,
    part: String,
    load_error: Option<String>,
}

impl Worksheet {
    /// Why the cells of this worksheet could not be read, if they could not.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    fn has_changes(&self) -> bool {
        self.load_error.is_none() && (self.print.is_some() || !self.column_widths.is_empty())
    }
}

pub struct Workbook {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
    worksheets: Vec<Worksheet>,
}

impl Workbook {
    /// Opens an `.xlsx` / `.xlsm` package and reads every worksheet.
    ///
    /// A worksheet whose XML cannot be read is kept with no cells and a
    /// [`Worksheet::load_error`]; it is copied unchanged on save.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkbookError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let workbook_part = read_optional_part(&mut archive, "_rels/.rels")?
            .map(|xml| parse_relationships(&xml, ""))
            .transpose()?
            .and_then(|rels| {
                rels.into_values()
                    .find(|rel| rel.kind.ends_with(REL_OFFICE_DOCUMENT))
                    .map(|rel| rel.target)
            })
            .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string());

        let workbook_xml = read_part(&mut archive, &workbook_part)?;
        let base = part_directory(&workbook_part);
        let rels = match read_optional_part(&mut archive, &rels_part_for(&workbook_part))? {
            Some(xml) => parse_relationships(&xml, base)?,
            None => HashMap::new(),
        };

        let styles = match find_target(&rels, REL_STYLES) {
            Some(target) => match read_optional_part(&mut archive, target)? {
                Some(xml) => Styles::parse(&xml)?,
                None => Styles::default(),
            },
            None => Styles::default(),
        };
        let shared = match find_target(&rels, REL_SHARED_STRINGS) {
            Some(target) => match read_optional_part(&mut archive, target)? {
                Some(xml) => styles::parse_shared_strings(&xml)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        let mut worksheets = Vec::new();
        for entry in parse_sheet_list(&workbook_xml)? {
            let Some(rel) = rels.get(&entry.rel_id) else {
                warn!(sheet = %entry.name, "sheet has no relationship target, skipping");
                continue;
            };
            if !rel.kind.ends_with(REL_WORKSHEET) {
                debug!(sheet = %entry.name, kind = %rel.kind, "not a worksheet, skipping");
                continue;
            }

            let (cells, load_error) = match read_part(&mut archive, &rel.target)
                .and_then(|xml| sheet::read_cells(&xml, &shared, &styles))
            {
                Ok(cells) => (cells, None),
                Err(e) => {
                    warn!(sheet = %entry.name, error = %e, "failed to read worksheet cells");
                    (Vec::new(), Some(e.to_string()))
                }
            };

            worksheets.push(Worksheet {
                name: entry.name,
                cells,
                column_widths: BTreeMap::new(),
                print: None,
                part: rel.target.clone(),
                load_error,
            });
        }

        Ok(Self {
            path,
            archive,
            worksheets,
        })
    }

    pub fn worksheets(&self) -> &[Worksheet] {
        &self.worksheets
    }

    pub fn worksheets_mut(&mut self) -> &mut [Worksheet] {
        &mut self.worksheets
    }

    /// Writes the workbook with its layout changes to `dest`.
    ///
    /// A worksheet whose rewrite fails is logged and copied unchanged.
    pub fn save_as(&mut self, dest: impl AsRef<Path>) -> Result<(), WorkbookError> {
        let dest = dest.as_ref();
        if dest == self.path {
            return Err(WorkbookError::Invalid(format!(
                "refusing to overwrite source workbook {}",
                dest.display()
            )));
        }

        let mut rewritten: HashMap<String, Vec<u8>> = HashMap::new();
        for sheet in self.worksheets.iter().filter(|s| s.has_changes()) {
            let xml = read_part(&mut self.archive, &sheet.part)?;
            match sheet::patch_worksheet(&xml, &sheet.column_widths, sheet.print.as_ref()) {
                Ok(bytes) => {
                    rewritten.insert(sheet.part.clone(), bytes);
                }
                Err(e) => {
                    warn!(sheet = %sheet.name, error = %e, "failed to rewrite worksheet, copying unchanged");
                }
            }
        }

        let mut zip = ZipWriter::new(File::create(dest)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for index in 0..self.archive.len() {
            let entry = self.archive.by_index_raw(index)?;
            match rewritten.remove(entry.name()) {
                Some(bytes) => {
                    let name = entry.name().to_string();
                    drop(entry);
                    zip.start_file(name, options)?;
                    zip.write_all(&bytes)?;
                }
                None => zip.raw_copy_file(entry)?,
            }
        }
        zip.finish()?;

        debug!(dest = %dest.display(), "workbook saved");
        Ok(())
    }
}

struct SheetEntry {
    name: String,
    rel_id: String,
}

fn parse_sheet_list(xml: &[u8]) -> Result<Vec<SheetEntry>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attribute(&e, b"name")?.unwrap_or_default();
                let rel_id = e
                    .attributes()
                    .filter_map(Result::ok)
                    .find(|a| a.key.local_name().as_ref() == b"id")
                    .map(|a| a.unescape_value().map(|v| v.into_owned()))
                    .transpose()?
                    .ok_or_else(|| WorkbookError::Invalid(format!("sheet {name:?} has no r:id")))?;
                sheets.push(SheetEntry { name, rel_id });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

struct Relationship {
    kind: String,
    target: String,
}

/// Parses a `.rels` part; targets are resolved against `base`, the
/// directory of the source part (empty for the package root).
fn parse_relationships(
    xml: &[u8],
    base: &str,
) -> Result<HashMap<String, Relationship>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if attribute(&e, b"TargetMode")?.as_deref() == Some("External") {
                    continue;
                }
                let id = attribute(&e, b"Id")?;
                let kind = attribute(&e, b"Type")?.unwrap_or_default();
                let target = attribute(&e, b"Target")?;
                if let (Some(id), Some(target)) = (id, target) {
                    rels.insert(
                        id,
                        Relationship {
                            kind,
                            target: resolve_target(base, &target),
                        },
                    );
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

fn find_target<'a>(rels: &'a HashMap<String, Relationship>, suffix: &str) -> Option<&'a str> {
    rels.values()
        .find(|rel| rel.kind.ends_with(suffix))
        .map(|rel| rel.target.as_str())
}

fn part_directory(part: &str) -> &str {
    part.rfind('/').map(|i| &part[..i]).unwrap_or("")
}

fn rels_part_for(part: &str) -> String {
    let dir = part_directory(part);
    let file = part.rsplit('/').next().unwrap_or(part);
    if dir.is_empty() {
        format!("_rels/{file}.rels")
    } else {
        format!("{dir}/_rels/{file}.rels")
    }
}

/// Resolves a relationship target to a zip entry name.
fn resolve_target(base: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None if base.is_empty() => target.to_string(),
        None => format!("{base}/{target}"),
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn read_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, WorkbookError> {
    read_optional_part(archive, name)?.ok_or_else(|| WorkbookError::MissingPart(name.to_string()))
}

fn read_optional_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, WorkbookError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::with_capacity(prealloc_capacity(file.size()));
    file.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

/// Buffer size to reserve for a part whose header declares `declared`
/// bytes. The header is not trusted beyond [`PREALLOC_LIMIT`].
fn prealloc_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(PREALLOC_LIMIT)).unwrap_or(0)
}

/// Value of the attribute whose qualified name is `key`.
pub(crate) fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, WorkbookError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// All attributes as (qualified name, unescaped value) pairs, in order.
pub(crate) fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, WorkbookError> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        out.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            attr.unescape_value()?.into_owned(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("xl", "worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("xl", "/xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("xl/worksheets", "../styles.xml"), "xl/styles.xml");
        assert_eq!(resolve_target("", "xl/workbook.xml"), "xl/workbook.xml");
    }

    #[test]
    fn test_declared_part_size_is_capped() {
        assert_eq!(prealloc_capacity(1024), 1024);
        assert_eq!(prealloc_capacity(u64::MAX), PREALLOC_LIMIT as usize);
    }

    #[test]
    fn test_rels_part_for() {
        assert_eq!(rels_part_for("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(rels_part_for("workbook.xml"), "_rels/workbook.xml.rels");
    }

    #[test]
    fn test_sheet_list() {
        let xml = br#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Data" sheetId="1" r:id="rId1"/>
    <sheet name="Secret &amp; Co" sheetId="2" state="hidden" r:id="rId2"/>
  </sheets>
</workbook>"#;
        let sheets = parse_sheet_list(xml).unwrap();
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[0].name, "Data");
        assert_eq!(sheets[1].name, "Secret & Co");
        assert_eq!(sheets[1].rel_id, "rId2");
    }

    #[test]
    fn test_relationships_skip_external() {
        let xml = br#"<Relationships>
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId9" Type="http://x/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;
        let rels = parse_relationships(xml, "xl").unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels["rId1"].target, "xl/worksheets/sheet1.xml");
        assert_eq!(find_target(&rels, REL_WORKSHEET), Some("xl/worksheets/sheet1.xml"));
    }
}
