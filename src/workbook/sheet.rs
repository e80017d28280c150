//! Worksheet XML: cell extraction and the print-layout rewrite.
//!
//! The rewrite streams the original part event by event, replacing only the
//! elements it owns (`cols`, `printOptions`, `pageSetup`, and the
//! `pageSetUpPr` child of `sheetPr`) and inserting them at their schema
//! position when absent. Everything else is written back verbatim.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;

use super::styles::Styles;
use super::{attribute, attributes, Cell, WorkbookError};
use crate::config::{Orientation, PrintConfig};
use crate::width::CellValue;

/// Splits an `A1`-style reference into 1-based (row, column).
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col
            .checked_mul(26)?
            .checked_add(u32::from(ch.to_ascii_uppercase() as u8 - b'A') + 1)?;
    }
    let row = digits.parse().ok()?;
    Some((row, col))
}

#[derive(Default)]
struct PendingCell {
    row: u32,
    col: u32,
    style: Option<usize>,
    kind: Option<String>,
    value: Option<String>,
    inline: Option<String>,
}

/// Reads every cell of a worksheet part together with its number format.
pub fn read_cells(
    xml: &[u8],
    shared: &[String],
    styles: &Styles,
) -> Result<Vec<Cell>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    let mut cells = Vec::new();
    let mut row = 0u32;
    let mut last_col = 0u32;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;
    let mut in_inline_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                row = attribute(&e, b"r")?
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(row + 1);
                last_col = 0;
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                cell = Some(start_cell(&e, row, last_col)?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let pending = start_cell(&e, row, last_col)?;
                last_col = pending.col;
            }
            Event::Start(e) if cell.is_some() => match e.local_name().as_ref() {
                b"v" => in_value = true,
                b"t" => in_inline_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Text(t) if in_value || (in_inline_text && !in_phonetic) => {
                if let Some(pending) = cell.as_mut() {
                    let text = t.unescape()?;
                    let slot = if in_value {
                        &mut pending.value
                    } else {
                        &mut pending.inline
                    };
                    slot.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                b"rPh" => in_phonetic = false,
                b"c" => {
                    if let Some(pending) = cell.take() {
                        last_col = pending.col;
                        let value = resolve_value(&pending, shared);
                        if !value.is_empty() {
                            cells.push(Cell {
                                row: pending.row,
                                col: pending.col,
                                format: styles.format_code(pending.style).map(str::to_string),
                                value,
                            });
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(cells)
}

fn start_cell(e: &BytesStart<'_>, row: u32, last_col: u32) -> Result<PendingCell, WorkbookError> {
    let (row, col) = attribute(e, b"r")?
        .as_deref()
        .and_then(parse_cell_ref)
        .unwrap_or((row, last_col + 1));
    Ok(PendingCell {
        row,
        col,
        style: attribute(e, b"s")?.and_then(|s| s.parse().ok()),
        kind: attribute(e, b"t")?,
        ..Default::default()
    })
}

fn resolve_value(cell: &PendingCell, shared: &[String]) -> CellValue {
    let raw = cell.value.as_deref();
    match (cell.kind.as_deref(), raw) {
        (Some("inlineStr"), _) => cell
            .inline
            .clone()
            .map(CellValue::Text)
            .unwrap_or(CellValue::Empty),
        (_, None) => CellValue::Empty,
        (Some("s"), Some(raw)) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i))
            .map(|s| CellValue::Text(s.clone()))
            .unwrap_or(CellValue::Empty),
        (Some("b"), Some(raw)) => CellValue::Bool(raw.trim() == "1"),
        (Some("e"), Some(raw)) => CellValue::Error(raw.to_string()),
        (Some("str") | Some("d"), Some(raw)) => CellValue::Text(raw.to_string()),
        (_, Some(raw)) => match raw.trim().parse::<f64>() {
            Ok(v) => CellValue::Number(v),
            Err(_) => CellValue::Text(raw.to_string()),
        },
    }
}

/// One `<col>` range of an existing `<cols>` block.
#[derive(Debug, Clone, PartialEq)]
struct ColRange {
    min: u32,
    max: u32,
    /// Attributes other than `min` and `max`.
    attrs: Vec<(String, String)>,
}

/// Layout elements already present in a worksheet part.
#[derive(Debug, Default)]
struct Existing {
    prefix: String,
    has_sheet_pr: bool,
    cols: Vec<ColRange>,
    print_options: Vec<(String, String)>,
    page_setup: Vec<(String, String)>,
    page_setup_pr: Vec<(String, String)>,
}

fn survey(xml: &[u8]) -> Result<Existing, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    let mut existing = Existing::default();
    let mut depth = 0usize;
    let mut parent: Vec<Vec<u8>> = Vec::new();

    loop {
        let (e, is_start) = match reader.read_event()? {
            Event::Start(e) => (e, true),
            Event::Empty(e) => (e, false),
            Event::End(_) => {
                depth -= 1;
                parent.pop();
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let local = e.local_name().as_ref().to_vec();
        match (depth, local.as_slice(), parent.last().map(Vec::as_slice)) {
            (0, _, _) => {
                let name = e.name();
                let qualified = name.as_ref();
                if let Some(pos) = qualified.iter().position(|b| *b == b':') {
                    existing.prefix = String::from_utf8_lossy(&qualified[..=pos]).into_owned();
                }
            }
            (1, b"sheetPr", _) => existing.has_sheet_pr = true,
            (1, b"printOptions", _) => existing.print_options = attributes(&e)?,
            (1, b"pageSetup", _) => existing.page_setup = attributes(&e)?,
            (2, b"pageSetUpPr", Some(b"sheetPr")) => existing.page_setup_pr = attributes(&e)?,
            (2, b"col", Some(b"cols")) => {
                let mut attrs = attributes(&e)?;
                let min = take_u32(&mut attrs, "min");
                let max = take_u32(&mut attrs, "max");
                if let (Some(min), Some(max)) = (min, max) {
                    existing.cols.push(ColRange { min, max, attrs });
                }
            }
            _ => {}
        }

        if is_start {
            depth += 1;
            parent.push(local);
        }
    }

    Ok(existing)
}

fn take_u32(attrs: &mut Vec<(String, String)>, key: &str) -> Option<u32> {
    let pos = attrs.iter().position(|(k, _)| k == key)?;
    attrs.remove(pos).1.parse().ok()
}

/// Schema position of a `worksheet` child element.
fn element_rank(local: &[u8]) -> Option<u8> {
    const ORDER: [&[u8]; 38] = [
        b"sheetPr",
        b"dimension",
        b"sheetViews",
        b"sheetFormatPr",
        b"cols",
        b"sheetData",
        b"sheetCalcPr",
        b"sheetProtection",
        b"protectedRanges",
        b"scenarios",
        b"autoFilter",
        b"sortState",
        b"dataConsolidate",
        b"customSheetViews",
        b"mergeCells",
        b"phoneticPr",
        b"conditionalFormatting",
        b"dataValidations",
        b"hyperlinks",
        b"printOptions",
        b"pageMargins",
        b"pageSetup",
        b"headerFooter",
        b"rowBreaks",
        b"colBreaks",
        b"customProperties",
        b"cellWatches",
        b"ignoredErrors",
        b"smartTags",
        b"drawing",
        b"legacyDrawing",
        b"legacyDrawingHF",
        b"drawingHF",
        b"picture",
        b"oleObjects",
        b"controls",
        b"webPublishItems",
        b"tableParts",
    ];
    if local == b"extLst" {
        return Some(ORDER.len() as u8);
    }
    ORDER.iter().position(|name| *name == local).map(|p| p as u8)
}

const RANK_SHEET_PR: u8 = 0;
const RANK_COLS: u8 = 4;
const RANK_PRINT_OPTIONS: u8 = 19;
const RANK_PAGE_SETUP: u8 = 21;

/// An element this rewrite emits, ready to be written.
struct Insertion {
    rank: u8,
    events: Vec<Event<'static>>,
}

struct Plan {
    prefix: String,
    owned: Vec<u8>,
    pending: Vec<Insertion>,
    page_setup_pr: Option<BytesStart<'static>>,
}

impl Plan {
    fn new(existing: &Existing, widths: &BTreeMap<u32, f64>, print: Option<&PrintConfig>) -> Self {
        let prefix = existing.prefix.clone();
        let mut owned = Vec::new();
        let mut pending = Vec::new();
        let mut page_setup_pr = None;

        if let Some(print) = print {
            let mut pr_attrs = existing.page_setup_pr.clone();
            set_attr(&mut pr_attrs, "fitToPage", "1");
            let pr = element(&prefix, "pageSetUpPr", &pr_attrs);

            if existing.has_sheet_pr {
                page_setup_pr = Some(pr);
            } else {
                let sheet_pr = element(&prefix, "sheetPr", &[]);
                let end = BytesEnd::new(format!("{prefix}sheetPr"));
                pending.push(Insertion {
                    rank: RANK_SHEET_PR,
                    events: vec![Event::Start(sheet_pr), Event::Empty(pr), Event::End(end)],
                });
            }

            let mut options = existing.print_options.clone();
            set_attr(&mut options, "gridLines", flag(print.gridlines));
            set_attr(&mut options, "headings", flag(print.headings));
            owned.push(RANK_PRINT_OPTIONS);
            pending.push(Insertion {
                rank: RANK_PRINT_OPTIONS,
                events: vec![Event::Empty(element(&prefix, "printOptions", &options))],
            });

            let mut setup = existing.page_setup.clone();
            let orientation = match print.orientation {
                Orientation::Portrait => "portrait",
                Orientation::Landscape => "landscape",
            };
            set_attr(&mut setup, "orientation", orientation);
            set_attr(&mut setup, "fitToWidth", &print.pages_wide.to_string());
            set_attr(
                &mut setup,
                "fitToHeight",
                &print.pages_tall.unwrap_or(0).to_string(),
            );
            owned.push(RANK_PAGE_SETUP);
            pending.push(Insertion {
                rank: RANK_PAGE_SETUP,
                events: vec![Event::Empty(element(&prefix, "pageSetup", &setup))],
            });
        }

        if !widths.is_empty() {
            owned.push(RANK_COLS);
            let start = element(&prefix, "cols", &[]);
            let end = BytesEnd::new(format!("{prefix}cols"));
            let mut events = vec![Event::Start(start)];
            for range in merge_columns(&existing.cols, widths) {
                let mut attrs = vec![
                    ("min".to_string(), range.min.to_string()),
                    ("max".to_string(), range.max.to_string()),
                ];
                attrs.extend(range.attrs);
                events.push(Event::Empty(element(&prefix, "col", &attrs)));
            }
            events.push(Event::End(end));
            pending.push(Insertion {
                rank: RANK_COLS,
                events,
            });
        }

        pending.sort_by_key(|i| i.rank);
        Self {
            prefix,
            owned,
            pending,
            page_setup_pr,
        }
    }

    fn owns(&self, rank: u8) -> bool {
        self.owned.contains(&rank)
    }

    /// Writes every pending insertion ranked at or below `rank`.
    fn flush_through(
        &mut self,
        rank: u8,
        writer: &mut Writer<Vec<u8>>,
    ) -> Result<(), WorkbookError> {
        while self.pending.first().is_some_and(|i| i.rank <= rank) {
            let insertion = self.pending.remove(0);
            for event in insertion.events {
                writer.write_event(event)?;
            }
        }
        Ok(())
    }

    fn flush_before(&mut self, rank: u8, writer: &mut Writer<Vec<u8>>) -> Result<(), WorkbookError> {
        match rank.checked_sub(1) {
            Some(below) => self.flush_through(below, writer),
            None => Ok(()),
        }
    }

    fn flush_all(&mut self, writer: &mut Writer<Vec<u8>>) -> Result<(), WorkbookError> {
        self.flush_through(u8::MAX, writer)
    }

    fn is_page_setup_pr(&self, e: &BytesStart<'_>) -> bool {
        self.page_setup_pr.is_some() && e.local_name().as_ref() == b"pageSetUpPr"
    }
}

fn flag(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}

fn set_attr(attrs: &mut Vec<(String, String)>, key: &str, value: &str) {
    match attrs.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value.to_string(),
        None => attrs.push((key.to_string(), value.to_string())),
    }
}

fn element(prefix: &str, name: &str, attrs: &[(String, String)]) -> BytesStart<'static> {
    let mut e = BytesStart::new(format!("{prefix}{name}"));
    for (key, value) in attrs {
        e.push_attribute((key.as_str(), value.as_str()));
    }
    e
}

/// Combines existing `<col>` ranges with new per-column widths. Ranges are
/// split around overridden columns; an overridden column keeps the other
/// attributes (style, hidden, outline level) of the range it came from.
fn merge_columns(existing: &[ColRange], widths: &BTreeMap<u32, f64>) -> Vec<ColRange> {
    let mut out = Vec::new();

    for range in existing {
        let mut start = range.min;
        for (&col, _) in widths.range(range.min..=range.max) {
            if col > start {
                out.push(ColRange {
                    min: start,
                    max: col - 1,
                    attrs: range.attrs.clone(),
                });
            }
            start = col + 1;
        }
        if start <= range.max {
            out.push(ColRange {
                min: start,
                max: range.max,
                attrs: range.attrs.clone(),
            });
        }
    }

    for (&col, &width) in widths {
        let mut attrs: Vec<(String, String)> = existing
            .iter()
            .find(|r| r.min <= col && col <= r.max)
            .map(|r| {
                r.attrs
                    .iter()
                    .filter(|(k, _)| !matches!(k.as_str(), "width" | "customWidth" | "bestFit"))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        attrs.insert(0, ("width".to_string(), format_width(width)));
        attrs.insert(1, ("customWidth".to_string(), "1".to_string()));
        out.push(ColRange {
            min: col,
            max: col,
            attrs,
        });
    }

    out.sort_by_key(|r| r.min);
    out
}

fn format_width(width: f64) -> String {
    if width.fract() == 0.0 {
        format!("{:.0}", width)
    } else {
        format!("{:.2}", width)
    }
}

/// Rewrites a worksheet part with new column widths and, when given, print
/// settings. With no widths and no print settings the part is returned as
/// written by the streaming writer, which is byte-equivalent XML.
pub fn patch_worksheet(
    xml: &[u8],
    widths: &BTreeMap<u32, f64>,
    print: Option<&PrintConfig>,
) -> Result<Vec<u8>, WorkbookError> {
    let existing = survey(xml)?;
    let mut plan = Plan::new(&existing, widths, print);
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 512));
    let mut depth = 0usize;
    let mut skip_until: Option<usize> = None;
    let mut in_sheet_pr = false;

    loop {
        let event = reader.read_event()?;

        if let Some(target) = skip_until {
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == target {
                        skip_until = None;
                    }
                }
                Event::Eof => {
                    return Err(WorkbookError::Invalid("unterminated element".to_string()))
                }
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                if depth == 1 {
                    if let Some(rank) = element_rank(&local) {
                        if plan.owns(rank) {
                            plan.flush_through(rank, &mut writer)?;
                            skip_until = Some(depth);
                            depth += 1;
                            continue;
                        }
                        plan.flush_before(rank, &mut writer)?;
                    }
                    in_sheet_pr = local == b"sheetPr";
                } else if depth == 2 && in_sheet_pr && plan.is_page_setup_pr(&e) {
                    skip_until = Some(depth);
                    depth += 1;
                    continue;
                }
                writer.write_event(Event::Start(e))?;
                depth += 1;
            }
            Event::Empty(e) => {
                let local = e.local_name().as_ref().to_vec();
                if depth == 1 {
                    if let Some(rank) = element_rank(&local) {
                        if plan.owns(rank) {
                            plan.flush_through(rank, &mut writer)?;
                            continue;
                        }
                        plan.flush_before(rank, &mut writer)?;
                    }
                    if local == b"sheetPr" {
                        if let Some(pr) = plan.page_setup_pr.take() {
                            let end = BytesEnd::new(format!("{}sheetPr", plan.prefix));
                            writer.write_event(Event::Start(e))?;
                            writer.write_event(Event::Empty(pr))?;
                            writer.write_event(Event::End(end))?;
                            continue;
                        }
                    }
                } else if depth == 2 && in_sheet_pr && plan.is_page_setup_pr(&e) {
                    continue;
                }
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                depth -= 1;
                if depth == 1 && in_sheet_pr {
                    in_sheet_pr = false;
                    if let Some(pr) = plan.page_setup_pr.take() {
                        writer.write_event(Event::Empty(pr))?;
                    }
                }
                if depth == 0 {
                    plan.flush_all(&mut writer)?;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    Ok(writer.into_inner())
}
