//! Number formats and shared strings from a workbook package.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

use super::{attribute, WorkbookError};

/// Format code of a built-in number format ID.
pub fn builtin_format_code(id: u32) -> Option<&'static str> {
    match id {
        0 => Some("General"),
        1 => Some("0"),
        2 => Some("0.00"),
        3 => Some("#,##0"),
        4 => Some("#,##0.00"),
        9 => Some("0%"),
        10 => Some("0.00%"),
        11 => Some("0.00E+00"),
        12 => Some("# ?/?"),
        13 => Some("# ??/??"),
        14 => Some("mm-dd-yy"),
        15 => Some("d-mmm-yy"),
        16 => Some("d-mmm"),
        17 => Some("mmm-yy"),
        18 => Some("h:mm AM/PM"),
        19 => Some("h:mm:ss AM/PM"),
        20 => Some("h:mm"),
        21 => Some("h:mm:ss"),
        22 => Some("m/d/yy h:mm"),
        37 => Some("#,##0 ;(#,##0)"),
        38 => Some("#,##0 ;[Red](#,##0)"),
        39 => Some("#,##0.00;(#,##0.00)"),
        40 => Some("#,##0.00;[Red](#,##0.00)"),
        45 => Some("mm:ss"),
        46 => Some("[h]:mm:ss"),
        47 => Some("mmss.0"),
        48 => Some("##0.0E+0"),
        49 => Some("@"),
        _ => None,
    }
}

/// Cell style table reduced to what width estimation needs: the number
/// format of each `cellXfs` entry.
#[derive(Debug, Default, Clone)]
pub struct Styles {
    custom_formats: HashMap<u32, String>,
    xf_formats: Vec<u32>,
}

impl Styles {
    pub fn parse(xml: &[u8]) -> Result<Self, WorkbookError> {
        let mut styles = Styles::default();
        let mut reader = Reader::from_reader(xml);
        let mut in_cell_xfs = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"numFmt" => {
                    let id = attribute(&e, b"numFmtId")?.and_then(|v| v.parse().ok());
                    let code = attribute(&e, b"formatCode")?;
                    if let (Some(id), Some(code)) = (id, code) {
                        styles.custom_formats.insert(id, code);
                    }
                }
                Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = true,
                Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
                Event::Start(e) | Event::Empty(e)
                    if in_cell_xfs && e.local_name().as_ref() == b"xf" =>
                {
                    let id = attribute(&e, b"numFmtId")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    styles.xf_formats.push(id);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(styles)
    }

    /// Number format code for a cell's `s` attribute; `None` when the style
    /// index does not resolve.
    pub fn format_code(&self, style: Option<usize>) -> Option<&str> {
        let id = match style {
            Some(index) => *self.xf_formats.get(index)?,
            None => self.xf_formats.first().copied().unwrap_or(0),
        };
        self.custom_formats
            .get(&id)
            .map(String::as_str)
            .or_else(|| builtin_format_code(id))
    }
}

/// Parses `sharedStrings.xml` into its string items. Phonetic runs are
/// dropped, rich-text runs are concatenated.
pub fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, WorkbookError> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_text && !in_phonetic => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape()?);
                }
            }
            Event::CData(t) if in_text && !in_phonetic => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <numFmts count="1"><numFmt numFmtId="164" formatCode="0.000"/></numFmts>
  <cellStyleXfs count="1"><xf numFmtId="3"/></cellStyleXfs>
  <cellXfs count="3">
    <xf numFmtId="0" fontId="0"/>
    <xf numFmtId="4" fontId="0" applyNumberFormat="1"/>
    <xf numFmtId="164" fontId="0" applyNumberFormat="1"><alignment horizontal="left"/></xf>
  </cellXfs>
</styleSheet>"#;

    #[test]
    fn test_style_formats() {
        let styles = Styles::parse(STYLES.as_bytes()).unwrap();
        assert_eq!(styles.format_code(None), Some("General"));
        assert_eq!(styles.format_code(Some(0)), Some("General"));
        assert_eq!(styles.format_code(Some(1)), Some("#,##0.00"));
        assert_eq!(styles.format_code(Some(2)), Some("0.000"));
        assert_eq!(styles.format_code(Some(7)), None);
    }

    #[test]
    fn test_shared_strings() {
        let xml = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3">
  <si><t>plain &amp; simple</t></si>
  <si><r><rPr><b/></rPr><t>rich</t></r><r><t xml:space="preserve"> text</t></r></si>
  <si><t>漢字</t><rPh sb="0" eb="2"><t>かんじ</t></rPh></si>
  <si/>
</sst>"#;
        let strings = parse_shared_strings(xml.as_bytes()).unwrap();
        assert_eq!(strings, vec!["plain & simple", "rich text", "漢字", ""]);
    }

    #[test]
    fn test_builtin_format_code() {
        assert_eq!(builtin_format_code(0), Some("General"));
        assert_eq!(builtin_format_code(14), Some("mm-dd-yy"));
        assert_eq!(builtin_format_code(999), None);
    }
}
