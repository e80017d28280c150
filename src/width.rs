//! Display-width estimation for spreadsheet cells.
//!
//! Renderers fill a numeric cell with `#` when its column is narrower than
//! the formatted number. The estimate here is a character count of what the
//! cell would print as under its number format, used to size columns before
//! the workbook is handed to a renderer. It is a monospace proxy, not a
//! glyph measurement.

use std::fmt;

/// A cell value as read from a worksheet.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    /// Formula error literal such as `#DIV/0!`.
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(v) => write!(f, "{}", v),
            CellValue::Text(s) | CellValue::Error(s) => f.write_str(s),
            CellValue::Bool(true) => f.write_str("TRUE"),
            CellValue::Bool(false) => f.write_str("FALSE"),
        }
    }
}

/// Estimates how many characters `value` occupies when rendered with the
/// number format `format`.
///
/// Missing or unrecognised formats fall back to a General rendering, so this
/// never fails.
///
/// ```
/// use excel2pdf::width::{estimate_display_length, CellValue};
///
/// // "1,234.50"
/// assert_eq!(estimate_display_length(&CellValue::Number(1234.5), Some("0.00")), 8);
/// assert_eq!(estimate_display_length(&CellValue::Empty, Some("0.00")), 0);
/// ```
pub fn estimate_display_length(value: &CellValue, format: Option<&str>) -> usize {
    match value {
        CellValue::Empty => 0,
        CellValue::Number(v) => estimate_number(*v, format),
        other => other.to_string().chars().count(),
    }
}

fn estimate_number(v: f64, format: Option<&str>) -> usize {
    if !v.is_finite() {
        return v.to_string().len();
    }

    match NumberFormatKind::classify(format.unwrap_or("General")) {
        NumberFormatKind::General => format_general(v).len(),
        NumberFormatKind::DateTime(len) => len,
        NumberFormatKind::Fixed { decimals, percent } => {
            let scaled = if percent { v * 100.0 } else { v };
            let body = match decimals {
                0 => format_grouped_integer(scaled),
                1 | 2 => format_grouped_fixed(scaled, 2),
                3 => format_grouped_fixed(scaled, 3),
                _ => format_grouped_fixed(scaled, 4),
            };
            body.len() + usize::from(percent)
        }
    }
}

/// Rough shape of a number format code, enough to predict printed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberFormatKind {
    General,
    /// Date or time; carries the printed length of the template.
    DateTime(usize),
    Fixed { decimals: usize, percent: bool },
}

impl NumberFormatKind {
    fn classify(code: &str) -> Self {
        let section = first_section(code);
        if section.trim().is_empty() || section.trim().eq_ignore_ascii_case("general") {
            return NumberFormatKind::General;
        }
        if is_date_format(section) {
            return NumberFormatKind::DateTime(date_template_length(section));
        }

        let mut has_placeholder = false;
        let mut decimals = 0;
        let mut after_point = false;
        let mut counting = false;
        let mut percent = false;
        for token in literal_free_chars(section) {
            match token {
                '0' | '#' | '?' => {
                    has_placeholder = true;
                    if counting {
                        decimals += 1;
                    }
                }
                '.' if !after_point => {
                    after_point = true;
                    counting = true;
                }
                '%' => {
                    percent = true;
                    counting = false;
                }
                _ => counting = false,
            }
        }

        if has_placeholder {
            NumberFormatKind::Fixed { decimals, percent }
        } else {
            NumberFormatKind::General
        }
    }
}

/// Returns the positive-number section of a format code.
fn first_section(code: &str) -> &str {
    let mut in_quote = false;
    let mut escaped = false;
    for (idx, ch) in code.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if !in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            ';' if !in_quote => return &code[..idx],
            _ => {}
        }
    }
    code
}

/// Yields the characters of a format section that carry formatting meaning,
/// skipping quoted literals, escaped characters, padding and bracket tokens.
fn literal_free_chars(section: &str) -> impl Iterator<Item = char> + '_ {
    let mut chars = section.chars();
    std::iter::from_fn(move || loop {
        let ch = chars.next()?;
        match ch {
            '"' => {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                }
            }
            other => return Some(other),
        }
    })
}

/// Detects date/time format codes.
///
/// Bracketed elapsed-time tokens (`[h]`, `[mm]`) count as durations rather
/// than dates, matching how Excel stores them.
fn is_date_format(section: &str) -> bool {
    let mut escaped = false;
    let mut is_quote = false;
    let mut brackets = 0u8;
    let mut prev = ' ';
    let mut hms = false;
    let mut ap = false;

    for s in section.chars() {
        match (s, escaped, is_quote, ap, brackets) {
            (_, true, ..) => escaped = false,
            ('_' | '\\', ..) => escaped = true,
            ('"', _, true, _, _) => is_quote = false,
            (_, _, true, _, _) => (),
            ('"', _, _, _, _) => is_quote = true,
            (';', ..) => return false,
            ('[', ..) => brackets = brackets.saturating_add(1),
            (']', .., 1) if hms => return false,
            (']', ..) => brackets = brackets.saturating_sub(1),
            ('a' | 'A', _, _, false, 0) => ap = true,
            ('p' | 'm' | '/' | 'P' | 'M', _, _, true, 0) => return true,
            ('d' | 'm' | 'h' | 'y' | 's' | 'D' | 'M' | 'H' | 'Y' | 'S', _, _, false, 0) => {
                return true;
            }
            _ => {
                if !(hms && s.eq_ignore_ascii_case(&prev)) {
                    hms = prev == '[' && matches!(s, 'm' | 'h' | 's' | 'M' | 'H' | 'S');
                }
            }
        }
        prev = s;
    }
    false
}

/// Printed length of a date/time template such as `mmm d, yyyy`.
fn date_template_length(section: &str) -> usize {
    let mut len = 0;
    let mut chars = section.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    len += 1;
                }
            }
            '\\' => {
                if chars.next().is_some() {
                    len += 1;
                }
            }
            '_' => {
                chars.next();
                len += 1;
            }
            '*' => {
                chars.next();
            }
            '[' => {
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                }
            }
            'A' | 'a' => {
                let rest: String = chars.clone().take(4).collect();
                if rest.eq_ignore_ascii_case("M/PM") {
                    chars.nth(3);
                    len += 2;
                } else if rest.to_ascii_uppercase().starts_with("/P") {
                    chars.nth(1);
                    len += 1;
                } else {
                    len += 1;
                }
            }
            'y' | 'Y' | 'm' | 'M' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' => {
                let mut run = 1;
                while chars.peek().is_some_and(|c| c.eq_ignore_ascii_case(&ch)) {
                    chars.next();
                    run += 1;
                }
                len += match (ch.to_ascii_lowercase(), run) {
                    ('y', 1..=2) => 2,
                    ('y', _) => 4,
                    ('m' | 'd', 1..=2) => 2,
                    ('m' | 'd', 3) => 3,
                    ('m', 5) => 1,
                    ('m' | 'd', _) => 9,
                    _ => 2,
                };
            }
            _ => len += 1,
        }
    }
    len
}

/// Thousands-grouped rendering: integral values without decimals, others
/// with their shortest round-trip fraction.
fn format_general(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        return format_grouped_integer(v);
    }
    let plain = v.abs().to_string();
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), ""));
    let mut out = String::new();
    if v < 0.0 {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

fn format_grouped_integer(v: f64) -> String {
    let rounded = v.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::new();
    if rounded < 0.0 {
        out.push('-');
    }
    out.push_str(&group_thousands(&digits));
    out
}

fn format_grouped_fixed(v: f64, decimals: usize) -> String {
    let plain = format!("{:.*}", decimals, v.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), ""));
    let mut out = String::new();
    if v < 0.0 {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    out.push('.');
    out.push_str(frac_part);
    out
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
