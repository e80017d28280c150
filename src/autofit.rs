//! Column auto-fit from estimated display widths.

use std::collections::BTreeMap;

use crate::config::AutofitOptions;
use crate::width::estimate_display_length;
use crate::workbook::{Cell, Worksheet};

/// Widths for every column holding at least one non-empty cell:
/// `clamp(longest + padding, min_width, max_width)`.
pub fn column_widths<'a, I>(cells: I, options: &AutofitOptions) -> BTreeMap<u32, f64>
where
    I: IntoIterator<Item = &'a Cell>,
{
    let mut longest: BTreeMap<u32, usize> = BTreeMap::new();
    for cell in cells {
        if cell.value.is_empty() {
            continue;
        }
        let len = estimate_display_length(&cell.value, cell.format.as_deref());
        if len == 0 {
            continue;
        }
        let entry = longest.entry(cell.col).or_insert(0);
        *entry = (*entry).max(len);
    }

    longest
        .into_iter()
        .map(|(col, len)| {
            let width = (len as f64 + options.padding)
                .min(options.max_width)
                .max(options.min_width);
            (col, width)
        })
        .collect()
}

/// Sets column widths on `sheet` from its cells. Columns without populated
/// cells keep whatever width they already had.
pub fn autofit(sheet: &mut Worksheet, options: &AutofitOptions) {
    let widths = column_widths(&sheet.cells, options);
    sheet.column_widths.extend(widths);
}
