// Writing the ranked tables back.

use std::collections::BTreeSet;

use crate::board::grid::{Cell, Grid};
use crate::board::xlsx_patch::{CellPatch, FillPatch, SheetPatches};
use crate::board::*;

/// The rows of a table, as they sit in the sheet.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct TableLayout {
    /// The row right below the header.
    pub first_data_row: usize,
    pub position_col: usize,
    pub name_col: usize,
}

/// Rewrites the data rows of a table in a new order.
///
/// `order` lists the current rows (relative to the first data row) in their new
/// order. The positions are set to 1, 2, 3... and the name cell of each row is
/// highlighted if and only if the name is in `highlighted`.
pub fn rewrite_table(
    grid: &mut Grid,
    layout: &TableLayout,
    order: &[usize],
    highlighted: &BTreeSet<String>,
) {
    let original: Vec<Vec<Cell>> = order
        .iter()
        .map(|idx| grid.row(layout.first_data_row + idx).to_vec())
        .collect();
    for (idx, cells) in original.into_iter().enumerate() {
        let row = layout.first_data_row + idx;
        for (col, cell) in cells.into_iter().enumerate() {
            grid.set(row, col, cell);
        }
        grid.set(row, layout.position_col, Cell::Number((idx + 1) as f64));
        let name = grid.get(row, layout.name_col).render();
        let tied = highlighted.contains(&name);
        debug!("rewrite_table: row {}: {} (tied: {})", row + 1, name, tied);
        grid.set_highlight(row, layout.name_col, tied);
    }
}

/// Records the cells of a rewritten table that differ from the input sheet.
///
/// The name cell of every row is always patched, so that its fill is set or
/// cleared.
pub fn add_table_patches(
    patches: &mut SheetPatches,
    before: &Grid,
    after: &Grid,
    layout: &TableLayout,
    row_count: usize,
) {
    let first = layout.first_data_row;
    for row in first..first + row_count {
        for col in 0..after.width() {
            let value = after.get(row, col);
            let fill = if col == layout.name_col {
                match after.is_highlighted(row, col) {
                    true => Some(FillPatch::Highlight),
                    false => Some(FillPatch::Clear),
                }
            } else {
                None
            };
            if fill.is_some() || before.get(row, col) != value {
                patches.set(
                    row,
                    col,
                    CellPatch {
                        value: value.clone(),
                        fill,
                    },
                );
            }
        }
    }
    debug!(
        "add_table_patches: rows {}..{}: {} cells to patch so far",
        first,
        first + row_count,
        patches.len()
    );
}
