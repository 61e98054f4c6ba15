// Reading xlsx workbooks.

use calamine::{open_workbook, DataType, Range, Reader, Xlsx};

use crate::board::grid::{Cell, Grid};
use crate::board::*;

/// A worksheet, with its name.
#[derive(PartialEq, Debug, Clone)]
pub struct SheetData {
    pub name: String,
    pub grid: Grid,
}

/// Reads all the worksheets of a workbook, in order.
pub fn read_workbook(path: &str) -> BoardResult<Vec<SheetData>> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let sheets: Vec<SheetData> = workbook
        .worksheets()
        .iter()
        .map(|(name, wrange)| {
            debug!(
                "read_workbook: path: {:?} worksheet: {:?} start: {:?} size: {:?}",
                path,
                name,
                wrange.start(),
                wrange.get_size()
            );
            SheetData {
                name: name.clone(),
                grid: read_grid(wrange),
            }
        })
        .collect();
    ensure!(!sheets.is_empty(), EmptyExcelSnafu { path });
    Ok(sheets)
}

pub fn find_sheet<'a>(sheets: &'a [SheetData], name: &str, path: &str) -> BoardResult<&'a SheetData> {
    sheets
        .iter()
        .find(|s| s.name == name)
        .context(MissingSheetSnafu { sheet: name, path })
}

// The range only covers the used cells. Its rows are shifted back to their
// position in the sheet.
fn read_grid(wrange: &Range<DataType>) -> Grid {
    let (start_row, start_col) = match wrange.start() {
        Some((r, c)) => (r as usize, c as usize),
        None => return Grid::default(),
    };
    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row];
    for row in wrange.rows() {
        let mut cells: Vec<Cell> = vec![Cell::Empty; start_col];
        cells.extend(row.iter().map(read_cell));
        rows.push(cells);
    }
    Grid::new(rows)
}

fn read_cell(cell: &DataType) -> Cell {
    match cell {
        DataType::Int(i) => Cell::Number(*i as f64),
        DataType::Float(f) => Cell::Number(*f),
        // Serial date numbers.
        DataType::DateTime(f) => Cell::Number(*f),
        DataType::String(s) => Cell::Text(s.clone()),
        DataType::Bool(b) => Cell::Bool(*b),
        DataType::Empty => Cell::Empty,
        DataType::Error(e) => Cell::Text(format!("{:?}", e)),
        #[allow(unreachable_patterns)]
        other => Cell::Text(format!("{:?}", other)),
    }
}
