// In-memory copy of a worksheet.

use std::collections::HashSet;

use countback::CellValue;

/// The content of one cell of a worksheet.
#[derive(PartialEq, Debug, Clone)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// The text of the cell, as it is displayed.
    pub fn render(&self) -> String {
        match self {
            Cell::Empty => "".to_string(),
            Cell::Number(x) => x.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Bool(true) => "TRUE".to_string(),
            Cell::Bool(false) => "FALSE".to_string(),
        }
    }

    /// The cell as a score. Booleans are passed on as text so that they get rejected.
    pub fn to_value(&self) -> CellValue {
        match self {
            Cell::Empty => CellValue::Empty,
            Cell::Number(x) => CellValue::Number(*x),
            Cell::Text(s) => CellValue::Text(s.clone()),
            Cell::Bool(_) => CellValue::Text(self.render()),
        }
    }
}

/// A rectangular grid of cells with absolute coordinates (row 0 is the first row
/// of the sheet), and the set of cells that carry the highlight fill.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
    width: usize,
    highlighted: HashSet<(usize, usize)>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Grid {
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, Cell::Empty);
                r
            })
            .collect();
        Grid {
            rows,
            width,
            highlighted: HashSet::new(),
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    /// The cells of a row. Rows past the end of the grid are empty slices.
    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(|r| r.as_slice()).unwrap_or(&[])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    pub fn set(&mut self, row: usize, col: usize, cell: Cell) {
        if col >= self.width {
            self.width = col + 1;
            for r in self.rows.iter_mut() {
                r.resize(self.width, Cell::Empty);
            }
        }
        while self.rows.len() <= row {
            self.rows.push(vec![Cell::Empty; self.width]);
        }
        self.rows[row][col] = cell;
    }

    /// Turns the highlight of a cell on or off.
    pub fn set_highlight(&mut self, row: usize, col: usize, on: bool) {
        if on {
            self.highlighted.insert((row, col));
        } else {
            self.highlighted.remove(&(row, col));
        }
    }

    pub fn is_highlighted(&self, row: usize, col: usize) -> bool {
        self.highlighted.contains(&(row, col))
    }
}

#[cfg(test)]
pub(crate) fn grid_of(rows: &[&[&str]]) -> Grid {
    Grid::new(
        rows.iter()
            .map(|r| {
                r.iter()
                    .map(|s| match s.parse::<f64>() {
                        _ if s.is_empty() => Cell::Empty,
                        Ok(x) => Cell::Number(x),
                        Err(_) => Cell::Text(s.to_string()),
                    })
                    .collect()
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded() {
        let g = grid_of(&[&["a"], &["1", "2", "3"]]);
        assert_eq!(g.width(), 3);
        assert_eq!(g.row(0).len(), 3);
        assert_eq!(g.get(0, 2), &Cell::Empty);
        assert_eq!(g.get(10, 10), &Cell::Empty);
        assert!(g.row(5).is_empty());
    }

    #[test]
    fn set_grows_the_grid() {
        let mut g = grid_of(&[&["a"]]);
        g.set(2, 1, Cell::Number(4.0));
        assert_eq!(g.height(), 3);
        assert_eq!(g.width(), 2);
        assert_eq!(g.get(2, 1), &Cell::Number(4.0));
    }

    #[test]
    fn highlight_toggles() {
        let mut g = grid_of(&[&["a"]]);
        g.set_highlight(0, 0, true);
        assert!(g.is_highlighted(0, 0));
        g.set_highlight(0, 0, false);
        assert!(!g.is_highlighted(0, 0));
    }

    #[test]
    fn render_numbers() {
        assert_eq!(Cell::Number(50.0).render(), "50");
        assert_eq!(Cell::Number(2.5).render(), "2.5");
        assert_eq!(Cell::Bool(true).to_value(), CellValue::Text("TRUE".to_string()));
    }
}
