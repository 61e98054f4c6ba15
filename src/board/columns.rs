// Naming the columns of the tables and reading competitor rows.

use std::collections::HashMap;

use crate::board::grid::Cell;
use crate::board::*;

pub const POSITION_COLUMN: &str = "Pos";
pub const NAME_COLUMN: &str = "Player";
pub const POINTS_COLUMN: &str = "Points";
pub const POINTS_COLUMN_ALT: &str = "Total Points";
pub const SPEND_COLUMN: &str = "Spent ($m)";
pub const SPEND_PER_POINT_COLUMN: &str = "$m/Pt";

/// The column names of a leaderboard with the given number of rounds:
/// position, name, one column per round, points, spend and spend per point.
pub fn leaderboard_layout(round_count: usize) -> Vec<String> {
    let mut res = vec![POSITION_COLUMN.to_string(), NAME_COLUMN.to_string()];
    res.extend((1..=round_count).map(round_column_name));
    res.extend(
        [POINTS_COLUMN, SPEND_COLUMN, SPEND_PER_POINT_COLUMN]
            .iter()
            .map(|s| s.to_string()),
    );
    res
}

pub fn round_column_name(round: usize) -> String {
    format!("R{:02}", round)
}

fn is_round_column(name: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    chars.len() == 3 && chars[0] == 'R' && chars[1..].iter().all(|c| c.is_ascii_digit())
}

/// Names the columns after the labels of the header row.
///
/// A repeated label gets an occurrence counter: `Pts`, `Pts.1`, `Pts.2`. The names are
/// unique but nothing says they mean what the ranking expects.
pub fn dedup_labels(header: &[Cell]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    header
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let label = if cell.is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                cell.render()
            };
            match counts.get_mut(&label) {
                Some(count) => {
                    *count += 1;
                    format!("{}.{}", label, count)
                }
                None => {
                    counts.insert(label.clone(), 0);
                    label
                }
            }
        })
        .collect()
}

/// Where the fields of a competitor are in a table.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TableSchema {
    pub names: Vec<String>,
    pub position_col: usize,
    pub name_col: usize,
    pub round_cols: Vec<usize>,
    pub points_col: Option<usize>,
    pub spend_col: Option<usize>,
}

impl TableSchema {
    /// The schema of the leaderboard table.
    ///
    /// The expected layout is used when the sheet has exactly its number of columns.
    /// Otherwise the header labels are used, deduplicated.
    pub fn leaderboard(header: &[Cell], round_count: usize) -> BoardResult<TableSchema> {
        let layout = leaderboard_layout(round_count);
        let names = if layout.len() == header.len() {
            layout
        } else {
            warn!(
                "leaderboard: expected {} columns for {} rounds, found {}: using the header labels",
                layout.len(),
                round_count,
                header.len()
            );
            dedup_labels(header)
        };
        TableSchema::from_names(names, "leaderboard")
    }

    /// The schema of the spending table, always read from its header labels.
    pub fn spending(header: &[Cell]) -> BoardResult<TableSchema> {
        TableSchema::from_names(dedup_labels(header), "spending")
    }

    fn from_names(names: Vec<String>, table: &str) -> BoardResult<TableSchema> {
        debug!("from_names: {} table columns: {:?}", table, names);
        let find = |n: &str| names.iter().position(|s| s == n);
        let name_col = find(NAME_COLUMN).context(MissingColumnSnafu {
            column: NAME_COLUMN,
            table,
        })?;
        let position_col = find(POSITION_COLUMN).context(MissingColumnSnafu {
            column: POSITION_COLUMN,
            table,
        })?;
        let round_cols: Vec<usize> = names
            .iter()
            .enumerate()
            .filter(|(_, s)| is_round_column(s))
            .map(|(idx, _)| idx)
            .collect();
        let points_col = find(POINTS_COLUMN).or_else(|| find(POINTS_COLUMN_ALT));
        let spend_col = find(SPEND_COLUMN);
        Ok(TableSchema {
            names,
            position_col,
            name_col,
            round_cols,
            points_col,
            spend_col,
        })
    }

    /// Warns about the fields that will read as zero because their column is missing.
    pub fn check_score_columns(&self, table: &str) {
        if self.points_col.is_none() {
            warn!("{} table: no {:?} column, all points read as 0", table, POINTS_COLUMN);
        }
        if self.spend_col.is_none() {
            warn!("{} table: no {:?} column, all spend reads as 0", table, SPEND_COLUMN);
        }
        if self.round_cols.is_empty() {
            warn!("{} table: no round columns, countback is disabled", table);
        }
    }

    pub fn name(&self, cells: &[Cell]) -> String {
        cell_at(cells, self.name_col).render()
    }

    pub fn competitor(&self, cells: &[Cell]) -> CompetitorRow {
        let value = |col: Option<usize>| match col {
            Some(c) => cell_at(cells, c).to_value(),
            None => CellValue::Empty,
        };
        let position = match cell_at(cells, self.position_col) {
            Cell::Number(x) if *x >= 0.0 => *x as u32,
            _ => 0,
        };
        CompetitorRow {
            position,
            name: self.name(cells),
            round_scores: self
                .round_cols
                .iter()
                .map(|c| cell_at(cells, *c).to_value())
                .collect(),
            total_points: value(self.points_col),
            total_spend: value(self.spend_col),
        }
    }
}

fn cell_at(cells: &[Cell], col: usize) -> &Cell {
    static EMPTY: Cell = Cell::Empty;
    cells.get(col).unwrap_or(&EMPTY)
}
