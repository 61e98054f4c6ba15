// Finding the tables of the leaderboard sheet.

use crate::board::grid::Grid;
use crate::board::*;

/// Finds the header row of a table in a sheet.
///
/// The ranking only needs the header row of each table. How it is found can be
/// swapped without touching the rest.
pub trait TableLocator {
    /// The first header row at or after `from_row`.
    fn locate(&self, grid: &Grid, from_row: usize) -> Option<usize>;
}

/// A header is a row whose cells jointly contain all the markers.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct HeaderMarkerLocator {
    pub markers: Vec<String>,
}

impl Default for HeaderMarkerLocator {
    fn default() -> Self {
        HeaderMarkerLocator {
            markers: vec!["Pos".to_string(), "Player".to_string()],
        }
    }
}

impl TableLocator for HeaderMarkerLocator {
    fn locate(&self, grid: &Grid, from_row: usize) -> Option<usize> {
        (from_row..grid.height()).find(|idx| {
            let rendered: Vec<String> = grid.row(*idx).iter().map(|c| c.render()).collect();
            self.markers
                .iter()
                .all(|m| rendered.iter().any(|s| s.contains(m.as_str())))
        })
    }
}

/// Headers at known rows (0-based).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FixedRowLocator {
    pub rows: Vec<usize>,
}

impl TableLocator for FixedRowLocator {
    fn locate(&self, grid: &Grid, from_row: usize) -> Option<usize> {
        self.rows
            .iter()
            .cloned()
            .filter(|r| *r >= from_row && *r < grid.height())
            .min()
    }
}

/// Finds the header rows of the leaderboard table and of the spending table below it.
pub fn locate_tables(grid: &Grid, locator: &dyn TableLocator) -> BoardResult<(usize, usize)> {
    let leaderboard = locator
        .locate(grid, 0)
        .context(LeaderboardTableNotFoundSnafu {})?;
    let spending = locator
        .locate(grid, leaderboard + 1)
        .context(SpendingTableNotFoundSnafu {})?;
    info!(
        "locate_tables: leaderboard header at row {}, spending header at row {}",
        leaderboard + 1,
        spending + 1
    );
    Ok((leaderboard, spending))
}

/// Counts the rows of a table.
///
/// The table starts right below the header and stops before the totals row, the
/// first row without a name, or the end of the sheet.
pub fn extract_rows(grid: &Grid, header_row: usize, name_col: usize, totals_label: &str) -> usize {
    let first = header_row + 1;
    let count = (first..grid.height())
        .take_while(|idx| {
            let name = grid.get(*idx, name_col);
            !name.is_empty() && name.render() != totals_label
        })
        .count();
    debug!(
        "extract_rows: header row {}: {} rows before {:?}",
        header_row, count, totals_label
    );
    count
}
