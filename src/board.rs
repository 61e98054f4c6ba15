use log::{debug, info, warn};

use countback::*;
use snafu::{prelude::*, ErrorCompat, Snafu};

use std::fs;

pub mod columns;
pub mod config_reader;
pub mod grid;
pub mod io_xlsx;
pub mod locator;
pub mod summary;
pub mod writer;
pub mod xlsx_patch;

use crate::board::columns::TableSchema;
use crate::board::config_reader::BoardConfig;
use crate::board::locator::{extract_rows, locate_tables, HeaderMarkerLocator, TableLocator};
use crate::board::writer::TableLayout;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BoardError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No worksheet in {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Could not find worksheet {sheet:?} in {path}"))]
    MissingSheet { sheet: String, path: String },
    #[snafu(display("Error reading the xlsx package {path}"))]
    ReadingPackage {
        source: zip::result::ZipError,
        path: String,
    },
    #[snafu(display("Missing part {part} in {path}"))]
    MissingPart { part: String, path: String },
    #[snafu(display("Error patching {part}"))]
    PatchingPart {
        source: xlsx_patch::XmlError,
        part: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingExcel {
        source: zip::result::ZipError,
        path: String,
    },
    #[snafu(display("Could not find Leaderboard table."))]
    LeaderboardTableNotFound {},
    #[snafu(display("Could not find Spending table."))]
    SpendingTableNotFound {},
    #[snafu(display("Could not find column {column:?} in the {table} table"))]
    MissingColumn { column: String, table: String },
    #[snafu(display("{source}"))]
    Ranking { source: RankingError },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error reading or writing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error writing summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Difference detected between calculated summary and reference summary {path}"))]
    SummaryMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type BoardResult<T> = Result<T, BoardError>;

/// Prints an error that ends the run.
pub fn report_error(e: &BoardError) {
    warn!("Error occured {:?}", e);
    eprintln!("An error occured: {}", e);
    if let Some(bt) = ErrorCompat::backtrace(e) {
        eprintln!("trace: {}", bt);
    }
}

/// A table of the sheet: where it is and how to read it.
struct TableView {
    header_row: usize,
    row_count: usize,
    schema: TableSchema,
}

impl TableView {
    fn layout(&self) -> TableLayout {
        TableLayout {
            first_data_row: self.header_row + 1,
            position_col: self.schema.position_col,
            name_col: self.schema.name_col,
        }
    }

    fn data_rows<'a>(&self, grid: &'a grid::Grid) -> impl Iterator<Item = &'a [grid::Cell]> {
        (self.header_row + 1..self.header_row + 1 + self.row_count).map(move |idx| grid.row(idx))
    }

    fn competitors(&self, grid: &grid::Grid) -> Vec<CompetitorRow> {
        self.data_rows(grid)
            .map(|cells| self.schema.competitor(cells))
            .collect()
    }

    fn names(&self, grid: &grid::Grid) -> Vec<String> {
        self.data_rows(grid).map(|cells| self.schema.name(cells)).collect()
    }
}

fn leaderboard_view(
    grid: &grid::Grid,
    header_row: usize,
    config: &BoardConfig,
) -> BoardResult<TableView> {
    let schema = TableSchema::leaderboard(grid.row(header_row), config.round_count)?;
    schema.check_score_columns("leaderboard");
    let row_count = extract_rows(
        grid,
        header_row,
        schema.name_col,
        &config.leaderboard_totals_label,
    );
    Ok(TableView {
        header_row,
        row_count,
        schema,
    })
}

fn spending_view(
    grid: &grid::Grid,
    header_row: usize,
    config: &BoardConfig,
) -> BoardResult<TableView> {
    let schema = TableSchema::spending(grid.row(header_row))?;
    let row_count = extract_rows(
        grid,
        header_row,
        schema.name_col,
        &config.spending_totals_label,
    );
    Ok(TableView {
        header_row,
        row_count,
        schema,
    })
}

/// Ranks the leaderboard of `input` and writes the result to `output`.
///
/// Both tables are read and ranked before anything is written. The spending table
/// follows the order of the leaderboard.
pub fn run_ranking(
    input: &str,
    output: &str,
    config: &BoardConfig,
    summary_path: Option<&str>,
    reference_path: Option<&str>,
) -> BoardResult<Ranking> {
    info!("Attempting to read leaderboard file {:?}", input);
    let highlight_rgb = config.highlight_rgb()?;
    let sheets = io_xlsx::read_workbook(input)?;
    let sheet = io_xlsx::find_sheet(&sheets, &config.sheet_name, input)?;
    let (leaderboard_header, spending_header) =
        locate_tables(&sheet.grid, &HeaderMarkerLocator::default())?;
    let leaderboard = leaderboard_view(&sheet.grid, leaderboard_header, config)?;
    let spending = spending_view(&sheet.grid, spending_header, config)?;
    info!(
        "run_ranking: {} players in the leaderboard, {} in the spending table",
        leaderboard.row_count, spending.row_count
    );

    let competitors = leaderboard.competitors(&sheet.grid);
    let ranking = rank(&competitors, &config.ranking_rules()).context(RankingSnafu {})?;
    let reference_order = ranking.names();

    let spending_names = spending.names(&sheet.grid);
    for name in reference_order.iter() {
        if !spending_names.contains(name) {
            warn!("run_ranking: player {:?} has no row in the spending table", name);
        }
    }
    let spending_order =
        reorder_by_reference(&spending_names, &reference_order).context(RankingSnafu {})?;
    let leaderboard_order: Vec<usize> = ranking.ranked.iter().map(|rc| rc.source_index).collect();

    let mut grid = sheet.grid.clone();
    writer::rewrite_table(
        &mut grid,
        &leaderboard.layout(),
        &leaderboard_order,
        &ranking.highlighted,
    );
    writer::rewrite_table(
        &mut grid,
        &spending.layout(),
        &spending_order,
        &ranking.highlighted,
    );
    let mut patches = xlsx_patch::SheetPatches::default();
    writer::add_table_patches(
        &mut patches,
        &sheet.grid,
        &grid,
        &leaderboard.layout(),
        leaderboard.row_count,
    );
    writer::add_table_patches(
        &mut patches,
        &sheet.grid,
        &grid,
        &spending.layout(),
        spending.row_count,
    );

    xlsx_patch::patch_workbook(input, output, &config.sheet_name, &patches, highlight_rgb)?;
    println!("Sorted leaderboard saved to {}", output);

    let ranking_summary = summary::build_summary(config, &ranking);
    if let Some(p) = summary_path {
        summary::write_summary(&ranking_summary, p)?;
    }
    if let Some(p) = reference_path {
        summary::check_reference(&ranking_summary, p)?;
    }
    Ok(ranking)
}

fn violation_message(v: &Violation, sheet_row: usize) -> String {
    let what = match v.level {
        TieBreakLevel::Points => "Points not descending",
        TieBreakLevel::Spend => "Spending not ascending for tied points",
        TieBreakLevel::Countback => "Countback not descending for tied points/spend",
        TieBreakLevel::Name => "Name not ascending for tied everything",
    };
    format!(
        "FAIL: {} at row {} ({} before {}). Prev: {}, Curr: {}",
        what, sheet_row, v.previous_name, v.current_name, v.previous, v.current
    )
}

/// Checks the order of the leaderboard of `input` and prints the findings.
pub fn run_verification(input: &str, config: &BoardConfig) -> BoardResult<Verification> {
    info!("Attempting to read leaderboard file {:?}", input);
    let sheets = io_xlsx::read_workbook(input)?;
    let sheet = io_xlsx::find_sheet(&sheets, &config.sheet_name, input)?;
    let header_row = HeaderMarkerLocator::default()
        .locate(&sheet.grid, 0)
        .context(LeaderboardTableNotFoundSnafu {})?;
    let leaderboard = leaderboard_view(&sheet.grid, header_row, config)?;
    let competitors = leaderboard.competitors(&sheet.grid);

    println!("Verifying order...");
    let res = verify(&competitors, &config.ranking_rules()).context(RankingSnafu {})?;

    // Row numbers as shown by spreadsheet programs.
    let sheet_row = |row_index: usize| header_row + 1 + row_index + 1;
    let mut messages: Vec<(usize, String)> = res
        .violations
        .iter()
        .map(|v| (v.row_index, violation_message(v, sheet_row(v.row_index))))
        .chain(res.ties.iter().map(|t| {
            (
                t.row_index,
                format!("TIED: {} and {} are tied.", t.previous, t.current),
            )
        }))
        .collect();
    messages.sort_by_key(|(idx, _)| *idx);
    for (_, m) in messages.iter() {
        println!("{}", m);
    }
    println!("Verification complete.");
    info!(
        "run_verification: {} violations, {} ties",
        res.violations.len(),
        res.ties.len()
    );
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::grid::Cell;
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn write_cell(ws: &mut rust_xlsxwriter::Worksheet, row: u32, col: u16, s: &str) {
        if s.is_empty() {
            return;
        }
        match s.parse::<f64>() {
            Ok(x) => ws.write_number(row, col, x).unwrap(),
            Err(_) => ws.write_string(row, col, s).unwrap(),
        };
    }

    const LEADERBOARD: &[&[&str]] = &[
        &["Season 2024"],
        &[],
        &["Pos", "Player", "R01", "R02", "R03", "Points", "Spent ($m)", "$m/Pt"],
        &["1", "Zed", "10", "20", "10", "40", "8", "0.2"],
        &["2", "Carl", "5", "-", "30", "35", "4", "0.11"],
        &["3", "Alice", "20", "10", "10", "40", "8", "0.2"],
        &["4", "Bea", "25", "15", "D$Q", "40", "8", "0.2"],
        &["", "Points Totals", "60", "45", "50", "155", "28", ""],
        &[],
        &["Pos", "Player", "R01", "R02", "R03", "Spent ($m)"],
        &["1", "Carl", "1", "1", "2", "4"],
        &["2", "Alice", "3", "3", "2", "8"],
        &["3", "Bea", "4", "2", "2", "8"],
        &["4", "Zed", "2", "2", "4", "8"],
        &["", "Spending Totals", "10", "8", "10", "28"],
    ];

    fn write_fixture(path: &str, rows: &[&[&str]], sheet_name: &str) {
        let mut workbook = Workbook::new();
        {
            let info = workbook.add_worksheet();
            info.set_name("About").unwrap();
            info.write_string(0, 0, "Fantasy league").unwrap();
        }
        let ws = workbook.add_worksheet();
        ws.set_name(sheet_name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, s) in row.iter().enumerate() {
                write_cell(ws, r as u32, c as u16, s);
            }
        }
        workbook.save(path).unwrap();
    }

    fn test_config() -> BoardConfig {
        BoardConfig {
            round_count: 3,
            ..BoardConfig::default()
        }
    }

    fn column(grid: &grid::Grid, rows: std::ops::Range<usize>, col: usize) -> Vec<String> {
        rows.map(|r| grid.get(r, col).render()).collect()
    }

    #[test]
    fn rank_and_verify_workbook() {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("leaderboard.xlsx");
        let input = input.to_str().unwrap();
        let output = dir.path().join("leaderboard_sorted.xlsx");
        let output = output.to_str().unwrap();
        write_fixture(input, LEADERBOARD, "Leaderboard");

        let config = test_config();
        let ranking = run_ranking(input, output, &config, None, None).unwrap();
        assert_eq!(ranking.names(), vec!["Bea", "Alice", "Zed", "Carl"]);
        assert_eq!(
            ranking.highlighted.iter().collect::<Vec<&String>>(),
            vec!["Alice", "Zed"]
        );

        let sheets = io_xlsx::read_workbook(output).unwrap();
        let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["About", "Leaderboard"]);
        let grid = &io_xlsx::find_sheet(&sheets, "Leaderboard", output).unwrap().grid;

        assert_eq!(grid.get(0, 0), &Cell::Text("Season 2024".to_string()));
        assert_eq!(
            column(grid, 3..8, 1),
            vec!["Bea", "Alice", "Zed", "Carl", "Points Totals"]
        );
        assert_eq!(column(grid, 3..7, 0), vec!["1", "2", "3", "4"]);
        // The rows move as a whole.
        assert_eq!(grid.get(3, 4), &Cell::Text("D$Q".to_string()));
        assert_eq!(grid.get(6, 3), &Cell::Text("-".to_string()));
        assert_eq!(grid.get(7, 5), &Cell::Number(155.0));

        assert_eq!(
            column(grid, 10..15, 1),
            vec!["Bea", "Alice", "Zed", "Carl", "Spending Totals"]
        );
        assert_eq!(column(grid, 10..14, 0), vec!["1", "2", "3", "4"]);
        assert_eq!(column(grid, 10..14, 2), vec!["4", "3", "2", "1"]);

        let res = run_verification(output, &config).unwrap();
        assert!(res.is_ordered());
        assert_eq!(res.ties.len(), 1);
        assert_eq!(res.ties[0].previous, "Alice");
        assert_eq!(res.ties[0].current, "Zed");

        // Ranking the ranked sheet changes nothing.
        let again = dir.path().join("again.xlsx");
        let again = again.to_str().unwrap();
        let ranking2 = run_ranking(output, again, &config, None, None).unwrap();
        assert_eq!(ranking2.names(), ranking.names());
        let sources: Vec<usize> = ranking2.ranked.iter().map(|rc| rc.source_index).collect();
        assert_eq!(sources, vec![0, 1, 2, 3]);
    }

    fn package_part(path: &str, name: &str) -> String {
        use std::io::Read;
        let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        let mut part = archive.by_name(name).unwrap();
        let mut text = String::new();
        part.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn formatting_outside_the_moved_cells_is_kept() {
        use calamine::{open_workbook, DataType, Reader, Xlsx};
        use rust_xlsxwriter::{Format, Formula};

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("leaderboard.xlsx");
        let input = input.to_str().unwrap();
        let output = dir.path().join("leaderboard_sorted.xlsx");
        let output = output.to_str().unwrap();

        let mut workbook = Workbook::new();
        {
            let info = workbook.add_worksheet();
            info.set_name("About").unwrap();
            info.write_string(0, 0, "Fantasy league").unwrap();
        }
        let ws = workbook.add_worksheet();
        ws.set_name("Leaderboard").unwrap();
        for (r, row) in LEADERBOARD.iter().enumerate() {
            for (c, s) in row.iter().enumerate() {
                write_cell(ws, r as u32, c as u16, s);
            }
        }
        let date = Format::new().set_num_format("yyyy-mm-dd");
        ws.write_number_with_format(0, 9, 45000.0, &date).unwrap();
        ws.write_formula(7, 5, Formula::new("=SUM(F4:F7)").set_result("155"))
            .unwrap();
        workbook.save(input).unwrap();

        run_ranking(input, output, &test_config(), None, None).unwrap();

        let mut wb: Xlsx<_> = open_workbook(output).unwrap();
        let range = wb.worksheet_range("Leaderboard").unwrap().unwrap();
        assert_eq!(range.get_value((0, 9)), Some(&DataType::DateTime(45000.0)));

        let sheet = package_part(output, "xl/worksheets/sheet2.xml");
        assert!(sheet.contains("SUM(F4:F7)"));
        // Alice and Zed are tied, Bea is not.
        assert!(sheet.contains(r#"<c r="B5" s=""#));
        assert!(sheet.contains(r#"<c r="B6" s=""#));
        assert!(!sheet.contains(r#"<c r="B4" s=""#));
        assert!(package_part(output, "xl/styles.xml").contains(r#"rgb="FFFF0000""#));
        assert_eq!(
            package_part(output, "xl/worksheets/sheet1.xml"),
            package_part(input, "xl/worksheets/sheet1.xml")
        );
    }

    #[test]
    fn unsorted_input_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("leaderboard.xlsx");
        let input = input.to_str().unwrap();
        write_fixture(input, LEADERBOARD, "Leaderboard");
        let res = run_verification(input, &test_config()).unwrap();
        assert!(!res.is_ordered());
        assert_eq!(res.violations[0].level, TieBreakLevel::Points);
        assert_eq!(res.violations[0].row_index, 2);
        assert_eq!(
            violation_message(&res.violations[0], 6),
            "FAIL: Points not descending at row 6 (Carl before Alice). Prev: 35, Curr: 40"
        );
        // Bea has the better countback but sits below Alice.
        assert_eq!(res.violations[1].level, TieBreakLevel::Countback);
        assert_eq!(res.violations[1].previous_name, "Alice");
        assert_eq!(res.violations[1].current_name, "Bea");
        assert_eq!(res.violations.len(), 2);
    }

    #[test]
    fn missing_spending_table_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("leaderboard.xlsx");
        let input = input.to_str().unwrap();
        let output = dir.path().join("out.xlsx");
        write_fixture(input, &LEADERBOARD[..8], "Leaderboard");
        let res = run_ranking(input, output.to_str().unwrap(), &test_config(), None, None);
        assert!(matches!(res, Err(BoardError::SpendingTableNotFound {})));
        assert!(!output.exists());
    }

    #[test]
    fn unknown_spending_player_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("leaderboard.xlsx");
        let input = input.to_str().unwrap();
        let output = dir.path().join("out.xlsx");
        let mut rows: Vec<&[&str]> = LEADERBOARD.to_vec();
        rows[13] = &["4", "Ghost", "2", "2", "4", "8"];
        write_fixture(input, &rows, "Leaderboard");
        let res = run_ranking(input, output.to_str().unwrap(), &test_config(), None, None);
        assert!(matches!(
            res,
            Err(BoardError::Ranking {
                source: RankingError::UnknownName { .. }
            })
        ));
        assert!(!output.exists());
    }

    #[test]
    fn invalid_score_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("leaderboard.xlsx");
        let input = input.to_str().unwrap();
        let output = dir.path().join("out.xlsx");
        let mut rows: Vec<&[&str]> = LEADERBOARD.to_vec();
        rows[4] = &["2", "Carl", "5", "DNS", "30", "35", "4", "0.11"];
        write_fixture(input, &rows, "Leaderboard");
        let res = run_ranking(input, output.to_str().unwrap(), &test_config(), None, None);
        assert!(matches!(
            res,
            Err(BoardError::Ranking {
                source: RankingError::InvalidValue { .. }
            })
        ));
        assert!(!output.exists());
    }

    #[test]
    fn missing_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("leaderboard.xlsx");
        let input = input.to_str().unwrap();
        write_fixture(input, LEADERBOARD, "Season");
        let res = run_verification(input, &test_config());
        assert!(matches!(res, Err(BoardError::MissingSheet { .. })));
    }
}
