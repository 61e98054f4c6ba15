use clap::Parser;

/// This program re-ranks a fantasy league leaderboard spreadsheet.
///
/// Competitors are ordered by points, then spend, then countback, then name. Ties
/// are highlighted and the spending table is reordered to follow the leaderboard.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct RankArgs {
    /// (file path) The spreadsheet containing the leaderboard and spending tables.
    #[clap(short, long, value_parser, default_value = "leaderboard.xlsx")]
    pub input: String,

    /// (file path) Where the ranked spreadsheet is written.
    #[clap(short, long, value_parser, default_value = "leaderboard_sorted.xlsx")]
    pub out: String,

    /// (file path, optional) A JSON file with the layout of the leaderboard (worksheet name,
    /// number of rounds, totals labels, placeholder tokens, highlight colour).
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, 'stdout' or empty) If specified, a summary of the ranking will be written in
    /// JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub summary: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, the program will check that
    /// the computed ranking matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}

/// This program checks that a leaderboard spreadsheet is in ranked order.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct VerifyArgs {
    /// (file path) The ranked spreadsheet to check.
    #[clap(short, long, value_parser, default_value = "leaderboard_sorted.xlsx")]
    pub input: String,

    /// (file path, optional) A JSON file with the layout of the leaderboard.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// If passed, the program exits with status 2 when the order is not valid.
    #[clap(long, takes_value = false)]
    pub strict: bool,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
