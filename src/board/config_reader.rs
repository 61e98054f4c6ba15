use crate::board::*;

use serde::{Deserialize, Serialize};

/// The number of scoring rounds of a season.
pub const DEFAULT_ROUND_COUNT: usize = 24;
pub const DEFAULT_SHEET_NAME: &str = "Leaderboard";
pub const DEFAULT_LEADERBOARD_TOTALS_LABEL: &str = "Points Totals";
pub const DEFAULT_SPENDING_TOTALS_LABEL: &str = "Spending Totals";
/// Solid red.
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "FF0000";

/// The layout of the leaderboard spreadsheet.
///
/// All the fields are optional in the JSON file.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    #[serde(rename = "sheetName")]
    pub sheet_name: String,
    #[serde(rename = "roundCount")]
    pub round_count: usize,
    #[serde(rename = "leaderboardTotalsLabel")]
    pub leaderboard_totals_label: String,
    #[serde(rename = "spendingTotalsLabel")]
    pub spending_totals_label: String,
    #[serde(rename = "placeholderTokens")]
    pub placeholder_tokens: Vec<String>,
    /// RGB hex value, with or without a leading alpha byte or '#'.
    #[serde(rename = "highlightColor")]
    pub highlight_color: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            round_count: DEFAULT_ROUND_COUNT,
            leaderboard_totals_label: DEFAULT_LEADERBOARD_TOTALS_LABEL.to_string(),
            spending_totals_label: DEFAULT_SPENDING_TOTALS_LABEL.to_string(),
            placeholder_tokens: RankingRules::default().placeholder_tokens,
            highlight_color: DEFAULT_HIGHLIGHT_COLOR.to_string(),
        }
    }
}

impl BoardConfig {
    pub fn ranking_rules(&self) -> RankingRules {
        RankingRules::new(&self.placeholder_tokens)
    }

    pub fn highlight_rgb(&self) -> BoardResult<u32> {
        let s = self.highlight_color.trim_start_matches('#');
        let rgb = match s.len() {
            6 => s,
            // ARGB, as written by spreadsheet programs.
            8 => s.get(2..).unwrap_or(s),
            _ => whatever!("highlightColor must be a hex colour, got {:?}", self.highlight_color),
        };
        match u32::from_str_radix(rgb, 16) {
            Ok(x) => Ok(x),
            Err(_) => whatever!("highlightColor must be a hex colour, got {:?}", self.highlight_color),
        }
    }
}

/// Reads the configuration file, or returns the default configuration.
pub fn read_config(path: Option<String>) -> BoardResult<BoardConfig> {
    let path = match path {
        Some(p) => p,
        None => return Ok(BoardConfig::default()),
    };
    let contents = fs::read_to_string(path.clone()).context(OpeningJsonSnafu { path })?;
    let config: BoardConfig = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    debug!("read_config: {:?}", config);
    if config.round_count == 0 {
        whatever!("roundCount must be at least 1");
    }
    Ok(config)
}
