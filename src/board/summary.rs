// JSON summary of a ranking, and comparison against a reference summary.

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::board::config_reader::BoardConfig;
use crate::board::*;

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorSummary {
    pub position: u32,
    pub player: String,
    pub points: f64,
    pub spend: f64,
    pub tied: bool,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RankingSummary {
    pub sheet: String,
    #[serde(rename = "roundCount")]
    pub round_count: usize,
    pub results: Vec<CompetitorSummary>,
    #[serde(rename = "tieGroups")]
    pub tie_groups: Vec<Vec<String>>,
}

pub fn build_summary(config: &BoardConfig, ranking: &Ranking) -> RankingSummary {
    RankingSummary {
        sheet: config.sheet_name.clone(),
        round_count: config.round_count,
        results: ranking
            .ranked
            .iter()
            .map(|rc| CompetitorSummary {
                position: rc.position,
                player: rc.row.name.clone(),
                points: rc.key.points,
                spend: rc.key.spend,
                tied: ranking.is_highlighted(&rc.row.name),
            })
            .collect(),
        tie_groups: ranking.tie_groups.clone(),
    }
}

/// Writes the summary to a file, or to the standard output when the path is `stdout`.
pub fn write_summary(summary: &RankingSummary, path: &str) -> BoardResult<()> {
    let pretty = serde_json::to_string_pretty(summary).context(ParsingJsonSnafu {})?;
    if path == "stdout" {
        println!("{}", pretty);
    } else {
        info!("write_summary: writing summary to {:?}", path);
        fs::write(path, pretty).context(WritingSummarySnafu { path })?;
    }
    Ok(())
}

/// Compares the summary against a reference summary file and prints the differences.
pub fn check_reference(summary: &RankingSummary, reference_path: &str) -> BoardResult<()> {
    let contents =
        fs::read_to_string(reference_path).context(OpeningJsonSnafu { path: reference_path })?;
    let reference: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    // Both sides go through serde_json::Value so that key order and number
    // formatting do not matter.
    let computed: JSValue = serde_json::to_value(summary).context(ParsingJsonSnafu {})?;
    let pretty_reference = serde_json::to_string_pretty(&reference).context(ParsingJsonSnafu {})?;
    let pretty_computed = serde_json::to_string_pretty(&computed).context(ParsingJsonSnafu {})?;
    if pretty_reference != pretty_computed {
        warn!("Found differences with the reference summary {:?}", reference_path);
        print_diff(pretty_reference.as_str(), pretty_computed.as_str(), "\n");
        return SummaryMismatchSnafu {
            path: reference_path,
        }
        .fail();
    }
    info!("check_reference: summary matches {:?}", reference_path);
    Ok(())
}
