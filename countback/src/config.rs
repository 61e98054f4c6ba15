// ********* Input data structures ***********

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::Display;

/// The raw content of a scored cell, before normalization.
///
/// The readers are expected to map their own cell types onto this.
#[derive(PartialEq, Debug, Clone)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => write!(f, ""),
            CellValue::Number(x) => write!(f, "{}", x),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One competitor of the leaderboard, as read from the sheet.
#[derive(PartialEq, Debug, Clone)]
pub struct CompetitorRow {
    pub position: u32,
    pub name: String,
    /// One entry per scoring round, in round order.
    pub round_scores: Vec<CellValue>,
    pub total_points: CellValue,
    pub total_spend: CellValue,
}

// ******** Output data structures *********

/// A competitor after ranking.
#[derive(PartialEq, Debug, Clone)]
pub struct RankedCompetitor {
    /// Index of the row in the input of `rank`.
    pub source_index: usize,
    pub position: u32,
    pub row: CompetitorRow,
    pub key: crate::SortKey,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Ranking {
    pub ranked: Vec<RankedCompetitor>,
    /// All the names that share points, spend and countback with someone else.
    pub highlighted: BTreeSet<String>,
    /// The tie groups, in ranked order. Every group has at least two names.
    pub tie_groups: Vec<Vec<String>>,
}

impl Ranking {
    /// The names in final ranked order.
    pub fn names(&self) -> Vec<String> {
        self.ranked.iter().map(|rc| rc.row.name.clone()).collect()
    }

    pub fn is_highlighted(&self, name: &str) -> bool {
        self.highlighted.contains(name)
    }
}

/// The field of a competitor row that holds a score.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ScoreField {
    /// 1-based round number.
    Round(usize),
    Points,
    Spend,
}

impl Display for ScoreField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreField::Round(r) => write!(f, "round {}", r),
            ScoreField::Points => write!(f, "points"),
            ScoreField::Spend => write!(f, "spend"),
        }
    }
}

/// Errors that prevent the ranking from completing.
#[derive(PartialEq, Debug, Clone)]
pub enum RankingError {
    /// A score that is neither a number nor one of the placeholder tokens.
    InvalidValue {
        player: String,
        field: ScoreField,
        content: String,
    },
    /// A name of the secondary table that does not appear in the reference order.
    UnknownName { name: String },
    /// A name that appears more than once in the reference order.
    DuplicateName { name: String },
}

impl Error for RankingError {}

impl Display for RankingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankingError::InvalidValue {
                player,
                field,
                content,
            } => write!(
                f,
                "player {:?}: cannot read {} value {:?} as a number",
                player, field, content
            ),
            RankingError::UnknownName { name } => {
                write!(f, "player {:?} is missing from the reference order", name)
            }
            RankingError::DuplicateName { name } => {
                write!(f, "player {:?} appears more than once in the reference order", name)
            }
        }
    }
}

// ********* Configuration **********

/// The rules used to read the scores.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RankingRules {
    /// Text values that count as a zero score. Empty cells always count as zero.
    pub placeholder_tokens: Vec<String>,
}

impl RankingRules {
    pub const DASH: &'static str = "-";
    pub const DISQUALIFIED: &'static str = "D$Q";

    pub fn new(placeholder_tokens: &[String]) -> RankingRules {
        RankingRules {
            placeholder_tokens: placeholder_tokens.to_vec(),
        }
    }

    pub fn is_placeholder(&self, s: &str) -> bool {
        self.placeholder_tokens.iter().any(|t| t == s)
    }
}

impl Default for RankingRules {
    fn default() -> Self {
        RankingRules {
            placeholder_tokens: vec![
                RankingRules::DASH.to_string(),
                RankingRules::DISQUALIFIED.to_string(),
            ],
        }
    }
}
