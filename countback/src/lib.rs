mod config;
pub mod verify;

use log::{debug, info};

use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashMap},
};

pub use crate::config::*;
pub use crate::verify::{verify, TiedPair, Verification, Violation};

/// The levels of the tie-break policy, in priority order.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum TieBreakLevel {
    /// More points ranks first.
    Points,
    /// Less spend ranks first.
    Spend,
    /// The better sequence of round scores (best round first) ranks first.
    Countback,
    /// Alphabetical order.
    Name,
}

impl std::fmt::Display for TieBreakLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TieBreakLevel::Points => "points",
            TieBreakLevel::Spend => "spend",
            TieBreakLevel::Countback => "countback",
            TieBreakLevel::Name => "name",
        };
        write!(f, "{}", s)
    }
}

/// The composite key that fully determines the rank of a competitor.
///
/// A smaller key ranks first. The key is a total order: floating point values
/// are compared with `f64::total_cmp`, and NaN never makes it through
/// normalization.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub points: f64,
    pub spend: f64,
    /// The round scores, sorted from best to worst.
    pub countback: Vec<f64>,
    pub name: String,
}

impl SortKey {
    /// Compares two keys level by level.
    ///
    /// Returns the ordering together with the first level at which the keys differ,
    /// or `None` if they are identical on every level.
    pub fn compare(&self, other: &SortKey) -> (Ordering, Option<TieBreakLevel>) {
        let levels = [
            (TieBreakLevel::Points, other.points.total_cmp(&self.points)),
            (TieBreakLevel::Spend, self.spend.total_cmp(&other.spend)),
            (
                TieBreakLevel::Countback,
                compare_countback(&self.countback, &other.countback),
            ),
            (TieBreakLevel::Name, self.name.cmp(&other.name)),
        ];
        levels
            .iter()
            .find(|(_, o)| *o != Ordering::Equal)
            .map(|(level, o)| (*o, Some(*level)))
            .unwrap_or((Ordering::Equal, None))
    }

    /// True if both keys are equal on points, spend and countback.
    pub fn ties_with(&self, other: &SortKey) -> bool {
        matches!(self.compare(other).1, None | Some(TieBreakLevel::Name))
    }

    /// The value of the key at the given level, for diagnostics.
    pub fn describe(&self, level: TieBreakLevel) -> String {
        match level {
            TieBreakLevel::Points => format!("{}", self.points),
            TieBreakLevel::Spend => format!("{}", self.spend),
            TieBreakLevel::Countback => format!("{:?}", self.countback),
            TieBreakLevel::Name => self.name.clone(),
        }
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other).0
    }
}

// Higher scores first. A missing round counts as zero, so sequences of
// different lengths are padded before being compared.
fn compare_countback(a: &[f64], b: &[f64]) -> Ordering {
    if a.len() != b.len() {
        let n = a.len().max(b.len());
        return compare_countback(&padded_countback(a, n), &padded_countback(b, n));
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| y.total_cmp(x))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn padded_countback(scores: &[f64], len: usize) -> Vec<f64> {
    let mut res = scores.to_vec();
    res.resize(len, 0.0);
    sort_descending(&mut res);
    res
}

fn sort_descending(scores: &mut [f64]) {
    scores.sort_by(|x, y| y.total_cmp(x));
}

/// Reads a score as a number.
///
/// Empty cells and the placeholder tokens of the rules count as zero. Text that
/// holds a number is accepted. Everything else is an error: a silent zero would
/// change the ranking.
pub fn normalize(
    value: &CellValue,
    rules: &RankingRules,
    player: &str,
    field: ScoreField,
) -> Result<f64, RankingError> {
    let invalid = || RankingError::InvalidValue {
        player: player.to_string(),
        field,
        content: value.to_string(),
    };
    let x = match value {
        CellValue::Empty => 0.0,
        CellValue::Number(x) => *x,
        CellValue::Text(s) if s.is_empty() || rules.is_placeholder(s) => 0.0,
        CellValue::Text(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
    };
    if x.is_nan() {
        return Err(invalid());
    }
    // Adding zero turns -0.0 into 0.0, which total_cmp would otherwise order apart.
    Ok(x + 0.0)
}

/// Builds the sort key of a competitor.
///
/// The ranker and the verifier both go through this function.
pub fn sort_key(row: &CompetitorRow, rules: &RankingRules) -> Result<SortKey, RankingError> {
    let name = row.name.as_str();
    let points = normalize(&row.total_points, rules, name, ScoreField::Points)?;
    let spend = normalize(&row.total_spend, rules, name, ScoreField::Spend)?;
    let mut countback: Vec<f64> = Vec::with_capacity(row.round_scores.len());
    for (idx, score) in row.round_scores.iter().enumerate() {
        countback.push(normalize(score, rules, name, ScoreField::Round(idx + 1))?);
    }
    sort_descending(&mut countback);
    Ok(SortKey {
        points,
        spend,
        countback,
        name: row.name.clone(),
    })
}

/// Ranks the competitors.
///
/// The rows are sorted by their sort key, the positions are reassigned from 1, and
/// the competitors that share points, spend and countback are collected into tie
/// groups. The input order is only used to break ties between identical keys.
pub fn rank(rows: &[CompetitorRow], rules: &RankingRules) -> Result<Ranking, RankingError> {
    info!(
        "Ranking {:?} competitors, rules: {:?}",
        rows.len(),
        rules
    );
    let mut keyed: Vec<(usize, SortKey)> = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        keyed.push((idx, sort_key(row, rules)?));
    }
    // sort_by is stable.
    keyed.sort_by(|(_, k1), (_, k2)| k1.cmp(k2));

    let ranked: Vec<RankedCompetitor> = keyed
        .into_iter()
        .enumerate()
        .map(|(pos, (source_index, key))| {
            let mut row = rows[source_index].clone();
            row.position = (pos + 1) as u32;
            debug!("rank: {}: {:?} (from row {})", row.position, key, source_index);
            RankedCompetitor {
                source_index,
                position: row.position,
                row,
                key,
            }
        })
        .collect();

    let tie_groups = find_tie_groups(&ranked);
    let highlighted: BTreeSet<String> = tie_groups.iter().flatten().cloned().collect();
    info!(
        "Found {:?} tie groups, {:?} competitors to highlight",
        tie_groups.len(),
        highlighted.len()
    );
    Ok(Ranking {
        ranked,
        highlighted,
        tie_groups,
    })
}

// The name is the last level of the key, so the members of a tie group are
// adjacent once sorted.
fn find_tie_groups(ranked: &[RankedCompetitor]) -> Vec<Vec<String>> {
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<&RankedCompetitor> = Vec::new();
    for rc in ranked.iter() {
        if let Some(last) = current.last() {
            if !last.key.ties_with(&rc.key) {
                if current.len() > 1 {
                    groups.push(current.iter().map(|c| c.row.name.clone()).collect());
                }
                current.clear();
            }
        }
        current.push(rc);
    }
    if current.len() > 1 {
        groups.push(current.iter().map(|c| c.row.name.clone()).collect());
    }
    groups
}

/// Orders the rows of a secondary table after a reference order of names.
///
/// Arguments:
/// * `names` the name of each row of the secondary table, in table order
/// * `reference_order` the names in their final order
///
/// Returns the indexes of the secondary rows in their new order. A name without a
/// match in the reference order is an error, so is a name repeated in the
/// reference order. Names of the reference order without a secondary row are
/// skipped.
pub fn reorder_by_reference(
    names: &[String],
    reference_order: &[String],
) -> Result<Vec<usize>, RankingError> {
    let mut reference_positions: HashMap<&str, usize> = HashMap::new();
    for (idx, name) in reference_order.iter().enumerate() {
        if reference_positions.insert(name.as_str(), idx).is_some() {
            return Err(RankingError::DuplicateName { name: name.clone() });
        }
    }

    let mut order: Vec<(usize, usize)> = Vec::with_capacity(names.len());
    for (idx, name) in names.iter().enumerate() {
        let reference_idx = reference_positions
            .get(name.as_str())
            .ok_or_else(|| RankingError::UnknownName { name: name.clone() })?;
        order.push((*reference_idx, idx));
    }
    order.sort();
    debug!("reorder_by_reference: order: {:?}", order);
    Ok(order.into_iter().map(|(_, idx)| idx).collect())
}
