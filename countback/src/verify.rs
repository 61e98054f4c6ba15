//! Checks that a table is already in ranked order.

use log::debug;
use std::cmp::Ordering;

use crate::{sort_key, CompetitorRow, RankingError, RankingRules, SortKey, TieBreakLevel};

/// Two adjacent rows that are not in ranked order.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Violation {
    /// Index of the second row of the pair.
    pub row_index: usize,
    /// The first level at which the two rows differ.
    pub level: TieBreakLevel,
    /// The value of the earlier row at that level.
    pub previous: String,
    /// The value of the later row at that level.
    pub current: String,
    pub previous_name: String,
    pub current_name: String,
}

/// Two adjacent rows that are equal on points, spend and countback.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TiedPair {
    pub row_index: usize,
    pub previous: String,
    pub current: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Verification {
    pub violations: Vec<Violation>,
    pub ties: Vec<TiedPair>,
}

impl Verification {
    pub fn is_ordered(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Walks the adjacent pairs of rows and reports the pairs that break the ranking order.
///
/// The rows are read with the same rules as `rank`. Nothing is reordered.
pub fn verify(rows: &[CompetitorRow], rules: &RankingRules) -> Result<Verification, RankingError> {
    let keys: Vec<SortKey> = rows
        .iter()
        .map(|row| sort_key(row, rules))
        .collect::<Result<Vec<SortKey>, RankingError>>()?;

    let mut res = Verification::default();
    for (idx, pair) in keys.windows(2).enumerate() {
        let (prev, curr) = (&pair[0], &pair[1]);
        let row_index = idx + 1;
        match prev.compare(curr) {
            (Ordering::Greater, Some(level)) => {
                debug!("verify: row {}: out of order at level {}", row_index, level);
                res.violations.push(Violation {
                    row_index,
                    level,
                    previous: prev.describe(level),
                    current: curr.describe(level),
                    previous_name: prev.name.clone(),
                    current_name: curr.name.clone(),
                });
            }
            // Equal up to the name, and the names are in order.
            (_, None) | (_, Some(TieBreakLevel::Name)) => {
                res.ties.push(TiedPair {
                    row_index,
                    previous: prev.name.clone(),
                    current: curr.name.clone(),
                });
            }
            _ => {}
        }
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{init_logs, row};
    use crate::{rank, CellValue};

    #[test]
    fn ranked_output_verifies() {
        init_logs();
        let rows = vec![
            row("C", 48.0, 5.0, &[48.0, 0.0]),
            row("Zed", 50.0, 10.0, &[25.0, 25.0]),
            row("A", 50.0, 10.0, &[20.0, 30.0]),
            row("Alice", 50.0, 10.0, &[25.0, 25.0]),
        ];
        let rules = RankingRules::default();
        let ranked: Vec<CompetitorRow> = rank(&rows, &rules)
            .unwrap()
            .ranked
            .into_iter()
            .map(|rc| rc.row)
            .collect();
        let res = verify(&ranked, &rules).unwrap();
        assert!(res.is_ordered());
        assert_eq!(
            res.ties,
            vec![TiedPair {
                row_index: 2,
                previous: "Alice".to_string(),
                current: "Zed".to_string(),
            }]
        );
    }

    #[test]
    fn points_out_of_order() {
        let rows = vec![row("A", 10.0, 1.0, &[10.0]), row("B", 12.0, 1.0, &[12.0])];
        let res = verify(&rows, &RankingRules::default()).unwrap();
        assert_eq!(
            res.violations,
            vec![Violation {
                row_index: 1,
                level: TieBreakLevel::Points,
                previous: "10".to_string(),
                current: "12".to_string(),
                previous_name: "A".to_string(),
                current_name: "B".to_string(),
            }]
        );
        assert!(res.ties.is_empty());
    }

    #[test]
    fn spend_out_of_order() {
        let rows = vec![row("A", 10.0, 5.5, &[10.0]), row("B", 10.0, 2.0, &[10.0])];
        let res = verify(&rows, &RankingRules::default()).unwrap();
        assert_eq!(res.violations.len(), 1);
        assert_eq!(res.violations[0].level, TieBreakLevel::Spend);
    }

    #[test]
    fn countback_out_of_order() {
        let rows = vec![
            row("A", 10.0, 1.0, &[5.0, 5.0]),
            row("B", 10.0, 1.0, &[0.0, 10.0]),
        ];
        let res = verify(&rows, &RankingRules::default()).unwrap();
        assert_eq!(
            res.violations,
            vec![Violation {
                row_index: 1,
                level: TieBreakLevel::Countback,
                previous: "[5.0, 5.0]".to_string(),
                current: "[10.0, 0.0]".to_string(),
                previous_name: "A".to_string(),
                current_name: "B".to_string(),
            }]
        );
    }

    #[test]
    fn names_out_of_order_on_full_tie() {
        let rows = vec![row("Zed", 10.0, 1.0, &[10.0]), row("Alice", 10.0, 1.0, &[10.0])];
        let res = verify(&rows, &RankingRules::default()).unwrap();
        assert_eq!(res.violations.len(), 1);
        assert_eq!(res.violations[0].level, TieBreakLevel::Name);
        assert!(res.ties.is_empty());
    }

    #[test]
    fn invalid_value_is_an_error() {
        let mut r = row("A", 10.0, 1.0, &[10.0]);
        r.total_spend = CellValue::Text("lots".to_string());
        assert!(verify(&[r], &RankingRules::default()).is_err());
    }
}
