use serde::{Deserialize, Serialize};

use crate::types::matrix::CooccurrenceMatrix;

/// Pair-level figures for a matrix. Pairs are unordered and distinct, so
/// only the strict upper triangle is counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSummary {
    pub dimension: usize,
    pub total_cooccurrences: u64,
    pub non_zero_pairs: usize,
    pub possible_pairs: usize,
    /// Percentage of pairs that never co-occur.
    pub sparsity_percent: f64,
    pub max_pair_value: u64,
}

impl MatrixSummary {
    pub fn of(matrix: &CooccurrenceMatrix) -> Self {
        let n = matrix.len();
        let mut total = 0;
        let mut non_zero = 0;
        let mut max = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                let v = matrix.at(i, j);
                total += v;
                max = max.max(v);
                if v > 0 {
                    non_zero += 1;
                }
            }
        }
        let possible = n * n.saturating_sub(1) / 2;
        let sparsity_percent = if possible == 0 {
            0.0
        } else {
            (1.0 - non_zero as f64 / possible as f64) * 100.0
        };
        Self {
            dimension: n,
            total_cooccurrences: total,
            non_zero_pairs: non_zero,
            possible_pairs: possible,
            sparsity_percent,
            max_pair_value: max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStrength {
    /// At least twice the mean non-zero cell.
    VeryFrequent,
    Common,
    Rare,
    Absent,
}

/// How one ingredient pair compares to the rest of the matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAnalysis {
    pub first: String,
    pub second: String,
    pub score: u64,
    pub max_value: u64,
    pub mean_non_zero: f64,
    /// `score` as a percentage of `max_value`.
    pub percent_of_max: f64,
    pub ratio_to_mean: f64,
    pub strength: PairStrength,
}

impl PairAnalysis {
    /// `None` for unknown labels or when both labels are the same.
    pub fn between(matrix: &CooccurrenceMatrix, first: &str, second: &str) -> Option<Self> {
        if first == second {
            return None;
        }
        let score = matrix.get(first, second)?;

        let values = matrix.values();
        let max_value = values.iter().copied().max().unwrap_or(0);
        let (sum, count) = values
            .iter()
            .filter(|&&v| v > 0)
            .fold((0u64, 0usize), |(s, c), &v| (s + v, c + 1));
        let mean_non_zero = if count == 0 { 0.0 } else { sum as f64 / count as f64 };

        let score_f = score as f64;
        let strength = if score == 0 {
            PairStrength::Absent
        } else if score_f >= mean_non_zero * 2.0 {
            PairStrength::VeryFrequent
        } else if score_f >= mean_non_zero {
            PairStrength::Common
        } else {
            PairStrength::Rare
        };

        Some(Self {
            first: first.to_string(),
            second: second.to_string(),
            score,
            max_value,
            mean_non_zero,
            percent_of_max: if max_value == 0 { 0.0 } else { score_f / max_value as f64 * 100.0 },
            ratio_to_mean: if mean_non_zero == 0.0 { 0.0 } else { score_f / mean_non_zero },
            strength,
        })
    }
}
