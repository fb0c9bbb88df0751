use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("Expected {expected} cells for a {side}x{side} matrix, got {actual}")]
    ShapeMismatch {
        side: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),
    #[error("Matrix is not symmetric at ({row}, {col}): {upper} != {lower}")]
    Asymmetric {
        row: String,
        col: String,
        upper: u64,
        lower: u64,
    },
}

/// Read access shared by the sanitized matrix and raw persisted tables.
pub trait LabeledMatrix {
    fn row_labels(&self) -> &[String];
    fn col_labels(&self) -> &[String];
    fn cell(&self, row: &str, col: &str) -> Option<u64>;
}

/// Square, symmetric, non-negative count matrix over unique labels.
///
/// The same label sequence indexes rows and columns, so the invariants of a
/// co-occurrence matrix hold for every instance that exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MatrixParts", into = "MatrixParts")]
pub struct CooccurrenceMatrix {
    labels: Vec<String>,
    values: Vec<u64>,
    index: HashMap<String, usize>,
}

// Serialized form; deserialization re-runs every invariant check.
#[derive(Serialize, Deserialize)]
struct MatrixParts {
    labels: Vec<String>,
    values: Vec<u64>,
}

impl TryFrom<MatrixParts> for CooccurrenceMatrix {
    type Error = MatrixError;

    fn try_from(parts: MatrixParts) -> Result<Self, Self::Error> {
        Self::new(parts.labels, parts.values)
    }
}

impl From<CooccurrenceMatrix> for MatrixParts {
    fn from(matrix: CooccurrenceMatrix) -> Self {
        Self {
            labels: matrix.labels,
            values: matrix.values,
        }
    }
}

impl CooccurrenceMatrix {
    /// Build a matrix from a label sequence and row-major values.
    pub fn new(labels: Vec<String>, values: Vec<u64>) -> Result<Self, MatrixError> {
        let side = labels.len();
        if values.len() != side * side {
            return Err(MatrixError::ShapeMismatch {
                side,
                expected: side * side,
                actual: values.len(),
            });
        }

        let mut index = HashMap::with_capacity(side);
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(MatrixError::DuplicateLabel(label.clone()));
            }
        }

        for i in 0..side {
            for j in (i + 1)..side {
                let upper = values[i * side + j];
                let lower = values[j * side + i];
                if upper != lower {
                    return Err(MatrixError::Asymmetric {
                        row: labels[i].clone(),
                        col: labels[j].clone(),
                        upper,
                        lower,
                    });
                }
            }
        }

        Ok(Self {
            labels,
            values,
            index,
        })
    }

    /// Construction for callers that produce unique labels and symmetric
    /// values by design.
    pub(crate) fn from_trusted(labels: Vec<String>, values: Vec<u64>) -> Self {
        debug_assert_eq!(values.len(), labels.len() * labels.len());
        let index = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i))
            .collect::<HashMap<_, _>>();
        debug_assert_eq!(index.len(), labels.len(), "duplicate labels");
        let matrix = Self {
            labels,
            values,
            index,
        };
        debug_assert!(matrix.is_symmetric());
        matrix
    }

    pub fn empty() -> Self {
        Self {
            labels: Vec::new(),
            values: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Value at (i, j). Panics when out of bounds, like slice indexing.
    pub fn at(&self, i: usize, j: usize) -> u64 {
        self.values[i * self.labels.len() + j]
    }

    pub fn get(&self, a: &str, b: &str) -> Option<u64> {
        let i = self.position(a)?;
        let j = self.position(b)?;
        Some(self.at(i, j))
    }

    pub fn row(&self, i: usize) -> &[u64] {
        let n = self.labels.len();
        &self.values[i * n..(i + 1) * n]
    }

    pub fn diagonal(&self) -> Vec<u64> {
        (0..self.len()).map(|i| self.at(i, i)).collect()
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Rows as `f64` feature vectors for numerical consumers.
    pub fn feature_rows(&self) -> Vec<Vec<f64>> {
        (0..self.len())
            .map(|i| self.row(i).iter().map(|&v| v as f64).collect())
            .collect()
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.len();
        (0..n).all(|i| ((i + 1)..n).all(|j| self.at(i, j) == self.at(j, i)))
    }

    /// Restrict to `labels` in the given order. Unknown labels are skipped.
    pub fn restrict(&self, labels: &[String]) -> Self {
        let kept: Vec<(String, usize)> = labels
            .iter()
            .filter_map(|l| self.position(l).map(|i| (l.clone(), i)))
            .collect();
        let mut values = Vec::with_capacity(kept.len() * kept.len());
        for (_, i) in &kept {
            for (_, j) in &kept {
                values.push(self.at(*i, *j));
            }
        }
        let index = kept
            .iter()
            .enumerate()
            .map(|(pos, (l, _))| (l.clone(), pos))
            .collect();
        Self {
            labels: kept.into_iter().map(|(l, _)| l).collect(),
            values,
            index,
        }
    }
}

impl LabeledMatrix for CooccurrenceMatrix {
    fn row_labels(&self) -> &[String] {
        &self.labels
    }

    fn col_labels(&self) -> &[String] {
        &self.labels
    }

    fn cell(&self, row: &str, col: &str) -> Option<u64> {
        self.get(row, col)
    }
}

/// A persisted matrix exactly as read, before any repair.
///
/// Row and column labels are independent and may disagree in content,
/// order or multiplicity. `rows[i]` has one cell per column label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledTable {
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    pub rows: Vec<Vec<u64>>,
}

impl LabeledTable {
    pub fn n_rows(&self) -> usize {
        self.row_labels.len()
    }

    pub fn n_cols(&self) -> usize {
        self.col_labels.len()
    }

    pub fn has_duplicate_labels(&self) -> bool {
        has_duplicates(&self.row_labels) || has_duplicates(&self.col_labels)
    }
}

impl LabeledMatrix for LabeledTable {
    fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    fn col_labels(&self) -> &[String] {
        &self.col_labels
    }

    // First occurrence wins when a label is duplicated on an axis.
    fn cell(&self, row: &str, col: &str) -> Option<u64> {
        let i = self.row_labels.iter().position(|l| l == row)?;
        let j = self.col_labels.iter().position(|l| l == col)?;
        self.rows.get(i).and_then(|r| r.get(j)).copied()
    }
}

pub(crate) fn has_duplicates(labels: &[String]) -> bool {
    let mut seen = HashSet::with_capacity(labels.len());
    !labels.iter().all(|l| seen.insert(l.as_str()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub ingredient: String,
    pub frequency: u64,
}

/// Ingredient occurrence counts, in persisted row order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyTable {
    entries: Vec<FrequencyEntry>,
}

impl FrequencyTable {
    pub fn new(entries: Vec<FrequencyEntry>) -> Self {
        Self { entries }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(ingredient, frequency)| FrequencyEntry {
                    ingredient: ingredient.into(),
                    frequency,
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[FrequencyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.ingredient.as_str())
    }

    pub fn frequency_of(&self, ingredient: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.ingredient == ingredient)
            .map(|e| e.frequency)
    }
}
