//! Load-time validation and repair of a persisted co-occurrence matrix.
//!
//! Repairs run as an ordered list of named steps. Each step takes the whole
//! table and returns a whole table (or a fatal error), and records what it
//! changed in the [`SanitizeReport`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::matrix::io::{read_frequencies, read_table, TableError};
use crate::types::matrix::{
    has_duplicates, CooccurrenceMatrix, FrequencyTable, LabeledTable, MatrixError,
};

/// Smallest table accepted as a precomputed matrix.
pub const MIN_MATRIX_SIZE: usize = 10;
/// Above this size the file is probably not the expected artifact.
pub const LARGE_MATRIX_WARNING: usize = 500;

#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("Matrix file not found: {0}")]
    MatrixUnavailable(PathBuf),
    #[error("Frequency file not found: {0}")]
    MissingFrequencyFile(PathBuf),
    #[error("Unreadable table {path}: {source}")]
    Table {
        path: PathBuf,
        #[source]
        source: TableError,
    },
    #[error("Matrix {path} rejected: {source}")]
    Rejected {
        path: PathBuf,
        #[source]
        source: Box<SanitizeError>,
    },
    #[error("Table is not square: {rows} rows x {cols} columns")]
    NotSquare { rows: usize, cols: usize },
    #[error("Table has {rows} rows, at least {min} required")]
    TooSmall { rows: usize, min: usize },
    #[error("No labels remain after repair")]
    Empty,
    #[error("Repaired matrix violates invariants: {0}")]
    Invalid(#[from] MatrixError),
    #[error("Summing duplicate cells for {row}/{col} overflows")]
    MergeOverflow { row: String, col: String },
}

/// What the repair pipeline observed and changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeReport {
    pub raw_rows: usize,
    pub raw_cols: usize,
    pub labels_stripped: usize,
    /// Distinct labels present only on the row axis, dropped.
    pub rows_only_dropped: usize,
    /// Distinct labels present only on the column axis, dropped.
    pub cols_only_dropped: usize,
    pub columns_reordered: bool,
    pub duplicate_rows_merged: usize,
    pub duplicate_cols_merged: usize,
    pub final_size: usize,
    /// Names of the steps that changed the table.
    pub repairs: Vec<String>,
}

impl SanitizeReport {
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty()
    }
}

/// A sanitized matrix and its frequency table, ready for selection.
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub matrix: CooccurrenceMatrix,
    pub frequencies: FrequencyTable,
    pub report: SanitizeReport,
}

pub type RepairStep =
    fn(&MatrixSanitizer, LabeledTable, &mut SanitizeReport) -> Result<LabeledTable, SanitizeError>;

pub struct MatrixSanitizer {
    min_size: usize,
}

impl Default for MatrixSanitizer {
    fn default() -> Self {
        Self {
            min_size: MIN_MATRIX_SIZE,
        }
    }
}

impl MatrixSanitizer {
    /// Steps in application order.
    pub const STEPS: &'static [(&'static str, RepairStep)] = &[
        ("check_shape", Self::check_shape),
        ("strip_labels", Self::strip_labels),
        ("intersect_labels", Self::intersect_labels),
        ("align_columns", Self::align_columns),
        ("merge_duplicates", Self::merge_duplicates),
    ];

    pub fn with_min_size(min_size: usize) -> Self {
        Self { min_size }
    }

    pub fn load_and_sanitize(
        &self,
        matrix_path: &Path,
        frequency_path: &Path,
    ) -> Result<LoadedArtifacts, SanitizeError> {
        if !matrix_path.is_file() {
            return Err(SanitizeError::MatrixUnavailable(matrix_path.to_path_buf()));
        }
        let table = read_table(matrix_path).map_err(|source| SanitizeError::Table {
            path: matrix_path.to_path_buf(),
            source,
        })?;
        info!(
            rows = table.n_rows(),
            cols = table.n_cols(),
            "Loaded raw matrix from {}",
            matrix_path.display()
        );

        let (matrix, report) = self.sanitize(table).map_err(|source| SanitizeError::Rejected {
            path: matrix_path.to_path_buf(),
            source: Box::new(source),
        })?;

        let frequencies = load_frequencies(frequency_path)?;

        Ok(LoadedArtifacts {
            matrix,
            frequencies,
            report,
        })
    }

    /// Run every repair step in order and produce a conforming matrix.
    pub fn sanitize(
        &self,
        table: LabeledTable,
    ) -> Result<(CooccurrenceMatrix, SanitizeReport), SanitizeError> {
        let mut report = SanitizeReport {
            raw_rows: table.n_rows(),
            raw_cols: table.n_cols(),
            ..SanitizeReport::default()
        };

        let mut table = table;
        for (name, step) in Self::STEPS {
            let before = table.clone();
            table = step(self, table, &mut report)?;
            if table != before {
                debug!(step = name, rows = table.n_rows(), "Repair step changed the matrix");
                report.repairs.push((*name).to_string());
            }
        }

        if table.n_rows() == 0 {
            return Err(SanitizeError::Empty);
        }

        let values: Vec<u64> = table.rows.into_iter().flatten().collect();
        let matrix = CooccurrenceMatrix::new(table.row_labels, values)?;
        report.final_size = matrix.len();

        info!(
            size = matrix.len(),
            repairs = report.repairs.len(),
            "Matrix sanitized"
        );
        Ok((matrix, report))
    }

    /// Reject tables that are not square or too small to be a real matrix.
    pub fn check_shape(
        &self,
        table: LabeledTable,
        _report: &mut SanitizeReport,
    ) -> Result<LabeledTable, SanitizeError> {
        let (rows, cols) = (table.n_rows(), table.n_cols());
        if rows != cols || table.rows.iter().any(|r| r.len() != cols) {
            warn!(rows, cols, "Matrix is not square");
            return Err(SanitizeError::NotSquare { rows, cols });
        }
        if rows < self.min_size {
            warn!(rows, min = self.min_size, "Matrix too small");
            return Err(SanitizeError::TooSmall {
                rows,
                min: self.min_size,
            });
        }
        if rows > LARGE_MATRIX_WARNING {
            warn!(rows, "Unusually large matrix; probably not the precomputed artifact");
        }
        Ok(table)
    }

    pub fn strip_labels(
        &self,
        mut table: LabeledTable,
        report: &mut SanitizeReport,
    ) -> Result<LabeledTable, SanitizeError> {
        for label in table.row_labels.iter_mut().chain(table.col_labels.iter_mut()) {
            let trimmed = label.trim();
            if trimmed.len() != label.len() {
                *label = trimmed.to_string();
                report.labels_stripped += 1;
            }
        }
        Ok(table)
    }

    /// Restrict both axes to the labels they share, in lexical order.
    pub fn intersect_labels(
        &self,
        table: LabeledTable,
        report: &mut SanitizeReport,
    ) -> Result<LabeledTable, SanitizeError> {
        let row_set: BTreeSet<&str> = table.row_labels.iter().map(String::as_str).collect();
        let col_set: BTreeSet<&str> = table.col_labels.iter().map(String::as_str).collect();
        if row_set == col_set {
            return Ok(table);
        }

        report.rows_only_dropped = row_set.difference(&col_set).count();
        report.cols_only_dropped = col_set.difference(&row_set).count();
        warn!(
            rows_only = report.rows_only_dropped,
            cols_only = report.cols_only_dropped,
            "Row and column labels differ; keeping the intersection"
        );

        let common: Vec<String> = row_set
            .intersection(&col_set)
            .map(|s| s.to_string())
            .collect();
        let row_idx = positions_in_order(&table.row_labels, &common);
        let col_idx = positions_in_order(&table.col_labels, &common);
        Ok(take(&table, &row_idx, &col_idx))
    }

    /// Reorder columns to follow row order. Tables with duplicate labels are
    /// left for `merge_duplicates`, which realigns after aggregating.
    pub fn align_columns(
        &self,
        table: LabeledTable,
        report: &mut SanitizeReport,
    ) -> Result<LabeledTable, SanitizeError> {
        if table.row_labels == table.col_labels {
            return Ok(table);
        }
        if table.has_duplicate_labels() {
            debug!("Duplicate labels present; column alignment deferred");
            return Ok(table);
        }

        warn!("Column order differs from row order; reordering columns");
        let col_pos: BTreeMap<&str, usize> = table
            .col_labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let col_idx: Vec<usize> = table
            .row_labels
            .iter()
            .filter_map(|l| col_pos.get(l.as_str()).copied())
            .collect();
        let row_idx: Vec<usize> = (0..table.n_rows()).collect();
        report.columns_reordered = true;
        Ok(take(&table, &row_idx, &col_idx))
    }

    /// Sum rows (and columns) sharing a label, then align columns to the
    /// merged row order. Merged labels come out in lexical order.
    pub fn merge_duplicates(
        &self,
        table: LabeledTable,
        report: &mut SanitizeReport,
    ) -> Result<LabeledTable, SanitizeError> {
        if !has_duplicates(&table.row_labels) && !has_duplicates(&table.col_labels) {
            return Ok(table);
        }

        // rows
        let mut merged_rows: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        for (label, row) in table.row_labels.iter().zip(&table.rows) {
            let acc = merged_rows
                .entry(label.clone())
                .or_insert_with(|| vec![0; row.len()]);
            for ((a, v), col) in acc.iter_mut().zip(row).zip(&table.col_labels) {
                *a = a.checked_add(*v).ok_or_else(|| SanitizeError::MergeOverflow {
                    row: label.clone(),
                    col: col.clone(),
                })?;
            }
        }
        report.duplicate_rows_merged = table.n_rows() - merged_rows.len();

        // columns, realigned to merged row order
        let row_labels: Vec<String> = merged_rows.keys().cloned().collect();
        let target: BTreeMap<&str, usize> = row_labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let distinct_cols: BTreeSet<&str> = table.col_labels.iter().map(String::as_str).collect();
        report.duplicate_cols_merged = table.n_cols() - distinct_cols.len();

        let rows: Vec<Vec<u64>> = merged_rows
            .iter()
            .map(|(label, row)| -> Result<Vec<u64>, SanitizeError> {
                let mut out = vec![0u64; row_labels.len()];
                for (col, v) in table.col_labels.iter().zip(row) {
                    if let Some(&j) = target.get(col.as_str()) {
                        out[j] = out[j].checked_add(*v).ok_or_else(|| SanitizeError::MergeOverflow {
                            row: label.clone(),
                            col: col.clone(),
                        })?;
                    }
                }
                Ok(out)
            })
            .collect::<Result<_, _>>()?;

        warn!(
            rows_merged = report.duplicate_rows_merged,
            cols_merged = report.duplicate_cols_merged,
            "Duplicate labels aggregated by summation"
        );

        Ok(LabeledTable {
            col_labels: row_labels.clone(),
            row_labels,
            rows,
        })
    }
}

/// Load a frequency table, stripping whitespace around labels.
pub fn load_frequencies(path: &Path) -> Result<FrequencyTable, SanitizeError> {
    if !path.is_file() {
        return Err(SanitizeError::MissingFrequencyFile(path.to_path_buf()));
    }
    let table = read_frequencies(path).map_err(|source| SanitizeError::Table {
        path: path.to_path_buf(),
        source,
    })?;
    let entries = table
        .entries()
        .iter()
        .cloned()
        .map(|mut e| {
            e.ingredient = e.ingredient.trim().to_string();
            e
        })
        .collect();
    let table = FrequencyTable::new(entries);
    info!(entries = table.len(), "Loaded frequency table from {}", path.display());
    Ok(table)
}

/// Indices of `labels` whose value is in `keep`, grouped by `keep` order.
fn positions_in_order(labels: &[String], keep: &[String]) -> Vec<usize> {
    keep.iter()
        .flat_map(|k| {
            labels
                .iter()
                .enumerate()
                .filter(move |(_, l)| *l == k)
                .map(|(i, _)| i)
        })
        .collect()
}

fn take(table: &LabeledTable, row_idx: &[usize], col_idx: &[usize]) -> LabeledTable {
    LabeledTable {
        row_labels: row_idx.iter().map(|&i| table.row_labels[i].clone()).collect(),
        col_labels: col_idx.iter().map(|&j| table.col_labels[j].clone()).collect(),
        rows: row_idx
            .iter()
            .map(|&i| col_idx.iter().map(|&j| table.rows[i][j]).collect())
            .collect(),
    }
}
