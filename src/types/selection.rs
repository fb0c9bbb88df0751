use serde::{Deserialize, Serialize};

use crate::types::matrix::{CooccurrenceMatrix, LabeledTable, MatrixError};

/// Metadata describing how a selection was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionMetadata {
    pub requested: usize,

    pub matrix_rows: usize,
    pub matrix_cols: usize,
    pub frequency_rows: usize,

    pub intersection_with_rows: usize,
    pub intersection_with_cols: usize,

    /// True when no frequency label matched and matrix row order was used.
    pub fallback_used: bool,
    /// Top-ranked labels present as rows but absent from the columns.
    pub dropped_missing_in_cols: Vec<String>,
    /// Cells with no source value, written as zero.
    pub zero_filled_cells: usize,
}

/// The final result of a subset selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub sub_matrix: CooccurrenceMatrix,
    pub selected_labels: Vec<String>,
    pub selection: SelectionMetadata,
}

impl SelectionResult {
    pub fn len(&self) -> usize {
        self.selected_labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected_labels.is_empty()
    }

    /// True when fewer labels were selected than requested.
    pub fn is_reduced(&self) -> bool {
        self.selected_labels.len() < self.selection.requested
    }
}

/// Selection over a raw table; the sub-table keeps whatever asymmetry the
/// source had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSelection {
    pub sub_table: LabeledTable,
    pub selected_labels: Vec<String>,
    pub selection: SelectionMetadata,
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("Selected sub-matrix is invalid: {0}")]
    InvalidSubMatrix(#[from] MatrixError),
}
