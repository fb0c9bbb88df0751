pub mod ranking;

use std::collections::HashSet;

use tracing::{error, info, warn};

use crate::types::matrix::{CooccurrenceMatrix, FrequencyTable, LabeledMatrix, LabeledTable};
use crate::types::selection::{SelectionError, SelectionMetadata, SelectionResult, TableSelection};
pub use ranking::top_by_frequency;

/// Extracts the working sub-matrix for a requested number of ingredients.
///
/// Ranking follows the frequency table. When no frequency label matches a
/// matrix row, the first `n` rows in matrix order are used instead; this is
/// the only path that ignores frequencies.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubsetSelector;

impl SubsetSelector {
	pub fn new() -> Self {
		Self
	}

	pub fn select(
		&self,
		matrix: &CooccurrenceMatrix,
		frequencies: &FrequencyTable,
		n: usize,
	) -> Result<SelectionResult, SelectionError> {
		let resolved = self.resolve(matrix, frequencies, n);
		let sub_matrix = CooccurrenceMatrix::new(resolved.labels.clone(), resolved.values)?;

		Ok(SelectionResult {
			sub_matrix,
			selected_labels: resolved.labels,
			selection: resolved.metadata,
		})
	}

	/// Same ranking and reindexing over a raw table, without requiring the
	/// result to be symmetric.
	pub fn select_table<M: LabeledMatrix>(
		&self,
		matrix: &M,
		frequencies: &FrequencyTable,
		n: usize,
	) -> TableSelection {
		let resolved = self.resolve(matrix, frequencies, n);
		let side = resolved.labels.len();
		let rows = if side == 0 {
			Vec::new()
		} else {
			resolved.values.chunks(side).map(<[u64]>::to_vec).collect()
		};

		TableSelection {
			sub_table: LabeledTable {
				row_labels: resolved.labels.clone(),
				col_labels: resolved.labels.clone(),
				rows,
			},
			selected_labels: resolved.labels,
			selection: resolved.metadata,
		}
	}

	fn resolve<M: LabeledMatrix>(&self, matrix: &M, frequencies: &FrequencyTable, n: usize) -> Resolved {
		let row_labels = matrix.row_labels();
		let col_labels = matrix.col_labels();
		let row_set: HashSet<&str> = row_labels.iter().map(String::as_str).collect();
		let col_set: HashSet<&str> = col_labels.iter().map(String::as_str).collect();

		info!(
			matrix_rows = row_labels.len(),
			matrix_cols = col_labels.len(),
			frequency_rows = frequencies.len(),
			requested = n,
			"Selecting sub-matrix"
		);
		if row_set != col_set {
			warn!("Row and column labels do not match exactly");
		}

		// 1. Intersections
		let listed: HashSet<&str> = frequencies.labels().collect();
		let intersection_with_rows = listed.intersection(&row_set).count();
		let intersection_with_cols = listed.intersection(&col_set).count();
		info!(
			with_rows = intersection_with_rows,
			with_cols = intersection_with_cols,
			"Frequency table overlap"
		);

		// 2. Label choice
		let mut dropped_missing_in_cols = Vec::new();
		let fallback_used = intersection_with_rows == 0;
		let selected_labels: Vec<String> = if fallback_used {
			error!("No frequency label matches a matrix row; using matrix row order");
			let mut seen = HashSet::new();
			row_labels
				.iter()
				.filter(|l| seen.insert(l.as_str()))
				.take(n)
				.cloned()
				.collect()
		} else {
			let top = top_by_frequency(frequencies, &row_set, n);
			let mut kept = Vec::with_capacity(top.len());
			for entry in top {
				if col_set.contains(entry.ingredient.as_str()) {
					kept.push(entry.ingredient.clone());
				} else {
					dropped_missing_in_cols.push(entry.ingredient.clone());
				}
			}
			if !dropped_missing_in_cols.is_empty() {
				warn!(
					dropped = dropped_missing_in_cols.len(),
					sample = ?dropped_missing_in_cols.iter().take(8).collect::<Vec<_>>(),
					"Ranked labels missing from columns were dropped"
				);
			}
			kept
		};

		if selected_labels.len() < n {
			warn!(
				selected = selected_labels.len(),
				requested = n,
				"Fewer labels available than requested"
			);
		}

		// 3. Reindex both axes; absent cells become zero
		let side = selected_labels.len();
		let mut values = Vec::with_capacity(side * side);
		let mut zero_filled_cells = 0;
		for a in &selected_labels {
			for b in &selected_labels {
				match matrix.cell(a, b) {
					Some(v) => values.push(v),
					None => {
						zero_filled_cells += 1;
						values.push(0);
					}
				}
			}
		}
		if zero_filled_cells > 0 {
			warn!(cells = zero_filled_cells, "Missing cells filled with zero");
		}

		info!(
			selected = side,
			fallback = fallback_used,
			"Selection complete"
		);

		Resolved {
			labels: selected_labels,
			values,
			metadata: SelectionMetadata {
				requested: n,
				matrix_rows: row_labels.len(),
				matrix_cols: col_labels.len(),
				frequency_rows: frequencies.len(),
				intersection_with_rows,
				intersection_with_cols,
				fallback_used,
				dropped_missing_in_cols,
				zero_filled_cells,
			},
		}
	}
}

// Labels in output order with their row-major cells.
struct Resolved {
	labels: Vec<String>,
	values: Vec<u64>,
	metadata: SelectionMetadata,
}
