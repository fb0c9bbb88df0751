//! Reading and writing the two persisted artifacts.
//!
//! Matrix file: header row of column labels after an empty corner cell, then
//! one row per ingredient led by its label. Frequency file: `ingredient` and
//! `frequency` columns, one row per ingredient in matrix order.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::types::matrix::{CooccurrenceMatrix, FrequencyEntry, FrequencyTable, LabeledTable};

pub const MATRIX_FILE_NAME: &str = "ingredients_cooccurrence_matrix.csv";
pub const FREQUENCY_FILE_NAME: &str = "ingredients_list.csv";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Row {row} ({label:?}) has {actual} cells, header has {expected}")]
    RaggedRow {
        row: usize,
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("Cell ({row}, {col}) is not a non-negative integer: {value:?}")]
    MalformedCell {
        row: String,
        col: String,
        value: String,
    },
    #[error("Missing column: {0}")]
    MissingColumn(&'static str),
    #[error("Frequency for {ingredient:?} is not a non-negative integer: {value:?}")]
    MalformedFrequency { ingredient: String, value: String },
}

/// Parse a count cell. Accepts integral floats such as `3.0`.
pub fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<u64>() {
        return Some(v);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

/// Read a matrix file without interpreting or repairing its labels.
pub fn read_table(path: &Path) -> Result<LabeledTable, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let col_labels: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();

    let mut row_labels = Vec::new();
    let mut rows = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let mut fields = record.iter();
        let label = fields.next().unwrap_or_default().to_string();

        let cells: Vec<&str> = fields.collect();
        if cells.len() != col_labels.len() {
            return Err(TableError::RaggedRow {
                row,
                label,
                expected: col_labels.len(),
                actual: cells.len(),
            });
        }

        let mut values = Vec::with_capacity(cells.len());
        for (col, cell) in cells.into_iter().enumerate() {
            let value = parse_count(cell).ok_or_else(|| TableError::MalformedCell {
                row: label.clone(),
                col: col_labels[col].clone(),
                value: cell.to_string(),
            })?;
            values.push(value);
        }

        row_labels.push(label);
        rows.push(values);
    }

    Ok(LabeledTable {
        row_labels,
        col_labels,
        rows,
    })
}

pub fn write_matrix<W: io::Write>(matrix: &CooccurrenceMatrix, writer: W) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(matrix.len() + 1);
    header.push(String::new());
    header.extend(matrix.labels().iter().cloned());
    out.write_record(&header)?;

    for (i, label) in matrix.labels().iter().enumerate() {
        let mut record = Vec::with_capacity(matrix.len() + 1);
        record.push(label.clone());
        record.extend(matrix.row(i).iter().map(u64::to_string));
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}

pub fn read_frequencies(path: &Path) -> Result<FrequencyTable, TableError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let headers = reader.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or(TableError::MissingColumn(name))
    };
    let ingredient_col = column("ingredient")?;
    let frequency_col = column("frequency")?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let ingredient = record.get(ingredient_col).unwrap_or_default().to_string();
        let raw = record.get(frequency_col).unwrap_or_default();
        let frequency = parse_count(raw).ok_or_else(|| TableError::MalformedFrequency {
            ingredient: ingredient.clone(),
            value: raw.to_string(),
        })?;
        entries.push(FrequencyEntry {
            ingredient,
            frequency,
        });
    }
    Ok(FrequencyTable::new(entries))
}

pub fn write_frequencies<W: io::Write>(table: &FrequencyTable, writer: W) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    for entry in table.entries() {
        out.serialize(entry)?;
    }
    // An empty table still gets its header.
    if table.is_empty() {
        out.write_record(["ingredient", "frequency"])?;
    }
    out.flush()?;
    Ok(())
}
