use std::fs;
use std::path::{Path, PathBuf};

use ingredient_matrix::matrix::{MatrixSanitizer, SanitizeError, TableError};
use ingredient_matrix::types::LabeledTable;
use tempfile::tempdir;

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn table(rows: &[&str], cols: &[&str], cells: Vec<Vec<u64>>) -> LabeledTable {
    LabeledTable {
        row_labels: labels(rows),
        col_labels: labels(cols),
        rows: cells,
    }
}

/// Write a matrix CSV with the given axis labels; cell (i, j) is `f(i, j)`.
fn write_matrix_csv(path: &Path, rows: &[String], cols: &[String], f: impl Fn(usize, usize) -> u64) {
    let mut text = String::new();
    text.push_str(&format!(",{}\n", cols.join(",")));
    for (i, r) in rows.iter().enumerate() {
        let cells: Vec<String> = (0..cols.len()).map(|j| f(i, j).to_string()).collect();
        text.push_str(&format!("{},{}\n", r, cells.join(",")));
    }
    fs::write(path, text).unwrap();
}

fn write_frequency_csv(path: &Path, entries: &[(&str, u64)]) {
    let mut text = String::from("ingredient,frequency\n");
    for (name, freq) in entries {
        text.push_str(&format!("{},{}\n", name, freq));
    }
    fs::write(path, text).unwrap();
}

fn numbered(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}{:02}", prefix, i)).collect()
}

fn artifact_paths(dir: &Path) -> (PathBuf, PathBuf) {
    (dir.join("matrix.csv"), dir.join("frequencies.csv"))
}

#[test]
fn invariant_mismatched_axes_reduce_to_intersection() {
    let sanitizer = MatrixSanitizer::with_min_size(3);
    let (matrix, report) = sanitizer
        .sanitize(table(
            &["a", "b", "c"],
            &["a", "b", "d"],
            vec![vec![3, 1, 7], vec![1, 2, 7], vec![7, 7, 7]],
        ))
        .unwrap();

    assert_eq!(matrix.labels(), &labels(&["a", "b"])[..]);
    assert_eq!(matrix.get("a", "b"), Some(1));
    assert_eq!(matrix.get("a", "a"), Some(3));
    assert_eq!(report.rows_only_dropped, 1);
    assert_eq!(report.cols_only_dropped, 1);
    assert_eq!(report.final_size, 2);
    assert!(report.repairs.contains(&"intersect_labels".to_string()));
}

#[test]
fn invariant_duplicate_labels_are_summed() {
    let sanitizer = MatrixSanitizer::with_min_size(3);
    let (matrix, report) = sanitizer
        .sanitize(table(
            &["b", "a", "a"],
            &["b", "a", "a"],
            vec![vec![4, 1, 2], vec![1, 3, 0], vec![2, 0, 5]],
        ))
        .unwrap();

    assert_eq!(matrix.labels(), &labels(&["a", "b"])[..]);
    assert_eq!(matrix.get("a", "a"), Some(8));
    assert_eq!(matrix.get("a", "b"), Some(3));
    assert_eq!(matrix.get("b", "b"), Some(4));
    assert!(matrix.is_symmetric());
    assert_eq!(report.duplicate_rows_merged, 1);
    assert_eq!(report.duplicate_cols_merged, 1);
}

#[test]
fn invariant_duplicate_sum_overflow_is_an_error() {
    let err = MatrixSanitizer::with_min_size(2)
        .sanitize(table(&["a", "a"], &["a", "a"], vec![vec![u64::MAX, 0], vec![1, 0]]))
        .unwrap_err();

    match err {
        SanitizeError::MergeOverflow { row, col } => {
            assert_eq!(row, "a");
            assert_eq!(col, "a");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn invariant_clean_table_passes_untouched() {
    let names = numbered("ing", 10);
    let cells: Vec<Vec<u64>> = (0..10)
        .map(|i| (0..10).map(|j| (i + j) as u64).collect())
        .collect();
    let (matrix, report) = MatrixSanitizer::default()
        .sanitize(LabeledTable {
            row_labels: names.clone(),
            col_labels: names.clone(),
            rows: cells,
        })
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(matrix.labels(), &names[..]);
    assert_eq!(matrix.get("ing02", "ing07"), Some(9));
}

#[test]
fn non_square_table_is_rejected() {
    let err = MatrixSanitizer::with_min_size(1)
        .sanitize(table(&["a", "b"], &["a", "b", "c"], vec![vec![1, 0, 0], vec![0, 1, 0]]))
        .unwrap_err();
    assert!(matches!(err, SanitizeError::NotSquare { rows: 2, cols: 3 }));
}

#[test]
fn small_table_is_rejected() {
    let err = MatrixSanitizer::default()
        .sanitize(table(&["a", "b"], &["a", "b"], vec![vec![1, 0], vec![0, 1]]))
        .unwrap_err();
    assert!(matches!(err, SanitizeError::TooSmall { rows: 2, min: 10 }));
}

#[test]
fn disjoint_axes_leave_nothing() {
    let err = MatrixSanitizer::with_min_size(2)
        .sanitize(table(&["a", "b"], &["c", "d"], vec![vec![1, 0], vec![0, 1]]))
        .unwrap_err();
    assert!(matches!(err, SanitizeError::Empty));
}

#[test]
fn asymmetric_values_are_fatal() {
    let err = MatrixSanitizer::with_min_size(2)
        .sanitize(table(&["a", "b"], &["a", "b"], vec![vec![1, 5], vec![0, 1]]))
        .unwrap_err();
    assert!(matches!(err, SanitizeError::Invalid(_)));
}

#[test]
fn load_repairs_whitespace_and_column_order() {
    let dir = tempdir().unwrap();
    let (matrix_path, frequency_path) = artifact_paths(dir.path());

    let names = numbered("ing", 12);
    let padded: Vec<String> = names.iter().map(|n| format!(" {} ", n)).collect();
    let mut reversed = names.clone();
    reversed.reverse();
    // value depends only on the unordered pair of original indices
    write_matrix_csv(&matrix_path, &padded, &reversed, |i, j| {
        let j = 11 - j;
        (i.min(j) * 100 + i.max(j)) as u64
    });
    write_frequency_csv(&frequency_path, &[(" ing03 ", 9), ("ing01", 4)]);

    let loaded = MatrixSanitizer::default()
        .load_and_sanitize(&matrix_path, &frequency_path)
        .unwrap();

    assert_eq!(loaded.matrix.labels(), &names[..]);
    assert_eq!(loaded.matrix.get("ing02", "ing05"), Some(205));
    assert_eq!(loaded.matrix.get("ing05", "ing02"), Some(205));
    assert_eq!(loaded.report.labels_stripped, 12);
    assert!(loaded.report.columns_reordered);
    assert_eq!(loaded.frequencies.frequency_of("ing03"), Some(9));
}

#[test]
fn load_without_frequency_file_fails() {
    let dir = tempdir().unwrap();
    let (matrix_path, frequency_path) = artifact_paths(dir.path());
    let names = numbered("ing", 10);
    write_matrix_csv(&matrix_path, &names, &names, |i, j| if i == j { 1 } else { 0 });

    let err = MatrixSanitizer::default()
        .load_and_sanitize(&matrix_path, &frequency_path)
        .unwrap_err();
    match err {
        SanitizeError::MissingFrequencyFile(path) => assert_eq!(path, frequency_path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn load_without_matrix_file_fails() {
    let dir = tempdir().unwrap();
    let (matrix_path, frequency_path) = artifact_paths(dir.path());
    write_frequency_csv(&frequency_path, &[("salt", 1)]);

    let err = MatrixSanitizer::default()
        .load_and_sanitize(&matrix_path, &frequency_path)
        .unwrap_err();
    assert!(matches!(err, SanitizeError::MatrixUnavailable(_)));
}

#[test]
fn load_names_the_rejected_matrix() {
    let dir = tempdir().unwrap();
    let (matrix_path, frequency_path) = artifact_paths(dir.path());
    let names = numbered("ing", 4);
    write_matrix_csv(&matrix_path, &names, &names, |_, _| 1);
    write_frequency_csv(&frequency_path, &[("ing00", 1)]);

    let err = MatrixSanitizer::default()
        .load_and_sanitize(&matrix_path, &frequency_path)
        .unwrap_err();
    match err {
        SanitizeError::Rejected { path, source } => {
            assert_eq!(path, matrix_path);
            assert!(matches!(*source, SanitizeError::TooSmall { rows: 4, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_cell_is_reported() {
    let dir = tempdir().unwrap();
    let (matrix_path, frequency_path) = artifact_paths(dir.path());
    fs::write(&matrix_path, ",a,b\na,1,x\nb,0,1\n").unwrap();
    write_frequency_csv(&frequency_path, &[("a", 1)]);

    let err = MatrixSanitizer::default()
        .load_and_sanitize(&matrix_path, &frequency_path)
        .unwrap_err();
    assert!(matches!(
        err,
        SanitizeError::Table {
            source: TableError::MalformedCell { .. },
            ..
        }
    ));
}

#[test]
fn frequency_file_requires_columns() {
    let dir = tempdir().unwrap();
    let (matrix_path, frequency_path) = artifact_paths(dir.path());
    let names = numbered("ing", 10);
    write_matrix_csv(&matrix_path, &names, &names, |_, _| 1);
    fs::write(&frequency_path, "name,count\nsalt,3\n").unwrap();

    let err = MatrixSanitizer::default()
        .load_and_sanitize(&matrix_path, &frequency_path)
        .unwrap_err();
    assert!(matches!(
        err,
        SanitizeError::Table {
            source: TableError::MissingColumn("ingredient"),
            ..
        }
    ));
}
