//! Alignment of model output tables against reference data.
//!
//! When a user function produces a whole output table, only the rows and
//! columns it shares with the reference data take part in the fit. The
//! shared labels are computed once (`compute_intersection`) and every later
//! evaluation is restricted to them before differencing.

use std::collections::HashSet;

use nalgebra::DMatrix;
use serde::Serialize;

use crate::error::FitError;
use crate::table::frame::{DataTable, RowKey};

/// Row keys and column names common to two tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentIndex {
    pub row_keys: Vec<RowKey>,
    pub columns: Vec<String>,
}

impl AlignmentIndex {
    /// Index covering every row and column of `table`.
    pub fn full(table: &DataTable) -> Self {
        Self {
            row_keys: table.row_keys().to_vec(),
            columns: table.columns().to_vec(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.row_keys.len(), self.columns.len())
    }

    pub fn is_empty(&self) -> bool {
        self.row_keys.is_empty() || self.columns.is_empty()
    }

    /// Number of residuals a restricted table produces.
    pub fn len(&self) -> usize {
        self.row_keys.len() * self.columns.len()
    }
}

/// Labels present in both tables, in the order of `first`.
pub fn compute_intersection(first: &DataTable, second: &DataTable) -> AlignmentIndex {
    let second_rows: HashSet<&RowKey> = second.row_keys().iter().collect();
    let second_cols: HashSet<&str> = second.columns().iter().map(String::as_str).collect();

    AlignmentIndex {
        row_keys: first
            .row_keys()
            .iter()
            .filter(|k| second_rows.contains(k))
            .cloned()
            .collect(),
        columns: first
            .columns()
            .iter()
            .filter(|c| second_cols.contains(c.as_str()))
            .cloned()
            .collect(),
    }
}

/// Whether an unlabelled array has exactly the reference's (rows, columns).
///
/// A transposed array (rows and columns swapped) is rejected even when it
/// has the same number of elements.
pub fn is_correct_shape(raw: &DMatrix<f64>, reference: &DataTable) -> bool {
    raw.shape() == reference.shape()
}

/// `reference - model` over the aligned labels, flattened row-major.
pub fn build_residual_vector(
    model: &DataTable,
    reference: &DataTable,
    index: &AlignmentIndex,
) -> Result<Vec<f64>, FitError> {
    if index.is_empty() {
        return Err(FitError::EmptyAlignment);
    }
    let model = model.restrict(index)?;
    let reference = reference.restrict(index)?;
    if model.shape() != reference.shape() {
        return Err(FitError::ShapeMismatch {
            expected: reference.shape(),
            actual: model.shape(),
        });
    }
    Ok(difference_row_major(reference.values(), model.values()))
}

/// `reference - raw` for an unlabelled array, flattened row-major.
pub fn raw_residual_vector(raw: &DMatrix<f64>, reference: &DataTable) -> Result<Vec<f64>, FitError> {
    if !is_correct_shape(raw, reference) {
        return Err(FitError::ShapeMismatch {
            expected: reference.shape(),
            actual: raw.shape(),
        });
    }
    if reference.nrows() == 0 || reference.ncols() == 0 {
        return Err(FitError::EmptyAlignment);
    }
    Ok(difference_row_major(reference.values(), raw))
}

fn difference_row_major(reference: &DMatrix<f64>, model: &DMatrix<f64>) -> Vec<f64> {
    let (n, m) = reference.shape();
    let mut out = Vec::with_capacity(n * m);
    for i in 0..n {
        for j in 0..m {
            out.push(reference[(i, j)] - model[(i, j)]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[i64], cols: &[&str], fill: impl Fn(usize, usize) -> f64) -> DataTable {
        let keys = rows.iter().map(|&r| RowKey::Int(r)).collect();
        let names: Vec<String> = cols.iter().map(|c| c.to_string()).collect();
        let values = DMatrix::from_fn(rows.len(), cols.len(), fill);
        DataTable::new(keys, names, values).unwrap()
    }

    fn as_set<T: std::hash::Hash + Eq + Clone>(v: &[T]) -> HashSet<T> {
        v.iter().cloned().collect()
    }

    #[test]
    fn intersection_keeps_first_table_order() {
        let a = table(&[5, 1, 3, 9], &["y", "x", "z"], |_, _| 0.0);
        let b = table(&[3, 5, 7], &["x", "y"], |_, _| 0.0);
        let index = compute_intersection(&a, &b);
        assert_eq!(index.row_keys, vec![RowKey::Int(5), RowKey::Int(3)]);
        assert_eq!(index.columns, vec!["y".to_string(), "x".to_string()]);
    }

    #[test]
    fn intersection_is_symmetric_as_sets() {
        let a = table(&[5, 1, 3, 9], &["y", "x", "z"], |_, _| 0.0);
        let b = table(&[3, 5, 7], &["x", "y", "w"], |_, _| 0.0);
        let ab = compute_intersection(&a, &b);
        let ba = compute_intersection(&b, &a);
        assert_eq!(as_set(&ab.row_keys), as_set(&ba.row_keys));
        assert_eq!(as_set(&ab.columns), as_set(&ba.columns));
    }

    #[test]
    fn intersection_with_itself_is_identity() {
        let a = table(&[5, 1, 3], &["y", "x"], |_, _| 0.0);
        assert_eq!(compute_intersection(&a, &a), AlignmentIndex::full(&a));
    }

    #[test]
    fn correct_shape_rejects_transpose() {
        let reference = table(&[0, 1, 2], &["a", "b"], |_, _| 0.0);
        assert!(is_correct_shape(&DMatrix::zeros(3, 2), &reference));
        assert!(!is_correct_shape(&DMatrix::zeros(2, 3), &reference));
    }

    #[test]
    fn residuals_are_reference_minus_model_row_major() {
        let reference = table(&[0, 1], &["a", "b"], |i, j| (10 * i + j) as f64);
        // Model has an extra row and column, in a different order.
        let model = table(&[1, 0, 2], &["b", "c", "a"], |_, _| 1.0);
        let index = compute_intersection(&reference, &model);
        let r = build_residual_vector(&model, &reference, &index).unwrap();
        assert_eq!(r, vec![-1.0, 0.0, 9.0, 10.0]);
    }

    #[test]
    fn disjoint_tables_cannot_be_aligned() {
        let reference = table(&[0, 1], &["a"], |_, _| 0.0);
        let model = table(&[2, 3], &["a"], |_, _| 0.0);
        let index = compute_intersection(&reference, &model);
        assert!(matches!(
            build_residual_vector(&model, &reference, &index),
            Err(FitError::EmptyAlignment)
        ));
    }

    #[test]
    fn restriction_failure_is_a_shape_mismatch() {
        let reference = table(&[0, 1], &["a"], |_, _| 0.0);
        let model = table(&[0], &["a"], |_, _| 0.0);
        let index = AlignmentIndex::full(&reference);
        assert!(matches!(
            build_residual_vector(&model, &reference, &index),
            Err(FitError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn raw_output_must_match_reference_shape() {
        let reference = table(&[0, 1, 2], &["a", "b"], |_, _| 2.0);
        let ok = raw_residual_vector(&DMatrix::from_element(3, 2, 0.5), &reference).unwrap();
        assert_eq!(ok, vec![1.5; 6]);
        assert!(matches!(
            raw_residual_vector(&DMatrix::zeros(2, 3), &reference),
            Err(FitError::ShapeMismatch { expected: (3, 2), actual: (2, 3) })
        ));
    }
}
