//! Labelled numeric tables.
//!
//! A `DataTable` is a dense `DMatrix<f64>` with one key per row and one name
//! per column. Row keys and column names are unique within a table so that
//! alignment by label is unambiguous.

use std::collections::{HashMap, HashSet};
use std::fmt;

use nalgebra::DMatrix;
use serde::Serialize;

use crate::error::FitError;
use crate::table::align::AlignmentIndex;

/// Row identifier. Integral reals are stored as `Int` so `1.0` and `"1"` match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum RowKey {
    Int(i64),
    /// Bit pattern of a non-integral finite `f64`.
    Real(u64),
    Label(String),
}

impl RowKey {
    pub fn real(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
            return Self::Int(value as i64);
        }
        Self::Real(value.to_bits())
    }

    /// Integer, then real, then free-text label.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => Self::real(f),
            _ => Self::Label(raw.to_string()),
        }
    }

    /// Numeric view of the key (labels have none).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Real(bits) => Some(f64::from_bits(*bits)),
            Self::Label(_) => None,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Real(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Self::Label(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RowKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for RowKey {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for RowKey {
    fn from(value: f64) -> Self {
        Self::real(value)
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        Self::Label(value.to_string())
    }
}

/// Dense table with labelled rows and columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    row_keys: Vec<RowKey>,
    columns: Vec<String>,
    values: DMatrix<f64>,
}

impl DataTable {
    pub fn new(row_keys: Vec<RowKey>, columns: Vec<String>, values: DMatrix<f64>) -> Result<Self, FitError> {
        if values.shape() != (row_keys.len(), columns.len()) {
            return Err(FitError::ShapeMismatch {
                expected: (row_keys.len(), columns.len()),
                actual: values.shape(),
            });
        }
        let mut seen_rows = HashSet::with_capacity(row_keys.len());
        if let Some(dup) = row_keys.iter().find(|k| !seen_rows.insert(*k)) {
            return Err(FitError::InvalidConfig(format!("duplicate row key '{dup}'")));
        }
        let mut seen_cols = HashSet::with_capacity(columns.len());
        if let Some(dup) = columns.iter().find(|c| !seen_cols.insert(c.as_str())) {
            return Err(FitError::InvalidConfig(format!("duplicate column '{dup}'")));
        }
        Ok(Self {
            row_keys,
            columns,
            values,
        })
    }

    /// Build from row-major records.
    pub fn from_rows(row_keys: Vec<RowKey>, columns: Vec<String>, rows: &[Vec<f64>]) -> Result<Self, FitError> {
        let ncols = columns.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != ncols) {
            return Err(FitError::ShapeMismatch {
                expected: (rows.len(), ncols),
                actual: (rows.len(), bad.len()),
            });
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let values = DMatrix::from_row_slice(rows.len(), ncols, &flat);
        Self::new(row_keys, columns, values)
    }

    /// Build from named columns of equal length.
    pub fn from_columns(row_keys: Vec<RowKey>, columns: Vec<(String, Vec<f64>)>) -> Result<Self, FitError> {
        let nrows = row_keys.len();
        if let Some((_, bad)) = columns.iter().find(|(_, c)| c.len() != nrows) {
            return Err(FitError::ShapeMismatch {
                expected: (nrows, columns.len()),
                actual: (bad.len(), columns.len()),
            });
        }
        let names: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        let values = DMatrix::from_fn(nrows, names.len(), |i, j| columns[j].1[i]);
        Self::new(row_keys, names, values)
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    pub fn row_keys(&self) -> &[RowKey] {
        &self.row_keys
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn get(&self, row: &RowKey, column: &str) -> Option<f64> {
        let i = self.row_keys.iter().position(|k| k == row)?;
        let j = self.columns.iter().position(|c| c == column)?;
        Some(self.values[(i, j)])
    }

    /// Select the rows and columns named by `index`, in index order.
    ///
    /// Fails with `ShapeMismatch` when any label is absent from this table.
    pub fn restrict(&self, index: &AlignmentIndex) -> Result<DataTable, FitError> {
        let row_pos: HashMap<&RowKey, usize> =
            self.row_keys.iter().enumerate().map(|(i, k)| (k, i)).collect();
        let col_pos: HashMap<&str, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(j, c)| (c.as_str(), j))
            .collect();

        let rows: Vec<usize> = index.row_keys.iter().filter_map(|k| row_pos.get(k).copied()).collect();
        let cols: Vec<usize> = index
            .columns
            .iter()
            .filter_map(|c| col_pos.get(c.as_str()).copied())
            .collect();
        if rows.len() != index.row_keys.len() || cols.len() != index.columns.len() {
            return Err(FitError::ShapeMismatch {
                expected: index.shape(),
                actual: (rows.len(), cols.len()),
            });
        }

        let values = DMatrix::from_fn(rows.len(), cols.len(), |i, j| self.values[(rows[i], cols[j])]);
        Ok(DataTable {
            row_keys: index.row_keys.clone(),
            columns: index.columns.clone(),
            values,
        })
    }

    /// Values flattened in row-major order.
    pub fn to_row_major(&self) -> Vec<f64> {
        let (n, m) = self.shape();
        let mut out = Vec::with_capacity(n * m);
        for i in 0..n {
            for j in 0..m {
                out.push(self.values[(i, j)]);
            }
        }
        out
    }
}
