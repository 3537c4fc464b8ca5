//! CSV ingest of reference tables.
//!
//! Layout: a header row, then one row per observation. The first column is
//! the row key (usually `x`), every other column is one numeric series.
//!
//! Bad rows are skipped and reported rather than failing the whole load; a
//! file with no usable rows is an error.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use log::warn;

use crate::error::FitError;
use crate::table::{DataTable, RowKey};

/// A row that could not be used.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    /// 1-based line number in the file.
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: DataTable,
    /// Name of the key column.
    pub key_column: String,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl LoadedTable {
    /// Numeric row keys and the first series, for data-driven defaults.
    pub fn first_series(&self) -> (Vec<f64>, Vec<f64>) {
        let values = self.table.values();
        self.table
            .row_keys()
            .iter()
            .enumerate()
            .filter_map(|(i, k)| k.as_f64().map(|x| (x, values[(i, 0)])))
            .unzip()
    }
}

pub fn load_table(path: &Path) -> Result<LoadedTable, FitError> {
    let file = File::open(path).map_err(|e| FitError::Io(format!("failed to open CSV '{}': {e}", path.display())))?;
    read_table(file)
}

pub fn read_table<R: Read>(source: R) -> Result<LoadedTable, FitError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| FitError::Io(format!("failed to read CSV headers: {e}")))?
        .clone();
    if headers.len() < 2 {
        return Err(FitError::InvalidConfig(
            "CSV needs a key column and at least one value column".to_string(),
        ));
    }
    let key_column = headers.get(0).unwrap_or_default().to_string();
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut keys = Vec::new();
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record, columns.len()));
        match parsed {
            Ok((key, _)) if seen.contains(&key) => row_errors.push(RowError {
                line,
                message: format!("duplicate row key '{key}'"),
            }),
            Ok((key, values)) => {
                seen.insert(key.clone());
                keys.push(key);
                rows.push(values);
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    for e in &row_errors {
        warn!("skipping line {}: {}", e.line, e.message);
    }
    if rows.is_empty() {
        return Err(FitError::EmptyAlignment);
    }

    let table = DataTable::from_rows(keys, columns, &rows)?;
    Ok(LoadedTable {
        table,
        key_column,
        row_errors,
        rows_read,
    })
}

fn parse_row(record: &StringRecord, ncols: usize) -> Result<(RowKey, Vec<f64>), String> {
    if record.len() != ncols + 1 {
        return Err(format!("expected {} fields, found {}", ncols + 1, record.len()));
    }
    let key = match record.get(0) {
        Some(k) if !k.is_empty() => RowKey::parse(k),
        _ => return Err("missing row key".to_string()),
    };
    let values = record
        .iter()
        .skip(1)
        .map(|field| {
            field
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("'{field}' is not a finite number"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((key, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_keys_and_series() {
        let csv = "x,a,b\n0,1.0,2.0\n1,3.0,4.0\n2.5,5.0,6.0\n";
        let loaded = read_table(csv.as_bytes()).unwrap();
        assert_eq!(loaded.key_column, "x");
        assert_eq!(loaded.table.shape(), (3, 2));
        assert_eq!(loaded.table.row_keys()[2], RowKey::real(2.5));
        assert_eq!(loaded.table.get(&RowKey::Int(1), "b"), Some(4.0));
        assert_eq!(loaded.first_series(), (vec![0.0, 1.0, 2.5], vec![1.0, 3.0, 5.0]));
    }

    #[test]
    fn bad_rows_are_skipped_and_reported() {
        let csv = "x,a\n0,1.0\n1,oops\n1,2.0\n0,9.0\n2\n";
        let loaded = read_table(csv.as_bytes()).unwrap();
        assert_eq!(loaded.rows_read, 5);
        assert_eq!(loaded.table.nrows(), 2);
        let lines: Vec<usize> = loaded.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 5, 6]);
    }

    #[test]
    fn duplicates_are_found_across_many_rows() {
        let mut csv = String::from("x,a\n");
        for i in 0..5000 {
            csv.push_str(&format!("{i},{i}\n"));
        }
        csv.push_str("0.0,1\n4999,2\n");
        let loaded = read_table(csv.as_bytes()).unwrap();
        assert_eq!(loaded.table.nrows(), 5000);
        let lines: Vec<usize> = loaded.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![5002, 5003]);
        assert!(loaded.row_errors[0].message.contains("duplicate row key"));
    }

    #[test]
    fn no_usable_rows_is_an_error() {
        assert!(read_table("x,a\n0,nan\n".as_bytes()).is_err());
        assert!(matches!(read_table("x\n0\n".as_bytes()), Err(FitError::InvalidConfig(_))));
    }
}
