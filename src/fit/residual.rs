//! Residual-producing user functions.
//!
//! Three shapes are supported:
//!
//! - any `Fn(&ParameterSet) -> Result<Vec<f64>, FitError>` closure
//! - `NamedResiduals`: a closure over a name -> value map whose keys must
//!   exactly match the declared parameter names
//! - `TableObjective`: a closure producing a whole output table, aligned
//!   against reference data before differencing

use std::collections::BTreeSet;

use log::debug;
use nalgebra::DMatrix;

use crate::domain::{ParameterSet, ParameterValues};
use crate::error::FitError;
use crate::table::{
    AlignmentIndex, DataTable, build_residual_vector, compute_intersection, is_correct_shape, raw_residual_vector,
};

/// Parameters in, residual vector out.
pub trait ResidualFunction: Sync {
    fn residuals(&self, parameters: &ParameterSet) -> Result<Vec<f64>, FitError>;
}

impl<F> ResidualFunction for F
where
    F: Fn(&ParameterSet) -> Result<Vec<f64>, FitError> + Sync,
{
    fn residuals(&self, parameters: &ParameterSet) -> Result<Vec<f64>, FitError> {
        self(parameters)
    }
}

/// Declared parameter names of a user function.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterNames(BTreeSet<String>);

impl ParameterNames {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self(names.iter().map(|n| n.as_ref().to_string()).collect())
    }

    /// Name -> value map of `parameters`, if its names are exactly the declared ones.
    pub fn values_of(&self, parameters: &ParameterSet) -> Result<ParameterValues, FitError> {
        let values = parameters.values_by_name();
        let missing: Vec<String> = self.0.iter().filter(|n| !values.contains_key(*n)).cloned().collect();
        let extra: Vec<String> = values.keys().filter(|n| !self.0.contains(*n)).cloned().collect();
        if missing.is_empty() && extra.is_empty() {
            Ok(values)
        } else {
            Err(FitError::ParameterMismatch { missing, extra })
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A residual closure called with named values.
pub struct NamedResiduals<F> {
    names: ParameterNames,
    function: F,
}

impl<F> NamedResiduals<F>
where
    F: Fn(&ParameterValues) -> Result<Vec<f64>, FitError> + Sync,
{
    pub fn new<S: AsRef<str>>(names: &[S], function: F) -> Self {
        Self {
            names: ParameterNames::new(names),
            function,
        }
    }

    pub fn names(&self) -> &ParameterNames {
        &self.names
    }
}

impl<F> ResidualFunction for NamedResiduals<F>
where
    F: Fn(&ParameterValues) -> Result<Vec<f64>, FitError> + Sync,
{
    fn residuals(&self, parameters: &ParameterSet) -> Result<Vec<f64>, FitError> {
        let values = self.names.values_of(parameters)?;
        (self.function)(&values)
    }
}

/// What a table-producing function returns.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOutput {
    /// Labelled rows and columns, aligned by label.
    Labelled(DataTable),
    /// A bare array that must have the reference's exact shape.
    Raw(DMatrix<f64>),
}

/// Residuals `reference - model` from a table-producing function.
pub struct TableObjective<F> {
    names: ParameterNames,
    reference: DataTable,
    alignment: Option<AlignmentIndex>,
    function: F,
}

impl<F> TableObjective<F>
where
    F: Fn(&ParameterValues) -> Result<TableOutput, FitError> + Sync,
{
    /// Evaluates the function once at `initial` and fixes the alignment.
    ///
    /// Fails when that first call fails, when a labelled output shares no rows or
    /// columns with `reference`, or when a raw output has the wrong shape.
    pub fn new<S: AsRef<str>>(
        names: &[S],
        reference: DataTable,
        initial: &ParameterSet,
        function: F,
    ) -> Result<Self, FitError> {
        let names = ParameterNames::new(names);
        let first = function(&names.values_of(initial)?)?;
        let alignment = match &first {
            TableOutput::Labelled(table) => {
                let index = compute_intersection(&reference, table);
                if index.is_empty() {
                    return Err(FitError::EmptyAlignment);
                }
                debug!(
                    "aligned model output {:?} to reference {:?} on {:?}",
                    table.shape(),
                    reference.shape(),
                    index.shape()
                );
                Some(index)
            }
            TableOutput::Raw(raw) => {
                if !is_correct_shape(raw, &reference) {
                    return Err(FitError::ShapeMismatch {
                        expected: reference.shape(),
                        actual: raw.shape(),
                    });
                }
                None
            }
        };
        Ok(Self {
            names,
            reference,
            alignment,
            function,
        })
    }

    pub fn reference(&self) -> &DataTable {
        &self.reference
    }

    /// The shared labels, when the function produces labelled tables.
    pub fn alignment(&self) -> Option<&AlignmentIndex> {
        self.alignment.as_ref()
    }

    /// The unaligned model output at `parameters` (diagnostics only).
    pub fn raw_output(&self, parameters: &ParameterSet) -> Result<TableOutput, FitError> {
        (self.function)(&self.names.values_of(parameters)?)
    }
}

impl<F> ResidualFunction for TableObjective<F>
where
    F: Fn(&ParameterValues) -> Result<TableOutput, FitError> + Sync,
{
    fn residuals(&self, parameters: &ParameterSet) -> Result<Vec<f64>, FitError> {
        match self.raw_output(parameters)? {
            TableOutput::Labelled(table) => match &self.alignment {
                Some(index) => build_residual_vector(&table, &self.reference, index),
                None => {
                    let index = compute_intersection(&self.reference, &table);
                    build_residual_vector(&table, &self.reference, &index)
                }
            },
            TableOutput::Raw(raw) => raw_residual_vector(&raw, &self.reference),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::RowKey;

    fn xy(x: f64, y: f64) -> ParameterSet {
        let mut p = ParameterSet::new();
        p.add("x", x, -10.0, 10.0).unwrap();
        p.add("y", y, -10.0, 10.0).unwrap();
        p
    }

    fn reference() -> DataTable {
        DataTable::from_columns(
            vec![RowKey::Int(0), RowKey::Int(1), RowKey::Int(2)],
            vec![("a".to_string(), vec![1.0, 2.0, 3.0])],
        )
        .unwrap()
    }

    #[test]
    fn closures_are_residual_functions() {
        let f = |p: &ParameterSet| Ok::<_, FitError>(vec![p.value("x").unwrap_or(0.0) - 1.0]);
        assert_eq!(f.residuals(&xy(3.0, 0.0)).unwrap(), vec![2.0]);
    }

    #[test]
    fn named_residuals_require_exact_names() {
        let f = NamedResiduals::new(&["x", "y"], |v: &ParameterValues| Ok(vec![v["x"] + v["y"]]));
        assert_eq!(f.residuals(&xy(1.0, 2.0)).unwrap(), vec![3.0]);

        let mut extra = xy(1.0, 2.0);
        extra.add("z", 0.0, -1.0, 1.0).unwrap();
        match f.residuals(&extra) {
            Err(FitError::ParameterMismatch { missing, extra }) => {
                assert!(missing.is_empty());
                assert_eq!(extra, vec!["z".to_string()]);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }

        let mut only_x = ParameterSet::new();
        only_x.add("x", 0.0, -1.0, 1.0).unwrap();
        assert!(matches!(
            f.residuals(&only_x),
            Err(FitError::ParameterMismatch { missing, .. }) if missing == vec!["y".to_string()]
        ));
    }

    #[test]
    fn labelled_table_output_is_aligned_once() {
        // Model output has an extra row (3) and column (b).
        let model = |v: &ParameterValues| {
            let x = v["x"];
            DataTable::from_columns(
                vec![RowKey::Int(3), RowKey::Int(2), RowKey::Int(1), RowKey::Int(0)],
                vec![
                    ("b".to_string(), vec![0.0; 4]),
                    ("a".to_string(), vec![x, x, x, x]),
                ],
            )
            .map(TableOutput::Labelled)
        };
        let objective = TableObjective::new(&["x", "y"], reference(), &xy(1.0, 0.0), model).unwrap();
        let index = objective.alignment().unwrap();
        assert_eq!(index.shape(), (3, 1));
        assert_eq!(objective.residuals(&xy(1.0, 0.0)).unwrap(), vec![0.0, 1.0, 2.0]);
        assert!(matches!(objective.raw_output(&xy(1.0, 0.0)), Ok(TableOutput::Labelled(t)) if t.nrows() == 4));
    }

    #[test]
    fn disjoint_labelled_output_fails_at_construction() {
        let model = |_: &ParameterValues| {
            DataTable::from_columns(vec![RowKey::Int(9)], vec![("a".to_string(), vec![0.0])]).map(TableOutput::Labelled)
        };
        let result = TableObjective::new(&["x", "y"], reference(), &xy(0.0, 0.0), model);
        assert!(matches!(result, Err(FitError::EmptyAlignment)));
    }

    #[test]
    fn transposed_raw_output_is_rejected() {
        let transposed = |_: &ParameterValues| Ok::<_, FitError>(TableOutput::Raw(DMatrix::zeros(1, 3)));
        let result = TableObjective::new(&["x", "y"], reference(), &xy(0.0, 0.0), transposed);
        assert!(matches!(result, Err(FitError::ShapeMismatch { expected: (3, 1), actual: (1, 3) })));

        let upright = |v: &ParameterValues| Ok::<_, FitError>(TableOutput::Raw(DMatrix::from_element(3, 1, v["y"])));
        let objective = TableObjective::new(&["x", "y"], reference(), &xy(0.0, 1.0), upright).unwrap();
        assert_eq!(objective.residuals(&xy(0.0, 1.0)).unwrap(), vec![0.0, 1.0, 2.0]);
    }
}
