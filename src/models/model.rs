//! Built-in curve models for the CLI.
//!
//! Each model is a pure function of `x` and a name -> value map, so it can
//! back either a plain residual closure or a table-producing function.

use crate::domain::{ModelKind, Parameter, ParameterSet, ParameterValues};
use crate::error::FitError;
use crate::table::{DataTable, RowKey};

impl ModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Parabola => "parabola",
            Self::Exponential => "exponential decay",
            Self::Logistic => "logistic",
        }
    }

    /// Parameter names in flattening order.
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            Self::Parabola => &["center", "mult"],
            Self::Exponential => &["amplitude", "rate", "offset"],
            Self::Logistic => &["capacity", "rate", "midpoint"],
        }
    }
}

fn lookup(values: &ParameterValues, name: &str) -> Result<f64, FitError> {
    values.get(name).copied().ok_or_else(|| FitError::ParameterMismatch {
        missing: vec![name.to_string()],
        extra: Vec::new(),
    })
}

/// Evaluate `model` at `x`.
pub fn predict(model: ModelKind, x: f64, values: &ParameterValues) -> Result<f64, FitError> {
    let y = match model {
        ModelKind::Parabola => {
            let center = lookup(values, "center")?;
            lookup(values, "mult")? * (x - center).powi(2)
        }
        ModelKind::Exponential => {
            let rate = lookup(values, "rate")?;
            lookup(values, "amplitude")? * (-rate * x).exp() + lookup(values, "offset")?
        }
        ModelKind::Logistic => {
            let rate = lookup(values, "rate")?;
            let midpoint = lookup(values, "midpoint")?;
            lookup(values, "capacity")? / (1.0 + (-rate * (x - midpoint)).exp())
        }
    };
    Ok(y)
}

/// Model output over `row_keys` (numeric) for every column in `columns`.
///
/// Every column gets the same curve; the table lines up with reference data
/// that has one series per column.
pub fn model_table(
    model: ModelKind,
    values: &ParameterValues,
    row_keys: &[RowKey],
    columns: &[String],
) -> Result<DataTable, FitError> {
    let mut ys = Vec::with_capacity(row_keys.len());
    for key in row_keys {
        let x = key
            .as_f64()
            .ok_or_else(|| FitError::InvalidConfig(format!("row key '{key}' is not numeric")))?;
        ys.push(predict(model, x, values)?);
    }
    let data = columns.iter().map(|c| (c.clone(), ys.clone())).collect();
    DataTable::from_columns(row_keys.to_vec(), data)
}

/// Data-driven starting values and finite bounds for `model`.
pub fn default_parameters(model: ModelKind, xs: &[f64], ys: &[f64]) -> Result<ParameterSet, FitError> {
    if xs.is_empty() || xs.len() != ys.len() {
        return Err(FitError::InvalidConfig(
            "default parameters need matching, non-empty x and y samples".to_string(),
        ));
    }
    let (x_min, x_max) = min_max(xs);
    let (y_min, y_max) = min_max(ys);
    let span = (x_max - x_min).max(1e-9);
    let range = (y_max - y_min).max(1e-9);
    let x_mid = 0.5 * (x_min + x_max);
    let y_abs = y_min.abs().max(y_max.abs()).max(1e-9);

    let mut set = ParameterSet::new();
    let mut add = |name: &str, value: f64, lower: f64, upper: f64| set.add(name, value.clamp(lower, upper), lower, upper);
    match model {
        ModelKind::Parabola => {
            let mult = 10.0 * range / (span * span / 4.0);
            add("center", x_mid, x_min - span, x_max + span)?;
            add("mult", 0.1 * mult, -mult, mult)?;
        }
        ModelKind::Exponential => {
            let first = ys[0];
            let last = ys[ys.len() - 1];
            add("amplitude", first - last, -4.0 * range, 4.0 * range)?;
            add("rate", 1.0 / span, 0.0, 50.0 / span)?;
            add("offset", last, y_min - range, y_max + range)?;
        }
        ModelKind::Logistic => {
            add("capacity", y_max, 0.0, 4.0 * y_abs)?;
            add("rate", 4.0 / span, 0.0, 40.0 / span)?;
            add("midpoint", x_mid, x_min, x_max)?;
        }
    }
    Ok(set)
}

/// Apply `name=value[:lower:upper]` overrides to a parameter set.
///
/// Bounds given in an override replace the defaults as written.
pub fn apply_overrides(set: &ParameterSet, overrides: &[String]) -> Result<ParameterSet, FitError> {
    let mut parameters: Vec<_> = set.iter().cloned().collect();
    for raw in overrides {
        let (name, rest) = raw
            .split_once('=')
            .ok_or_else(|| FitError::InvalidConfig(format!("expected name=value[:lower:upper], got '{raw}'")))?;
        let name = name.trim();
        let slot = parameters
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| FitError::ParameterMismatch {
                missing: Vec::new(),
                extra: vec![name.to_string()],
            })?;
        let fields: Vec<&str> = rest.split(':').map(str::trim).collect();
        let number = |s: &str| {
            s.parse::<f64>()
                .map_err(|_| FitError::invalid_parameter(name, format!("'{s}' is not a number")))
        };
        let current = &parameters[slot];
        let (value, lower, upper) = match fields.as_slice() {
            [value] => (number(*value)?, current.lower(), current.upper()),
            [value, lower, upper] => (number(*value)?, number(*lower)?, number(*upper)?),
            _ => {
                return Err(FitError::InvalidConfig(format!(
                    "expected name=value[:lower:upper], got '{raw}'"
                )));
            }
        };
        parameters[slot] = Parameter::new(name, value, lower, upper)?;
    }
    ParameterSet::from_parameters(parameters)
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}
