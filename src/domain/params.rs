//! Bounded parameters and ordered parameter sets.
//!
//! A `ParameterSet` is a value: every update produces a new set, so a
//! starting point or a best-so-far snapshot can never be aliased by a later
//! pass. Insertion order is the order used when flattening to `Vec<f64>`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::FitError;

/// Parameter values keyed by name (the call contract of user functions).
pub type ParameterValues = BTreeMap<String, f64>;

/// A named value with inclusive bounds `lower <= value <= upper`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    name: String,
    value: f64,
    lower: f64,
    upper: f64,
}

impl Parameter {
    /// Create a parameter; bounds may be infinite, the value must be finite.
    pub fn new(name: impl Into<String>, value: f64, lower: f64, upper: f64) -> Result<Self, FitError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FitError::invalid_parameter(&name, "name must not be empty"));
        }
        if lower.is_nan() || upper.is_nan() {
            return Err(FitError::invalid_parameter(&name, "bounds must not be NaN"));
        }
        if lower > upper {
            return Err(FitError::invalid_parameter(
                &name,
                format!("lower bound {lower} exceeds upper bound {upper}"),
            ));
        }
        if !value.is_finite() {
            return Err(FitError::invalid_parameter(&name, format!("value {value} is not finite")));
        }
        if value < lower || value > upper {
            return Err(FitError::invalid_parameter(
                &name,
                format!("value {value} outside bounds [{lower}, {upper}]"),
            ));
        }
        Ok(Self {
            name,
            value,
            lower,
            upper,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Width of the bound interval (`inf` for half-open or open bounds).
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn has_finite_bounds(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite()
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Copy with a new value clamped into the bounds.
    pub fn clamped(&self, value: f64) -> Result<Self, FitError> {
        if !value.is_finite() {
            return Err(FitError::invalid_parameter(&self.name, format!("value {value} is not finite")));
        }
        Ok(Self {
            value: value.clamp(self.lower, self.upper),
            ..self.clone()
        })
    }

    /// Lower the lower bound to `lower`; never narrows.
    pub fn update_lower(&mut self, lower: f64) {
        self.lower = self.lower.min(lower);
    }

    /// Raise the upper bound to `upper`; never narrows.
    pub fn update_upper(&mut self, upper: f64) {
        self.upper = self.upper.max(upper);
    }
}

/// Ordered collection of uniquely-named parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parameters(parameters: impl IntoIterator<Item = Parameter>) -> Result<Self, FitError> {
        let mut set = Self::new();
        for p in parameters {
            set.push(p)?;
        }
        Ok(set)
    }

    /// Build a set from rough estimates.
    ///
    /// Each estimate `e` gets bounds `[min(0, 2e), max(0, 2e)]` (`[-1, 1]` when
    /// `e == 0`) and the starting value `e * value_frac`, clamped into bounds.
    pub fn from_estimates<'a>(
        estimates: impl IntoIterator<Item = (&'a str, f64)>,
        value_frac: f64,
    ) -> Result<Self, FitError> {
        let mut set = Self::new();
        for (name, estimate) in estimates {
            if !estimate.is_finite() {
                return Err(FitError::invalid_parameter(name, "estimate is not finite"));
            }
            let (lower, upper) = if estimate == 0.0 {
                (-1.0, 1.0)
            } else {
                let twice = 2.0 * estimate;
                (twice.min(0.0), twice.max(0.0))
            };
            let value = (estimate * value_frac).clamp(lower, upper);
            set.add(name, value, lower, upper)?;
        }
        Ok(set)
    }

    pub fn push(&mut self, parameter: Parameter) -> Result<(), FitError> {
        if self.get(parameter.name()).is_some() {
            return Err(FitError::DuplicateParameter(parameter.name().to_string()));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    pub fn add(&mut self, name: &str, value: f64, lower: f64, upper: f64) -> Result<(), FitError> {
        self.push(Parameter::new(name, value, lower, upper)?)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.parameters.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(Parameter::value)
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value).collect()
    }

    pub fn lower_bounds(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.lower).collect()
    }

    pub fn upper_bounds(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.upper).collect()
    }

    pub fn values_by_name(&self) -> ParameterValues {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.value))
            .collect()
    }

    /// Copy with values replaced positionally (clamped into bounds).
    pub fn with_values(&self, values: &[f64]) -> Result<Self, FitError> {
        if values.len() != self.len() {
            return Err(FitError::InvalidConfig(format!(
                "expected {} parameter values, got {}",
                self.len(),
                values.len()
            )));
        }
        let parameters = self
            .parameters
            .iter()
            .zip(values)
            .map(|(p, &v)| p.clamped(v))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parameters })
    }

    /// Copy with the named values replaced; names not in the set are rejected.
    pub fn with_updates(&self, updates: &ParameterValues) -> Result<Self, FitError> {
        let extra: Vec<String> = updates
            .keys()
            .filter(|name| self.get(name).is_none())
            .cloned()
            .collect();
        if !extra.is_empty() {
            return Err(FitError::ParameterMismatch {
                missing: Vec::new(),
                extra,
            });
        }
        let parameters = self
            .parameters
            .iter()
            .map(|p| match updates.get(&p.name) {
                Some(&v) => p.clamped(v),
                None => Ok(p.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parameters })
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOWER: f64 = 1.0;
    const UPPER: f64 = 11.0;
    const VALUE: f64 = 5.0;

    fn parameter() -> Parameter {
        Parameter::new("parameter", VALUE, LOWER, UPPER).unwrap()
    }

    #[test]
    fn constructor_keeps_fields() {
        let p = parameter();
        assert_eq!(p.name(), "parameter");
        assert_eq!(p.value(), VALUE);
        assert_eq!(p.lower(), LOWER);
        assert_eq!(p.upper(), UPPER);
    }

    #[test]
    fn constructor_rejects_out_of_bounds_and_inverted_bounds() {
        assert!(Parameter::new("a", 20.0, 0.0, 10.0).is_err());
        assert!(Parameter::new("a", 1.0, 10.0, 0.0).is_err());
        assert!(Parameter::new("a", f64::NAN, 0.0, 10.0).is_err());
        assert!(Parameter::new("", 1.0, 0.0, 10.0).is_err());
        assert!(Parameter::new("a", 1.0, f64::NEG_INFINITY, f64::INFINITY).is_ok());
    }

    #[test]
    fn update_lower_only_widens() {
        let mut p = parameter();
        p.update_lower(LOWER - 1.0);
        assert_eq!(p.lower(), LOWER - 1.0);

        let mut p = parameter();
        p.update_lower(LOWER + 1.0);
        assert_eq!(p.lower(), LOWER);
    }

    #[test]
    fn update_upper_only_widens() {
        let mut p = parameter();
        p.update_upper(UPPER - 1.0);
        assert_eq!(p.upper(), UPPER);

        let mut p = parameter();
        p.update_upper(UPPER + 1.0);
        assert_eq!(p.upper(), UPPER + 1.0);
    }

    #[test]
    fn clamped_respects_bounds() {
        let p = parameter();
        assert_eq!(p.clamped(100.0).unwrap().value(), UPPER);
        assert_eq!(p.clamped(-100.0).unwrap().value(), LOWER);
        assert!(p.clamped(f64::INFINITY).is_err());
    }

    #[test]
    fn set_preserves_insertion_order_and_rejects_duplicates() {
        let mut set = ParameterSet::new();
        set.add("b", 1.0, 0.0, 2.0).unwrap();
        set.add("a", 1.5, 0.0, 2.0).unwrap();
        assert_eq!(set.names(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(set.values(), vec![1.0, 1.5]);
        assert!(matches!(
            set.add("a", 1.0, 0.0, 2.0),
            Err(FitError::DuplicateParameter(_))
        ));
    }

    #[test]
    fn with_values_copies_instead_of_aliasing() {
        let mut set = ParameterSet::new();
        set.add("x", 1.0, 0.0, 10.0).unwrap();
        set.add("y", 2.0, 0.0, 10.0).unwrap();

        let moved = set.with_values(&[3.0, 42.0]).unwrap();
        assert_eq!(moved.values(), vec![3.0, 10.0]);
        assert_eq!(set.values(), vec![1.0, 2.0]);
        assert!(set.with_values(&[1.0]).is_err());
    }

    #[test]
    fn with_updates_rejects_unknown_names() {
        let mut set = ParameterSet::new();
        set.add("x", 1.0, 0.0, 10.0).unwrap();
        let mut updates = ParameterValues::new();
        updates.insert("x".to_string(), 4.0);
        assert_eq!(set.with_updates(&updates).unwrap().value("x"), Some(4.0));

        updates.insert("z".to_string(), 1.0);
        match set.with_updates(&updates) {
            Err(FitError::ParameterMismatch { extra, .. }) => assert_eq!(extra, vec!["z".to_string()]),
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn from_estimates_scales_values() {
        let set = ParameterSet::from_estimates([("a", 3.0), ("b", 4.0)], 0.5).unwrap();
        assert!((set.value("a").unwrap() - 1.5).abs() < 1e-12);
        assert!((set.value("b").unwrap() - 2.0).abs() < 1e-12);
        let a = set.get("a").unwrap();
        assert_eq!((a.lower(), a.upper()), (0.0, 6.0));

        let zero = ParameterSet::from_estimates([("c", 0.0)], 1.0).unwrap();
        assert_eq!(zero.get("c").unwrap().lower(), -1.0);
    }
}
