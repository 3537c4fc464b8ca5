//! Fitting methods: an opaque method name plus keyword options.
//!
//! Every `FitterMethod` carries a `max_nfev` bound unless it was built with
//! `FitterMethod::unbounded`, which is the only way to drop the bound.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Option key bounding the number of function evaluations of one method.
pub const MAX_NFEV: &str = "max_nfev";
/// Default for `MAX_NFEV` when the caller does not give one.
pub const MAX_NFEV_DEFAULT: usize = 1000;

pub const METHOD_LEASTSQ: &str = "leastsq";
pub const METHOD_DIFFERENTIAL_EVOLUTION: &str = "differential_evolution";

/// Method sequence used when the caller names none: global search, then polish.
pub const DEFAULT_METHODS: [&str; 2] = [METHOD_DIFFERENTIAL_EVOLUTION, METHOD_LEASTSQ];

/// A single keyword option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl OptionValue {
    /// Parse a CLI token: bool, then integer, then float, else text.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Text(raw.to_string())
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for OptionValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Keyword options passed through to a minimizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodOptions(BTreeMap<String, OptionValue>);

impl MethodOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<OptionValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    /// Parse `key=value` into an entry.
    pub fn insert_assignment(&mut self, assignment: &str) -> Result<(), FitError> {
        let Some((key, value)) = assignment.split_once('=') else {
            return Err(FitError::InvalidConfig(format!(
                "method option '{assignment}' must look like key=value"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(FitError::InvalidConfig(format!(
                "method option '{assignment}' has an empty key"
            )));
        }
        self.0.insert(key.to_string(), OptionValue::parse(value));
        Ok(())
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, FitError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(OptionValue::Float(v)) => Ok(Some(*v)),
            Some(OptionValue::Int(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(FitError::InvalidConfig(format!(
                "option '{key}' must be numeric, got '{other}'"
            ))),
        }
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, FitError> {
        let invalid = |v: &OptionValue| {
            FitError::InvalidConfig(format!(
                "option '{key}' must be a non-negative integer, got '{v}'"
            ))
        };
        match self.0.get(key) {
            None => Ok(None),
            Some(v @ OptionValue::Int(i)) => usize::try_from(*i).map(Some).map_err(|_| invalid(v)),
            Some(v @ OptionValue::Float(f)) if f.fract() == 0.0 && *f >= 0.0 => {
                usize::try_from(*f as u64).map(Some).map_err(|_| invalid(v))
            }
            Some(v) => Err(invalid(v)),
        }
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, FitError> {
        Ok(self.get_usize(key)?.map(|v| v as u64))
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, FitError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(OptionValue::Bool(v)) => Ok(Some(*v)),
            Some(other) => Err(FitError::InvalidConfig(format!(
                "option '{key}' must be true/false, got '{other}'"
            ))),
        }
    }

    /// The evaluation bound, if any.
    pub fn max_nfev(&self) -> Result<Option<usize>, FitError> {
        self.get_usize(MAX_NFEV)
    }
}

impl fmt::Display for MethodOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// A method name and its options. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitterMethod {
    method: String,
    options: MethodOptions,
}

impl FitterMethod {
    /// Build a method, inserting `max_nfev = MAX_NFEV_DEFAULT` when absent.
    pub fn new(method: &str, mut options: MethodOptions) -> Self {
        if !options.contains(MAX_NFEV) {
            options.insert(MAX_NFEV, MAX_NFEV_DEFAULT);
        }
        Self {
            method: method.to_string(),
            options,
        }
    }

    /// Build a method without an evaluation bound (explicit opt-out).
    pub fn unbounded(method: &str, mut options: MethodOptions) -> Self {
        let _ = options.remove(MAX_NFEV);
        Self {
            method: method.to_string(),
            options,
        }
    }

    /// Build one method per name, all sharing `options`.
    ///
    /// - empty `names` selects `DEFAULT_METHODS`
    /// - `max_nfev = Some(n)` fills in the bound where `options` has none
    /// - `max_nfev = None` removes the bound from every method
    pub fn sequence(names: &[&str], options: &MethodOptions, max_nfev: Option<usize>) -> Vec<Self> {
        let names: Vec<&str> = if names.is_empty() {
            DEFAULT_METHODS.to_vec()
        } else {
            names.to_vec()
        };
        names
            .into_iter()
            .map(|name| match max_nfev {
                Some(n) => {
                    let mut opts = options.clone();
                    if !opts.contains(MAX_NFEV) {
                        opts.insert(MAX_NFEV, n);
                    }
                    Self::new(name, opts)
                }
                None => Self::unbounded(name, options.clone()),
            })
            .collect()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn options(&self) -> &MethodOptions {
        &self.options
    }

    pub fn is_bounded(&self) -> bool {
        self.options.contains(MAX_NFEV)
    }
}

impl fmt::Display for FitterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.method, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_bounded(methods: &[FitterMethod]) {
        for m in methods {
            assert!(!m.method().is_empty());
            assert!(m.options().contains(MAX_NFEV), "{m} lacks max_nfev");
        }
    }

    #[test]
    fn sequence_always_carries_max_nfev() {
        let none = MethodOptions::new();
        assert_bounded(&FitterMethod::sequence(&[], &none, Some(MAX_NFEV_DEFAULT)));
        assert_bounded(&FitterMethod::sequence(&["aa"], &none, Some(MAX_NFEV_DEFAULT)));
        assert_bounded(&FitterMethod::sequence(&["aa", "bb"], &none, Some(MAX_NFEV_DEFAULT)));
        let ten = MethodOptions::new().with(MAX_NFEV, 10usize);
        let methods = FitterMethod::sequence(&["aa", "bb"], &ten, Some(MAX_NFEV_DEFAULT));
        assert_bounded(&methods);
        assert_eq!(methods[1].options().max_nfev().unwrap(), Some(10));
    }

    #[test]
    fn default_sequence_is_global_then_local() {
        let methods = FitterMethod::sequence(&[], &MethodOptions::new(), Some(50));
        let names: Vec<&str> = methods.iter().map(|m| m.method()).collect();
        assert_eq!(names, DEFAULT_METHODS.to_vec());
    }

    #[test]
    fn unbounded_is_an_explicit_opt_out() {
        let opts = MethodOptions::new().with(MAX_NFEV, 5usize);
        let methods = FitterMethod::sequence(&["leastsq"], &opts, None);
        assert!(!methods[0].is_bounded());
        assert!(FitterMethod::new("leastsq", MethodOptions::new()).is_bounded());
    }

    #[test]
    fn option_getters_validate_types() {
        let mut opts = MethodOptions::new();
        opts.insert_assignment("popsize=20").unwrap();
        opts.insert_assignment("tol = 0.5").unwrap();
        opts.insert_assignment("polish=false").unwrap();
        assert_eq!(opts.get_usize("popsize").unwrap(), Some(20));
        assert_eq!(opts.get_f64("tol").unwrap(), Some(0.5));
        assert_eq!(opts.get_bool("polish").unwrap(), Some(false));
        assert!(opts.get_usize("tol").is_err());
        assert!(opts.insert_assignment("novalue").is_err());
        assert_eq!(opts.get_f64("missing").unwrap(), None);
    }
}
