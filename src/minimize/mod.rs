//! The minimizer contract and the built-in backends.
//!
//! The orchestrator only relies on the narrow contract defined here:
//!
//! - a `Minimizer` receives an `Objective`, a starting `ParameterSet`, and the
//!   method's keyword options
//! - it calls `Objective::evaluate` as often as it likes (within `max_nfev`)
//! - it returns a `MinimizerReport` whose terminal point is informational only
//!
//! Method names are opaque strings resolved through a `MethodRegistry`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::{METHOD_DIFFERENTIAL_EVOLUTION, METHOD_LEASTSQ, MethodOptions, ParameterSet};
use crate::error::FitError;

pub mod evolution;
pub mod levenberg;
pub mod native_report;

pub use evolution::DifferentialEvolution;
pub use levenberg::LevenbergMarquardt;

/// Something a minimizer can evaluate: parameters in, residual vector out.
pub trait Objective {
    fn evaluate(&mut self, parameters: &ParameterSet) -> Result<Vec<f64>, FitError>;
}

/// What a minimizer reports when it returns normally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinimizerReport {
    pub method: String,
    /// The backend's own final point. Not trusted by the orchestrator.
    pub terminal: ParameterSet,
    /// Objective calls made, including rejected ones.
    pub nfev: usize,
    pub iterations: usize,
    pub converged: bool,
    pub message: String,
    /// Backend-formatted report text (`[[Fit Statistics]]`, `[[Variables]]`, ...).
    pub native_report: String,
}

/// An optimization backend.
pub trait Minimizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn minimize(
        &self,
        objective: &mut dyn Objective,
        initial: &ParameterSet,
        options: &MethodOptions,
    ) -> Result<MinimizerReport, FitError>;
}

/// Method name -> backend lookup.
#[derive(Clone)]
pub struct MethodRegistry {
    backends: BTreeMap<String, Arc<dyn Minimizer>>,
}

impl MethodRegistry {
    pub fn empty() -> Self {
        Self {
            backends: BTreeMap::new(),
        }
    }

    /// Register (or replace) a backend under `name`.
    pub fn with(mut self, name: &str, backend: Arc<dyn Minimizer>) -> Self {
        self.backends.insert(name.to_string(), backend);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Minimizer>, FitError> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| FitError::UnknownMethod(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::empty()
            .with(METHOD_LEASTSQ, Arc::new(LevenbergMarquardt))
            .with(METHOD_DIFFERENTIAL_EVOLUTION, Arc::new(DifferentialEvolution))
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.names())
            .finish()
    }
}

/// Counts objective calls against an optional `max_nfev`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EvaluationBudget {
    limit: usize,
    used: usize,
}

impl EvaluationBudget {
    /// `max_nfev` from the options, else `fallback` (backends always stop somewhere).
    pub(crate) fn from_options(options: &MethodOptions, fallback: usize) -> Result<Self, FitError> {
        let limit = options.max_nfev()?.unwrap_or(fallback);
        if limit == 0 {
            return Err(FitError::InvalidConfig("max_nfev must be > 0".to_string()));
        }
        Ok(Self { limit, used: 0 })
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.used >= self.limit
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }

    /// Evaluate through the budget; `None` when no calls are left.
    pub(crate) fn evaluate(
        &mut self,
        objective: &mut dyn Objective,
        parameters: &ParameterSet,
    ) -> Option<Result<Vec<f64>, FitError>> {
        if self.exhausted() {
            return None;
        }
        self.used += 1;
        Some(objective.evaluate(parameters))
    }
}
