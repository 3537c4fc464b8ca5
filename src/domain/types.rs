//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - produced during fitting
//! - exported to JSON/CSV
//! - rendered by the report and plot collaborators

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::params::ParameterSet;

/// One call of the wrapped residual function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRecord {
    pub residuals: Vec<f64>,
    pub sum_squares: f64,
    /// Wall-clock time of the call, when timing is collected.
    pub duration_secs: Option<f64>,
}

/// Lowest-SSQ point seen by one evaluation tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestResult {
    pub parameters: ParameterSet,
    pub sum_squares: f64,
}

/// Per-method statistics collected by an evaluation tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MethodStatistics {
    pub method: String,
    /// Seconds per successful evaluation (empty unless timing was collected).
    pub durations: Vec<f64>,
    /// SSQ of each successful evaluation, in call order.
    pub sum_squares: Vec<f64>,
    /// Evaluations rejected by the function or by residual validation.
    pub failed_evaluations: usize,
}

impl MethodStatistics {
    pub fn evaluations(&self) -> usize {
        self.sum_squares.len()
    }

    pub fn total_duration(&self) -> f64 {
        self.durations.iter().sum()
    }

    pub fn mean_duration(&self) -> Option<f64> {
        if self.durations.is_empty() {
            None
        } else {
            Some(self.total_duration() / self.durations.len() as f64)
        }
    }

    pub fn min_sum_squares(&self) -> Option<f64> {
        self.sum_squares.iter().copied().reduce(f64::min)
    }
}

/// How restart starting points are drawn within parameter bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SamplingStrategy {
    /// Independent uniform draws per parameter.
    Random,
    /// One stratum per restart and parameter, strata permuted per parameter.
    LatinHypercube,
}

/// Which starting points a fit runs the method sequence from.
///
/// The initial parameter set is always restart 0; the plan only adds
/// alternatives.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RestartPlan {
    #[default]
    None,
    Sampled {
        count: usize,
        strategy: SamplingStrategy,
        seed: u64,
        /// Jitter within a stratum (Latin hypercube only); stratum centres otherwise.
        jitter: bool,
    },
    Explicit(Vec<ParameterSet>),
}

/// Which built-in model the CLI fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// `mult * (x - center)^2`
    Parabola,
    /// `amplitude * exp(-rate * x) + offset`
    Exponential,
    /// `capacity / (1 + exp(-rate * (x - midpoint)))`
    Logistic,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Reference CSV (`None` runs the built-in demo data).
    pub data_path: Option<PathBuf>,
    pub model: ModelKind,
    /// `name=value:lower:upper` overrides of the model defaults.
    pub param_overrides: Vec<String>,

    pub methods: Vec<String>,
    /// `key=value` options applied to every method.
    pub method_options: Vec<String>,
    /// `None` disables the evaluation bound.
    pub max_nfev: Option<usize>,

    pub restarts: usize,
    pub sampling: SamplingStrategy,
    pub seed: u64,
    pub jitter: bool,
    pub parallel: bool,

    /// Demo data: standard deviation of Gaussian noise added to the curve.
    pub noise: f64,

    pub collect_stats: bool,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_summary: Option<PathBuf>,
    pub export_stats: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_summaries() {
        let stats = MethodStatistics {
            method: "leastsq".to_string(),
            durations: vec![0.5, 1.5],
            sum_squares: vec![4.0, 1.0, 2.0],
            failed_evaluations: 0,
        };
        assert_eq!(stats.evaluations(), 3);
        assert_eq!(stats.total_duration(), 2.0);
        assert_eq!(stats.mean_duration(), Some(1.0));
        assert_eq!(stats.min_sum_squares(), Some(1.0));
        assert_eq!(MethodStatistics::default().mean_duration(), None);
    }
}
