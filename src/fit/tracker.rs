//! Best-ever tracking around a residual function.
//!
//! A minimizer may stop holding parameters worse than ones it visited on
//! the way. The tracker sits between the minimizer and the user function
//! and keeps the lowest-SSQ point it has seen, so the orchestrator never
//! has to trust the minimizer's final answer.

use std::time::Instant;

use log::{debug, trace};

use crate::domain::{BestResult, EvaluationRecord, MethodStatistics, ParameterSet};
use crate::error::FitError;
use crate::fit::residual::ResidualFunction;
use crate::math::{first_non_finite, sum_squares};
use crate::minimize::Objective;

/// One method's view of the residual function.
pub struct EvaluationTracker<'f> {
    function: &'f dyn ResidualFunction,
    collect_timing: bool,
    best: Option<BestResult>,
    sum_squares: Vec<f64>,
    durations: Vec<f64>,
    failed: usize,
}

impl<'f> EvaluationTracker<'f> {
    pub fn new(function: &'f dyn ResidualFunction, collect_timing: bool) -> Self {
        Self {
            function,
            collect_timing,
            best: None,
            sum_squares: Vec::new(),
            durations: Vec::new(),
            failed: 0,
        }
    }

    /// Call the function and record the outcome.
    ///
    /// Failed calls, residuals with `NaN`/`Inf` or no components, and
    /// residuals whose sum of squares overflows are returned as errors; they
    /// record nothing except the failure count.
    pub fn evaluate(&mut self, parameters: &ParameterSet) -> Result<Vec<f64>, FitError> {
        let started = self.collect_timing.then(Instant::now);
        let record = match self.function.residuals(parameters).and_then(validate) {
            Ok(residuals) => EvaluationRecord {
                sum_squares: sum_squares(&residuals),
                residuals,
                duration_secs: started.map(|t| t.elapsed().as_secs_f64()),
            },
            Err(e) => return Err(self.reject(e)),
        };
        if !record.sum_squares.is_finite() {
            return Err(self.reject(FitError::NonFiniteSumSquares));
        }
        self.record(parameters, &record);
        Ok(record.residuals)
    }

    fn reject(&mut self, error: FitError) -> FitError {
        self.failed += 1;
        trace!("evaluation failed: {error}");
        error
    }

    fn record(&mut self, parameters: &ParameterSet, record: &EvaluationRecord) {
        let ssq = record.sum_squares;
        self.sum_squares.push(ssq);
        if let Some(d) = record.duration_secs {
            self.durations.push(d);
        }
        if self.best.as_ref().is_none_or(|b| ssq < b.sum_squares) {
            debug!("new best sum of squares {ssq:e}");
            self.best = Some(BestResult {
                parameters: parameters.clone(),
                sum_squares: ssq,
            });
        }
    }

    pub fn best(&self) -> Option<&BestResult> {
        self.best.as_ref()
    }

    pub fn best_sum_squares(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.sum_squares)
    }

    /// SSQ of every successful evaluation, in call order.
    pub fn history(&self) -> &[f64] {
        &self.sum_squares
    }

    pub fn evaluations(&self) -> usize {
        self.sum_squares.len()
    }

    pub fn failed_evaluations(&self) -> usize {
        self.failed
    }

    /// Consume the tracker into its best point and its statistics.
    pub fn into_statistics(self, method: &str) -> (Option<BestResult>, MethodStatistics) {
        let stats = MethodStatistics {
            method: method.to_string(),
            durations: self.durations,
            sum_squares: self.sum_squares,
            failed_evaluations: self.failed,
        };
        (self.best, stats)
    }
}

impl Objective for EvaluationTracker<'_> {
    fn evaluate(&mut self, parameters: &ParameterSet) -> Result<Vec<f64>, FitError> {
        EvaluationTracker::evaluate(self, parameters)
    }
}

fn validate(residuals: Vec<f64>) -> Result<Vec<f64>, FitError> {
    if residuals.is_empty() {
        return Err(FitError::EmptyResiduals);
    }
    if let Some(index) = first_non_finite(&residuals) {
        return Err(FitError::NonFiniteResidual { index });
    }
    Ok(residuals)
}
