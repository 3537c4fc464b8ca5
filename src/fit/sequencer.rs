//! Method sequencing and multi-start orchestration.
//!
//! A pass runs the method list left to right from one starting point:
//!
//! - every method gets a fresh `EvaluationTracker` and starts from the
//!   current working set
//! - when it returns normally, the tracker's best point (not the method's
//!   own final point) replaces the working set if it beats the champion
//! - when it fails, the failure is recorded and the working set is kept
//!
//! Restarts repeat the pass from alternative starting points (in parallel on
//! request) and keep the lowest champion, ties going to the lowest restart
//! index.

use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::domain::{BestResult, FitterMethod, MethodStatistics, ParameterSet, RestartPlan};
use crate::error::FitError;
use crate::fit::residual::ResidualFunction;
use crate::fit::restart::starting_points;
use crate::fit::tracker::EvaluationTracker;
use crate::minimize::{MethodRegistry, MinimizerReport};

/// A method that returned an error instead of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodFailure {
    pub method: String,
    pub reason: String,
}

/// Champion SSQ after each method of a pass (`None` until one is established).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChampionStep {
    pub method: String,
    pub sum_squares: Option<f64>,
}

/// Outcome of one restart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestartSummary {
    pub index: usize,
    pub start: ParameterSet,
    pub sum_squares: Option<f64>,
    pub error: Option<String>,
}

/// Result of a full fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitOutcome {
    pub parameters: ParameterSet,
    pub sum_squares: f64,
    /// Restart that produced the champion (0 is the initial set).
    pub restart_index: usize,
    pub restarts: Vec<RestartSummary>,
    /// Statistics of the champion restart, one entry per successful method.
    pub statistics: Vec<MethodStatistics>,
    pub method_failures: Vec<MethodFailure>,
    pub champion_trace: Vec<ChampionStep>,
    /// Report of the last successful method of the champion restart.
    pub minimizer_report: Option<MinimizerReport>,
    pub methods: Vec<String>,
    pub timing_collected: bool,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl FitOutcome {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.parameters.value(name)
    }
}

#[derive(Debug, Clone)]
struct PassResult {
    index: usize,
    start: ParameterSet,
    champion: Option<BestResult>,
    statistics: Vec<MethodStatistics>,
    failures: Vec<MethodFailure>,
    trace: Vec<ChampionStep>,
    report: Option<MinimizerReport>,
}

/// Fits a residual function with a sequence of methods, optionally from
/// several starting points.
pub struct Fitter<'f> {
    function: &'f dyn ResidualFunction,
    initial: ParameterSet,
    methods: Vec<FitterMethod>,
    restarts: RestartPlan,
    registry: MethodRegistry,
    collect_timing: bool,
    parallel: bool,
}

impl<'f> Fitter<'f> {
    pub fn new(function: &'f dyn ResidualFunction, initial: ParameterSet, methods: Vec<FitterMethod>) -> Self {
        Self {
            function,
            initial,
            methods,
            restarts: RestartPlan::None,
            registry: MethodRegistry::default(),
            collect_timing: false,
            parallel: false,
        }
    }

    pub fn with_restarts(mut self, plan: RestartPlan) -> Self {
        self.restarts = plan;
        self
    }

    pub fn with_registry(mut self, registry: MethodRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Record the wall-clock time of every evaluation.
    pub fn collect_timing(mut self, enabled: bool) -> Self {
        self.collect_timing = enabled;
        self
    }

    /// Run restarts on the rayon pool.
    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn methods(&self) -> &[FitterMethod] {
        &self.methods
    }

    pub fn execute(&self) -> Result<FitOutcome, FitError> {
        if self.methods.is_empty() {
            return Err(FitError::InvalidConfig("at least one method is required".to_string()));
        }
        if self.initial.is_empty() {
            return Err(FitError::InvalidConfig("at least one parameter is required".to_string()));
        }
        let started_at = Utc::now();
        let clock = Instant::now();
        let starts = starting_points(&self.initial, &self.restarts)?;
        info!(
            "fitting {} parameter(s) with [{}] from {} starting point(s)",
            self.initial.len(),
            self.method_names().join(", "),
            starts.len()
        );

        let passes: Vec<PassResult> = if self.parallel {
            starts
                .into_par_iter()
                .enumerate()
                .map(|(index, start)| self.run_pass(index, start))
                .collect()
        } else {
            starts
                .into_iter()
                .enumerate()
                .map(|(index, start)| self.run_pass(index, start))
                .collect()
        };

        // Deterministic reduction: minimum SSQ, ties broken by restart index.
        let mut winner: Option<&PassResult> = None;
        for pass in &passes {
            let Some(champion) = &pass.champion else {
                continue;
            };
            let better = winner
                .and_then(|w| w.champion.as_ref())
                .is_none_or(|best| champion.sum_squares < best.sum_squares);
            if better {
                winner = Some(pass);
            }
        }

        let restarts = passes.iter().map(summarize).collect();
        let Some(winner) = winner else {
            let failures = passes.iter().flat_map(|p| describe_failures(p, passes.len() > 1)).collect();
            return Err(FitError::FatalOptimizationFailure { failures });
        };
        let Some(champion) = winner.champion.clone() else {
            return Err(FitError::FatalOptimizationFailure { failures: Vec::new() });
        };

        let duration_secs = clock.elapsed().as_secs_f64();
        info!(
            "best sum of squares {:e} from restart {} in {duration_secs:.3}s",
            champion.sum_squares, winner.index
        );
        Ok(FitOutcome {
            parameters: champion.parameters,
            sum_squares: champion.sum_squares,
            restart_index: winner.index,
            restarts,
            statistics: winner.statistics.clone(),
            method_failures: winner.failures.clone(),
            champion_trace: winner.trace.clone(),
            minimizer_report: winner.report.clone(),
            methods: self.method_names(),
            timing_collected: self.collect_timing,
            started_at,
            duration_secs,
        })
    }

    fn method_names(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.method().to_string()).collect()
    }

    fn run_pass(&self, index: usize, start: ParameterSet) -> PassResult {
        let mut working = start.clone();
        let mut champion: Option<BestResult> = None;
        let mut statistics = Vec::new();
        let mut failures = Vec::new();
        let mut trace = Vec::with_capacity(self.methods.len());
        let mut report = None;

        for method in &self.methods {
            let name = method.method();
            let outcome = self.registry.get(name).and_then(|backend| {
                let mut tracker = EvaluationTracker::new(self.function, self.collect_timing);
                let result = backend.minimize(&mut tracker, &working, method.options())?;
                Ok((tracker.into_statistics(name), result))
            });

            match outcome {
                Ok(((best, stats), result)) => {
                    if let Some(best) = best {
                        let improves = champion.as_ref().is_none_or(|c| best.sum_squares < c.sum_squares);
                        if improves {
                            working = best.parameters.clone();
                            champion = Some(best);
                        }
                    }
                    statistics.push(stats);
                    report = Some(result);
                }
                Err(e) => {
                    warn!("restart {index}: method {name} failed: {e}");
                    failures.push(MethodFailure {
                        method: name.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
            trace.push(ChampionStep {
                method: name.to_string(),
                sum_squares: champion.as_ref().map(|c| c.sum_squares),
            });
        }

        if champion.is_none() {
            warn!("restart {index}: no method established a champion");
        }
        PassResult {
            index,
            start,
            champion,
            statistics,
            failures,
            trace,
            report,
        }
    }
}

fn summarize(pass: &PassResult) -> RestartSummary {
    RestartSummary {
        index: pass.index,
        start: pass.start.clone(),
        sum_squares: pass.champion.as_ref().map(|c| c.sum_squares),
        error: pass
            .champion
            .is_none()
            .then(|| describe_failures(pass, false).join("; ")),
    }
}

fn describe_failures(pass: &PassResult, with_restart: bool) -> Vec<String> {
    if pass.failures.is_empty() {
        let prefix = if with_restart {
            format!("restart {}: ", pass.index)
        } else {
            String::new()
        };
        return vec![format!("{prefix}no successful evaluation")];
    }
    pass.failures
        .iter()
        .map(|f| {
            if with_restart {
                format!("restart {}: {}: {}", pass.index, f.method, f.reason)
            } else {
                format!("{}: {}", f.method, f.reason)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{MethodOptions, SamplingStrategy};
    use crate::minimize::{Minimizer, Objective};

    /// Evaluates a fixed list of points and reports the last one as its answer.
    struct Scripted {
        points: Vec<f64>,
    }

    impl Minimizer for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn minimize(
            &self,
            objective: &mut dyn Objective,
            initial: &ParameterSet,
            _options: &MethodOptions,
        ) -> Result<MinimizerReport, FitError> {
            let mut last = initial.clone();
            for &x in &self.points {
                last = initial.with_values(&[x])?;
                let _ = objective.evaluate(&last);
            }
            Ok(MinimizerReport {
                method: "scripted".to_string(),
                terminal: last,
                nfev: self.points.len(),
                iterations: 1,
                converged: true,
                message: String::new(),
                native_report: "[[Fit Statistics]]\n    # fitting method   = scripted\n".to_string(),
            })
        }
    }

    struct Failing;

    impl Minimizer for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn minimize(
            &self,
            _objective: &mut dyn Objective,
            _initial: &ParameterSet,
            _options: &MethodOptions,
        ) -> Result<MinimizerReport, FitError> {
            Err(FitError::method_failure("failing", "always fails"))
        }
    }

    fn square(p: &ParameterSet) -> Result<Vec<f64>, FitError> {
        Ok(vec![p.value("x").unwrap_or(f64::NAN) - 3.0])
    }

    fn start() -> ParameterSet {
        let mut p = ParameterSet::new();
        p.add("x", 0.0, -10.0, 10.0).unwrap();
        p
    }

    fn registry() -> MethodRegistry {
        MethodRegistry::empty()
            .with("wander", Arc::new(Scripted { points: vec![2.0, 9.0] }))
            .with("near", Arc::new(Scripted { points: vec![3.5] }))
            .with("failing", Arc::new(Failing))
    }

    fn methods(names: &[&str]) -> Vec<FitterMethod> {
        FitterMethod::sequence(names, &MethodOptions::new(), Some(100))
    }

    #[test]
    fn tracker_best_replaces_the_minimizer_answer() {
        let f = square;
        let outcome = Fitter::new(&f, start(), methods(&["wander"]))
            .with_registry(registry())
            .execute()
            .unwrap();
        // The method ended at 9.0 but visited 2.0.
        assert_eq!(outcome.value("x"), Some(2.0));
        assert_eq!(outcome.sum_squares, 1.0);
        assert_eq!(outcome.minimizer_report.unwrap().terminal.value("x"), Some(9.0));
    }

    #[test]
    fn champion_never_regresses_across_methods() {
        let f = square;
        let outcome = Fitter::new(&f, start(), methods(&["near", "wander", "near"]))
            .with_registry(registry())
            .execute()
            .unwrap();
        let trace: Vec<f64> = outcome.champion_trace.iter().filter_map(|s| s.sum_squares).collect();
        assert_eq!(trace.len(), 3);
        assert!(trace.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(outcome.value("x"), Some(3.5));
        assert_eq!(outcome.statistics.len(), 3);
    }

    #[test]
    fn failed_methods_are_skipped() {
        let f = square;
        let outcome = Fitter::new(&f, start(), methods(&["failing", "near", "nonexistent"]))
            .with_registry(registry())
            .execute()
            .unwrap();
        assert_eq!(outcome.value("x"), Some(3.5));
        assert_eq!(outcome.statistics.len(), 1);
        assert_eq!(outcome.statistics[0].method, "near");
        let failed: Vec<&str> = outcome.method_failures.iter().map(|f| f.method.as_str()).collect();
        assert_eq!(failed, vec!["failing", "nonexistent"]);
        assert_eq!(outcome.champion_trace[0].sum_squares, None);
    }

    #[test]
    fn all_methods_failing_is_fatal() {
        let f = square;
        let result = Fitter::new(&f, start(), methods(&["failing", "failing"]))
            .with_registry(registry())
            .execute();
        match result {
            Err(FitError::FatalOptimizationFailure { failures }) => assert_eq!(failures.len(), 2),
            other => panic!("expected fatal failure, got {other:?}"),
        }
    }

    #[test]
    fn restarts_pick_the_lowest_champion_deterministically() {
        let f = square;
        let plan = RestartPlan::Sampled {
            count: 6,
            strategy: SamplingStrategy::LatinHypercube,
            seed: 5,
            jitter: true,
        };
        let serial = Fitter::new(&f, start(), methods(&["near"]))
            .with_registry(registry())
            .with_restarts(plan.clone())
            .execute()
            .unwrap();
        let parallel = Fitter::new(&f, start(), methods(&["near"]))
            .with_registry(registry())
            .with_restarts(plan)
            .parallel(true)
            .execute()
            .unwrap();
        assert_eq!(serial.restarts.len(), 7);
        assert_eq!(serial.restart_index, parallel.restart_index);
        assert_eq!(serial.parameters, parallel.parameters);
        // "near" always lands on 3.5, so every restart ties and restart 0 wins.
        assert_eq!(serial.restart_index, 0);
    }

    #[test]
    fn empty_method_list_is_a_config_error() {
        let f = square;
        let result = Fitter::new(&f, start(), Vec::new()).execute();
        assert!(matches!(result, Err(FitError::InvalidConfig(_))));
    }
}
