//! Reporting utilities: the text report, statistics tables, and the figures
//! the plots are drawn from.

pub mod format;

pub use format::*;

use serde::Serialize;

use crate::domain::MethodStatistics;
use crate::error::FitError;
use crate::fit::FitOutcome;

/// Wall-clock cost of one method's evaluations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRow {
    pub method: String,
    pub total_secs: f64,
    pub count: usize,
    pub average_secs: f64,
}

/// Per-method total time, evaluation count, and mean time per evaluation.
///
/// Needs timing collection; fails with `StatisticsNotCollected` otherwise.
pub fn performance_summary(outcome: &FitOutcome) -> Result<Vec<PerformanceRow>, FitError> {
    if !outcome.timing_collected {
        return Err(FitError::StatisticsNotCollected("performance statistics"));
    }
    Ok(outcome
        .statistics
        .iter()
        .map(|s| PerformanceRow {
            method: s.method.clone(),
            total_secs: s.total_duration(),
            count: s.durations.len(),
            average_secs: s.mean_duration().unwrap_or(0.0),
        })
        .collect())
}

/// Upper y-limit for one method's SSQ panel: `10 * max(0.1, min SSQ)`.
pub fn quality_cap(stats: &MethodStatistics) -> f64 {
    match stats.min_sum_squares() {
        Some(min) if min.is_finite() => 10.0 * min.max(0.1),
        _ => 1.0,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::ParameterSet;
    use crate::fit::{ChampionStep, MethodFailure, RestartSummary};
    use crate::minimize::MinimizerReport;

    pub(crate) fn outcome(timed: bool) -> FitOutcome {
        let mut parameters = ParameterSet::new();
        parameters.add("center", 10.0, 0.0, 100.0).unwrap();
        parameters.add("mult", 2.0, 0.0, 100.0).unwrap();
        let durations = |v: Vec<f64>| if timed { v } else { Vec::new() };
        FitOutcome {
            parameters: parameters.clone(),
            sum_squares: 0.02,
            restart_index: 0,
            restarts: vec![RestartSummary {
                index: 0,
                start: parameters.clone(),
                sum_squares: Some(0.02),
                error: None,
            }],
            statistics: vec![
                MethodStatistics {
                    method: "differential_evolution".to_string(),
                    durations: durations(vec![0.25, 0.75]),
                    sum_squares: vec![50.0, 3.0],
                    failed_evaluations: 0,
                },
                MethodStatistics {
                    method: "leastsq".to_string(),
                    durations: durations(vec![0.5]),
                    sum_squares: vec![0.02],
                    failed_evaluations: 1,
                },
            ],
            method_failures: vec![MethodFailure {
                method: "bogus".to_string(),
                reason: "unknown".to_string(),
            }],
            champion_trace: vec![
                ChampionStep {
                    method: "differential_evolution".to_string(),
                    sum_squares: Some(3.0),
                },
                ChampionStep {
                    method: "leastsq".to_string(),
                    sum_squares: Some(0.02),
                },
            ],
            minimizer_report: Some(MinimizerReport {
                method: "leastsq".to_string(),
                terminal: parameters,
                nfev: 12,
                iterations: 3,
                converged: true,
                message: String::new(),
                native_report: "[[Fit Statistics]]\n    # fitting method   = leastsq\n[[Variables]]\n    native-variable: 1\n"
                    .to_string(),
            }),
            methods: vec!["differential_evolution".to_string(), "leastsq".to_string()],
            timing_collected: timed,
            started_at: Utc::now(),
            duration_secs: 1.5,
        }
    }

    #[test]
    fn performance_needs_timing() {
        assert!(matches!(
            performance_summary(&outcome(false)),
            Err(FitError::StatisticsNotCollected(_))
        ));
        let rows = performance_summary(&outcome(true)).unwrap();
        assert_eq!(rows[0].count, 2);
        assert!((rows[0].total_secs - 1.0).abs() < 1e-12);
        assert!((rows[0].average_secs - 0.5).abs() < 1e-12);
    }

    #[test]
    fn quality_cap_follows_each_method() {
        let outcome = outcome(false);
        let caps: Vec<f64> = outcome.statistics.iter().map(quality_cap).collect();
        assert!((caps[0] - 30.0).abs() < 1e-12);
        // min SSQ 0.02 is below the 0.1 floor.
        assert!((caps[1] - 1.0).abs() < 1e-12);
        assert_eq!(quality_cap(&MethodStatistics::default()), 1.0);
    }
}
