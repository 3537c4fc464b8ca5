//! Export fit results.
//!
//! - a JSON summary of the outcome (`write_summary_json`)
//! - a long-format CSV of per-evaluation statistics (`write_statistics_csv`)

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{MethodStatistics, Parameter};
use crate::error::FitError;
use crate::fit::{ChampionStep, FitOutcome, MethodFailure, RestartSummary};

/// Per-method figures without the per-evaluation vectors.
#[derive(Debug, Clone, Serialize)]
pub struct MethodSummary {
    pub method: String,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    pub min_sum_squares: Option<f64>,
    pub total_duration_secs: Option<f64>,
}

impl From<&MethodStatistics> for MethodSummary {
    fn from(stats: &MethodStatistics) -> Self {
        Self {
            method: stats.method.clone(),
            evaluations: stats.evaluations(),
            failed_evaluations: stats.failed_evaluations,
            min_sum_squares: stats.min_sum_squares(),
            total_duration_secs: (!stats.durations.is_empty()).then(|| stats.total_duration()),
        }
    }
}

/// Schema of the JSON summary file.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryFile<'a> {
    pub tool: &'static str,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub methods: &'a [String],
    pub sum_squares: f64,
    pub restart_index: usize,
    pub parameters: Vec<&'a Parameter>,
    pub champion_trace: &'a [ChampionStep],
    pub method_failures: &'a [MethodFailure],
    pub statistics: Vec<MethodSummary>,
    pub restarts: &'a [RestartSummary],
}

impl<'a> SummaryFile<'a> {
    pub fn new(outcome: &'a FitOutcome) -> Self {
        Self {
            tool: "fitterpp",
            version: env!("CARGO_PKG_VERSION"),
            started_at: outcome.started_at,
            duration_secs: outcome.duration_secs,
            methods: &outcome.methods,
            sum_squares: outcome.sum_squares,
            restart_index: outcome.restart_index,
            parameters: outcome.parameters.iter().collect(),
            champion_trace: &outcome.champion_trace,
            method_failures: &outcome.method_failures,
            statistics: outcome.statistics.iter().map(MethodSummary::from).collect(),
            restarts: &outcome.restarts,
        }
    }
}

pub fn write_summary_json(path: &Path, outcome: &FitOutcome) -> Result<(), FitError> {
    let file = File::create(path)
        .map_err(|e| FitError::Io(format!("failed to create summary JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, &SummaryFile::new(outcome))
        .map_err(|e| FitError::Io(format!("failed to write summary JSON: {e}")))
}

/// One row per successful evaluation: `method,evaluation,sum_squares,duration_secs`.
pub fn write_statistics_csv(path: &Path, statistics: &[MethodStatistics]) -> Result<(), FitError> {
    let file = File::create(path)
        .map_err(|e| FitError::Io(format!("failed to create statistics CSV '{}': {e}", path.display())))?;
    write_statistics(file, statistics)
}

pub fn write_statistics<W: Write>(sink: W, statistics: &[MethodStatistics]) -> Result<(), FitError> {
    let mut writer = csv::Writer::from_writer(sink);
    let csv_err = |e: csv::Error| FitError::Io(format!("failed to write statistics CSV: {e}"));
    writer
        .write_record(["method", "evaluation", "sum_squares", "duration_secs"])
        .map_err(csv_err)?;
    for stats in statistics {
        for (i, ssq) in stats.sum_squares.iter().enumerate() {
            let duration = stats.durations.get(i).map(|d| format!("{d:.9}")).unwrap_or_default();
            writer
                .write_record([stats.method.as_str(), &(i + 1).to_string(), &format!("{ssq:e}"), &duration])
                .map_err(csv_err)?;
        }
    }
    writer.flush().map_err(FitError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> Vec<MethodStatistics> {
        vec![
            MethodStatistics {
                method: "differential_evolution".to_string(),
                durations: vec![0.5, 0.25],
                sum_squares: vec![4.0, 1.0],
                failed_evaluations: 0,
            },
            MethodStatistics {
                method: "leastsq".to_string(),
                durations: Vec::new(),
                sum_squares: vec![0.5],
                failed_evaluations: 2,
            },
        ]
    }

    #[test]
    fn statistics_csv_is_long_format() {
        let mut buf = Vec::new();
        write_statistics(&mut buf, &stats()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "method,evaluation,sum_squares,duration_secs");
        assert_eq!(lines[1], "differential_evolution,1,4e0,0.500000000");
        assert_eq!(lines[3], "leastsq,1,5e-1,");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn method_summary_omits_missing_timing() {
        let s = stats();
        let timed = MethodSummary::from(&s[0]);
        assert_eq!(timed.total_duration_secs, Some(0.75));
        assert_eq!(timed.min_sum_squares, Some(1.0));
        let untimed = MethodSummary::from(&s[1]);
        assert_eq!(untimed.total_duration_secs, None);
        assert_eq!(untimed.failed_evaluations, 2);
    }
}
