//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use crate::error::FitError;
use crate::fit::FitOutcome;
use crate::math::relative_error;
use crate::minimize::native_report::strip_section;
use crate::report::PerformanceRow;

const VARIABLES_HEADER: &str = "[[Variables]]";

/// Champion values followed by the last minimizer's native report.
///
/// The native `[[Variables]]` section is replaced by one built from the
/// champion, since the minimizer's own final point is not trusted.
pub fn format_report(outcome: Option<&FitOutcome>) -> Result<String, FitError> {
    let outcome = outcome.ok_or_else(|| FitError::InvalidConfig("must execute before report".to_string()))?;

    let mut out = String::new();
    out.push_str(VARIABLES_HEADER);
    out.push('\n');
    let width = outcome.parameters.iter().map(|p| p.name().len()).max().unwrap_or(0) + 1;
    for p in &outcome.parameters {
        let label = format!("{}:", p.name());
        out.push_str(&format!(
            "    {label:<width$} {:.8} (bounds = [{}, {}])\n",
            p.value(),
            p.lower(),
            p.upper()
        ));
    }
    if let Some(report) = &outcome.minimizer_report {
        out.push_str(&strip_section(&report.native_report, VARIABLES_HEADER));
    }
    Ok(out)
}

/// Run header: methods, restarts, champion, timing and failures.
pub fn format_run_summary(outcome: &FitOutcome) -> String {
    let mut out = String::new();
    out.push_str("=== fitterpp ===\n");
    out.push_str(&format!("Started: {}\n", outcome.started_at.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!("Methods: {}\n", outcome.methods.join(" -> ")));
    out.push_str(&format!(
        "Restarts: {} | champion from restart {}\n",
        outcome.restarts.len(),
        outcome.restart_index
    ));
    out.push_str(&format!("Sum of squares: {:.6e}\n", outcome.sum_squares));
    out.push_str(&format!("Duration: {:.3}s\n", outcome.duration_secs));

    out.push_str("\nChampion by method:\n");
    for step in &outcome.champion_trace {
        let ssq = step
            .sum_squares
            .map(|v| format!("{v:.6e}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("  {:<24} {ssq}\n", step.method));
    }

    if !outcome.method_failures.is_empty() {
        out.push_str("\nFailed methods:\n");
        for f in &outcome.method_failures {
            out.push_str(&format!("  {}: {}\n", f.method, f.reason));
        }
    }

    let failed_restarts: Vec<_> = outcome.restarts.iter().filter(|r| r.error.is_some()).collect();
    if !failed_restarts.is_empty() {
        out.push_str(&format!("\n{} restart(s) produced no champion\n", failed_restarts.len()));
    }
    out
}

/// Per-method evaluation counts and SSQ extremes.
pub fn format_quality(outcome: &FitOutcome) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<24} {:>8} {:>8} {:>14} {:>14}\n",
        "method", "evals", "failed", "first_ssq", "min_ssq"
    ));
    out.push_str(&format!("{:-<24} {:-<8} {:-<8} {:-<14} {:-<14}\n", "", "", "", "", ""));
    for s in &outcome.statistics {
        let first = s.sum_squares.first().map(|v| format!("{v:.6e}")).unwrap_or_default();
        let min = s.min_sum_squares().map(|v| format!("{v:.6e}")).unwrap_or_default();
        out.push_str(&format!(
            "{:<24} {:>8} {:>8} {:>14} {:>14}\n",
            truncate(&s.method, 24),
            s.evaluations(),
            s.failed_evaluations,
            first,
            min
        ));
    }
    out
}

pub fn format_performance(rows: &[PerformanceRow]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<24} {:>12} {:>8} {:>12}\n", "method", "Tot", "Cnt", "Avg"));
    out.push_str(&format!("{:-<24} {:-<12} {:-<8} {:-<12}\n", "", "", "", ""));
    for r in rows {
        out.push_str(&format!(
            "{:<24} {:>12.6} {:>8} {:>12.6}\n",
            truncate(&r.method, 24),
            r.total_secs,
            r.count,
            r.average_secs
        ));
    }
    out
}

/// Known vs fitted values with relative error.
pub fn format_comparison(rows: &[(String, f64, f64)]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<16} {:>14} {:>14} {:>10}\n", "parameter", "actual", "estimated", "rel_err"));
    out.push_str(&format!("{:-<16} {:-<14} {:-<14} {:-<10}\n", "", "", "", ""));
    for (name, actual, estimated) in rows {
        let err = relative_error(*actual, *estimated, true);
        let err = if err.is_nan() { "-".to_string() } else { format!("{err:.2e}") };
        out.push_str(&format!(
            "{:<16} {:>14.6} {:>14.6} {:>10}\n",
            truncate(name, 16),
            actual,
            estimated,
            err
        ));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::outcome;

    #[test]
    fn report_requires_an_outcome() {
        assert!(matches!(format_report(None), Err(FitError::InvalidConfig(_))));
    }

    #[test]
    fn report_replaces_native_variables() {
        let text = format_report(Some(&outcome(true))).unwrap();
        assert!(text.starts_with("[[Variables]]\n    center: 10.00000000 (bounds = [0, 100])"));
        assert!(text.contains("# fitting method   = leastsq"));
        assert!(!text.contains("native-variable"));
        assert_eq!(text.matches("[[Variables]]").count(), 1);
    }

    #[test]
    fn summary_lists_failures_and_trace() {
        let text = format_run_summary(&outcome(true));
        assert!(text.contains("Methods: differential_evolution -> leastsq"));
        assert!(text.contains("bogus: unknown"));
        assert!(text.contains("differential_evolution"));
    }

    #[test]
    fn comparison_shows_relative_error() {
        let text = format_comparison(&[("mult".to_string(), 2.0, 2.2), ("zero".to_string(), 0.0, 1.0)]);
        assert!(text.contains("1.00e-1"));
        assert!(text.lines().nth(3).unwrap_or_default().trim_end().ends_with('-'));
    }

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("differential_evolution", 8), "differe.");
        assert_eq!(truncate("leastsq", 8), "leastsq");
    }
}
