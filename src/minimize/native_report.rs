//! Plain-text fit report in the `[[Fit Statistics]]` / `[[Variables]]` /
//! `[[Correlations]]` layout familiar from Python fitting tools.

use std::fmt::Write as _;

use crate::domain::ParameterSet;

/// Correlations below this magnitude are not listed.
pub const MIN_REPORTED_CORRELATION: f64 = 0.1;

/// Header figures of a native report.
#[derive(Debug, Clone)]
pub struct FitStatistics<'a> {
    pub method: &'a str,
    pub nfev: usize,
    pub ndata: usize,
    pub nvarys: usize,
    pub chi_square: f64,
    pub message: &'a str,
}

impl FitStatistics<'_> {
    pub fn reduced_chi_square(&self) -> f64 {
        let dof = self.ndata.saturating_sub(self.nvarys).max(1);
        self.chi_square / dof as f64
    }
}

/// Uncertainty of one parameter, keyed by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Uncertainty {
    pub name: String,
    pub stderr: f64,
}

/// Pairwise correlation `C(a, b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub first: String,
    pub second: String,
    pub value: f64,
}

pub fn render(
    stats: &FitStatistics<'_>,
    initial: &ParameterSet,
    terminal: &ParameterSet,
    uncertainties: &[Uncertainty],
    correlations: &[Correlation],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[[Fit Statistics]]");
    let _ = writeln!(out, "    # fitting method   = {}", stats.method);
    let _ = writeln!(out, "    # function evals   = {}", stats.nfev);
    let _ = writeln!(out, "    # data points      = {}", stats.ndata);
    let _ = writeln!(out, "    # variables        = {}", stats.nvarys);
    let _ = writeln!(out, "    chi-square         = {:.8e}", stats.chi_square);
    let _ = writeln!(out, "    reduced chi-square = {:.8e}", stats.reduced_chi_square());
    if !stats.message.is_empty() {
        let _ = writeln!(out, "    message            = {}", stats.message);
    }

    let _ = writeln!(out, "[[Variables]]");
    let width = terminal.iter().map(|p| p.name().len()).max().unwrap_or(0) + 1;
    for p in terminal {
        let label = format!("{}:", p.name());
        let init = initial.value(p.name()).unwrap_or(f64::NAN);
        let stderr = uncertainties.iter().find(|u| u.name == p.name()).map(|u| u.stderr);
        let fixed = p.lower() == p.upper();
        let _ = match (fixed, stderr) {
            (true, _) => writeln!(out, "    {label:<width$} {:.8} (fixed)", p.value()),
            (false, Some(se)) if se.is_finite() => {
                let pct = if p.value() != 0.0 {
                    format!(" ({:.2}%)", 100.0 * se / p.value().abs())
                } else {
                    String::new()
                };
                writeln!(out, "    {label:<width$} {:.8} +/- {se:.8e}{pct} (init = {init})", p.value())
            }
            _ => writeln!(out, "    {label:<width$} {:.8} (init = {init})", p.value()),
        };
    }

    let mut listed: Vec<&Correlation> = correlations
        .iter()
        .filter(|c| c.value.abs() >= MIN_REPORTED_CORRELATION)
        .collect();
    if !listed.is_empty() {
        listed.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
        let _ = writeln!(
            out,
            "[[Correlations]] (unreported correlations are < {MIN_REPORTED_CORRELATION:.3})"
        );
        for c in listed {
            let _ = writeln!(out, "    C({}, {}) = {:+.4}", c.first, c.second, c.value);
        }
    }
    out
}

/// Drop the section that starts with `header`, up to the next `[[` line.
pub fn strip_section(report: &str, header: &str) -> String {
    let mut out = String::new();
    let mut skipping = false;
    for line in report.lines() {
        if line.starts_with("[[") {
            skipping = line.starts_with(header);
        }
        if !skipping {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}
