//! Shared fit pipeline for the `demo` and `fit` commands.
//!
//! Both commands do the same thing once their data is in hand:
//! build parameters -> build methods and restart plan -> execute -> sample the curve.
//! The CLI layer only prints what comes back.

use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{FitConfig, FitterMethod, MethodOptions, ModelKind, ParameterSet, ParameterValues, RestartPlan};
use crate::error::FitError;
use crate::fit::{FitOutcome, Fitter, NamedResiduals, ResidualFunction, TableObjective, TableOutput};
use crate::io::load_table;
use crate::models::{apply_overrides, default_parameters, model_table, predict};

/// Demo parabola: `mult * (x - center)^2` with these true values.
pub const DEMO_CENTER: f64 = 10.0;
pub const DEMO_MULT: f64 = 2.0;
/// Demo abscissae are `0, 1, ..., DEMO_POINTS - 1`.
pub const DEMO_POINTS: usize = 20;

/// All computed outputs of one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub outcome: FitOutcome,
    pub model: ModelKind,
    /// First reference series, for the fit plot.
    pub observed: Vec<(f64, f64)>,
    /// Fitted curve sampled across the observed x range.
    pub curve: Vec<(f64, f64)>,
    /// `(name, actual, estimated)` when the true values are known.
    pub known: Vec<(String, f64, f64)>,
    /// Input rows that were skipped on load.
    pub skipped_rows: usize,
}

/// Method sequence from the configured names, options, and evaluation bound.
pub fn build_methods(config: &FitConfig) -> Result<Vec<FitterMethod>, FitError> {
    let mut options = MethodOptions::new();
    for assignment in &config.method_options {
        options.insert_assignment(assignment)?;
    }
    let names: Vec<&str> = config.methods.iter().map(String::as_str).collect();
    Ok(FitterMethod::sequence(&names, &options, config.max_nfev))
}

pub fn restart_plan(config: &FitConfig) -> RestartPlan {
    if config.restarts == 0 {
        return RestartPlan::None;
    }
    RestartPlan::Sampled {
        count: config.restarts,
        strategy: config.sampling,
        seed: config.seed,
        jitter: config.jitter,
    }
}

/// Demo observations, with Gaussian noise of standard deviation `noise`.
pub fn demo_data(noise: f64, seed: u64) -> Result<Vec<(f64, f64)>, FitError> {
    let truth: ParameterValues = [("center", DEMO_CENTER), ("mult", DEMO_MULT)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    let mut points = Vec::with_capacity(DEMO_POINTS);
    for i in 0..DEMO_POINTS {
        let x = i as f64;
        points.push((x, predict(ModelKind::Parabola, x, &truth)?));
    }
    if !(noise.is_finite() && noise >= 0.0) {
        return Err(FitError::InvalidConfig(format!("noise must be finite and >= 0, got {noise}")));
    }
    if noise > 0.0 {
        let normal = Normal::new(0.0, noise)
            .map_err(|e| FitError::InvalidConfig(format!("invalid noise level {noise}: {e}")))?;
        let mut rng = StdRng::seed_from_u64(seed);
        for point in &mut points {
            point.1 += normal.sample(&mut rng);
        }
    }
    Ok(points)
}

/// Fit the demo parabola from `center = 1, mult = 1` within `[0, 100]`.
pub fn run_demo(config: &FitConfig) -> Result<RunOutput, FitError> {
    let data = demo_data(config.noise, config.seed)?;
    let mut initial = ParameterSet::new();
    initial.add("center", 1.0, 0.0, 100.0)?;
    initial.add("mult", 1.0, 0.0, 100.0)?;
    let initial = apply_overrides(&initial, &config.param_overrides)?;

    let function = NamedResiduals::new(ModelKind::Parabola.parameter_names(), |values: &ParameterValues| {
        data.iter()
            .map(|&(x, y)| predict(ModelKind::Parabola, x, values).map(|m| y - m))
            .collect::<Result<Vec<_>, _>>()
    });
    let outcome = execute(config, &function, initial)?;

    let known = vec![
        ("center".to_string(), DEMO_CENTER, outcome.value("center").unwrap_or(f64::NAN)),
        ("mult".to_string(), DEMO_MULT, outcome.value("mult").unwrap_or(f64::NAN)),
    ];
    let curve = sample_curve(ModelKind::Parabola, &outcome, &data, config.plot_width)?;
    Ok(RunOutput {
        outcome,
        model: ModelKind::Parabola,
        observed: data,
        curve,
        known,
        skipped_rows: 0,
    })
}

/// Fit `config.model` to every value column of the configured CSV.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, FitError> {
    let path = config
        .data_path
        .as_ref()
        .ok_or_else(|| FitError::InvalidConfig("fit needs a data file".to_string()))?;
    let loaded = load_table(path)?;
    info!(
        "loaded {}: {} rows x {} columns ({} skipped)",
        path.display(),
        loaded.table.nrows(),
        loaded.table.ncols(),
        loaded.row_errors.len()
    );

    let (xs, ys) = loaded.first_series();
    let model = config.model;
    let defaults = default_parameters(model, &xs, &ys)?;
    let initial = apply_overrides(&defaults, &config.param_overrides)?;

    let reference = loaded.table.clone();
    let keys = reference.row_keys().to_vec();
    let columns = reference.columns().to_vec();
    let function = TableObjective::new(model.parameter_names(), reference, &initial, |values: &ParameterValues| {
        model_table(model, values, &keys, &columns).map(TableOutput::Labelled)
    })?;
    let outcome = execute(config, &function, initial)?;

    let observed: Vec<(f64, f64)> = xs.into_iter().zip(ys).collect();
    let curve = sample_curve(model, &outcome, &observed, config.plot_width)?;
    Ok(RunOutput {
        outcome,
        model,
        observed,
        curve,
        known: Vec::new(),
        skipped_rows: loaded.row_errors.len(),
    })
}

fn execute(config: &FitConfig, function: &dyn ResidualFunction, initial: ParameterSet) -> Result<FitOutcome, FitError> {
    let methods = build_methods(config)?;
    Fitter::new(function, initial, methods)
        .with_restarts(restart_plan(config))
        .collect_timing(config.collect_stats)
        .parallel(config.parallel)
        .execute()
}

fn sample_curve(
    model: ModelKind,
    outcome: &FitOutcome,
    observed: &[(f64, f64)],
    n: usize,
) -> Result<Vec<(f64, f64)>, FitError> {
    let (lo, hi) = observed
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(x, _)| (lo.min(x), hi.max(x)));
    if !(lo.is_finite() && hi > lo) {
        return Ok(Vec::new());
    }
    let values = outcome.parameters.values_by_name();
    let n = n.max(2);
    (0..n)
        .map(|i| {
            let x = lo + (hi - lo) * i as f64 / (n as f64 - 1.0);
            predict(model, x, &values).map(|y| (x, y))
        })
        .collect()
}
