//! Differential evolution ("differential_evolution"), `best1bin` strategy.
//!
//! Global search over the box bounds; every varying parameter needs finite
//! bounds. The energy of a member is the sum of squared residuals, and a
//! member whose evaluation fails gets `+inf`.
//!
//! Options: `popsize` (multiplier of the dimension, default 15), `mutation`
//! (fixed factor, default dithering in `[0.5, 1.0)`), `recombination`
//! (default 0.7), `tol` (0.01), `atol` (0.0), `maxiter` (1000), `seed`,
//! `init` (`latinhypercube` or `random`), and `max_nfev`.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{METHOD_DIFFERENTIAL_EVOLUTION, MethodOptions, ParameterSet};
use crate::error::FitError;
use crate::math::{latin_hypercube, mean_std, sum_squares, uniform_point};
use crate::minimize::native_report::{self, FitStatistics};
use crate::minimize::{EvaluationBudget, Minimizer, MinimizerReport, Objective};

const DEFAULT_POPSIZE: usize = 15;
const DEFAULT_MAXITER: usize = 1000;
const DEFAULT_RECOMBINATION: f64 = 0.7;
const DEFAULT_TOL: f64 = 0.01;
const DITHER: (f64, f64) = (0.5, 1.0);

#[derive(Debug, Clone, Copy, Default)]
pub struct DifferentialEvolution;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mutation {
    Fixed(f64),
    Dither(f64, f64),
}

impl Mutation {
    fn sample<R: Rng + ?Sized>(self, rng: &mut R) -> f64 {
        match self {
            Self::Fixed(f) => f,
            Self::Dither(lo, hi) => rng.gen_range(lo..hi),
        }
    }
}

#[derive(Debug, Clone)]
struct Settings {
    popsize: usize,
    mutation: Mutation,
    recombination: f64,
    tol: f64,
    atol: f64,
    maxiter: usize,
    seed: u64,
    latin: bool,
}

impl Settings {
    fn from_options(options: &MethodOptions) -> Result<Self, FitError> {
        let popsize = options.get_usize("popsize")?.unwrap_or(DEFAULT_POPSIZE);
        let recombination = options.get_f64("recombination")?.unwrap_or(DEFAULT_RECOMBINATION);
        if popsize == 0 {
            return Err(FitError::InvalidConfig("popsize must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&recombination) {
            return Err(FitError::InvalidConfig(format!(
                "recombination must be in [0, 1], got {recombination}"
            )));
        }
        let mutation = match options.get_f64("mutation")? {
            Some(f) if f > 0.0 && f <= 2.0 => Mutation::Fixed(f),
            Some(f) => {
                return Err(FitError::InvalidConfig(format!("mutation must be in (0, 2], got {f}")));
            }
            None => Mutation::Dither(DITHER.0, DITHER.1),
        };
        let latin = match options.get("init").map(|v| v.to_string()) {
            None => true,
            Some(s) if s == "latinhypercube" => true,
            Some(s) if s == "random" => false,
            Some(other) => return Err(FitError::InvalidConfig(format!("unknown init '{other}'"))),
        };
        Ok(Self {
            popsize,
            mutation,
            recombination,
            tol: options.get_f64("tol")?.unwrap_or(DEFAULT_TOL),
            atol: options.get_f64("atol")?.unwrap_or(0.0),
            maxiter: options.get_usize("maxiter")?.unwrap_or(DEFAULT_MAXITER),
            seed: options.get_u64("seed")?.unwrap_or(0),
            latin,
        })
    }
}

struct Population<'a> {
    template: &'a ParameterSet,
    varying: Vec<usize>,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl<'a> Population<'a> {
    fn new(template: &'a ParameterSet) -> Result<Self, FitError> {
        let mut varying = Vec::new();
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        for (i, p) in template.iter().enumerate() {
            if p.lower() == p.upper() {
                continue;
            }
            if !p.has_finite_bounds() {
                return Err(FitError::method_failure(
                    METHOD_DIFFERENTIAL_EVOLUTION,
                    format!("parameter '{}' needs finite bounds", p.name()),
                ));
            }
            varying.push(i);
            lower.push(p.lower());
            upper.push(p.upper());
        }
        Ok(Self {
            template,
            varying,
            lower,
            upper,
        })
    }

    fn start(&self) -> Vec<f64> {
        let values = self.template.values();
        self.varying.iter().map(|&i| values[i]).collect()
    }

    fn to_parameters(&self, x: &[f64]) -> Result<ParameterSet, FitError> {
        let mut values = self.template.values();
        for (k, &i) in self.varying.iter().enumerate() {
            values[i] = x[k];
        }
        self.template.with_values(&values)
    }

    /// Redraws out-of-bounds coordinates uniformly inside their bounds.
    fn ensure_bounds<R: Rng + ?Sized>(&self, rng: &mut R, x: &mut [f64]) {
        for (k, v) in x.iter_mut().enumerate() {
            let (lo, hi) = (self.lower[k], self.upper[k]);
            if !(lo..=hi).contains(v) {
                *v = rng.gen_range(lo..=hi);
            }
        }
    }
}

/// `Some(energy)` or `None` once the budget is spent.
fn energy(
    population: &Population<'_>,
    budget: &mut EvaluationBudget,
    objective: &mut dyn Objective,
    x: &[f64],
    ndata: &mut usize,
) -> Option<f64> {
    let params = match population.to_parameters(x) {
        Ok(p) => p,
        Err(_) => return Some(f64::INFINITY),
    };
    match budget.evaluate(objective, &params)? {
        Ok(r) => {
            *ndata = r.len();
            Some(sum_squares(&r))
        }
        Err(e) => {
            debug!("differential_evolution: member rejected: {e}");
            Some(f64::INFINITY)
        }
    }
}

fn argmin(energies: &[f64]) -> usize {
    energies
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Two distinct indices, both different from `exclude`.
fn pick_two<R: Rng + ?Sized>(rng: &mut R, size: usize, exclude: usize) -> (usize, usize) {
    let mut draw = |avoid: &[usize]| loop {
        let k = rng.gen_range(0..size);
        if !avoid.contains(&k) {
            return k;
        }
    };
    let a = draw(&[exclude]);
    let b = draw(&[exclude, a]);
    (a, b)
}

impl Minimizer for DifferentialEvolution {
    fn name(&self) -> &'static str {
        METHOD_DIFFERENTIAL_EVOLUTION
    }

    fn minimize(
        &self,
        objective: &mut dyn Objective,
        initial: &ParameterSet,
        options: &MethodOptions,
    ) -> Result<MinimizerReport, FitError> {
        let settings = Settings::from_options(options)?;
        let population = Population::new(initial)?;
        let dims = population.varying.len();
        let size = (settings.popsize * dims).max(5);
        let mut budget = EvaluationBudget::from_options(options, (settings.maxiter + 1) * size)?;
        let mut rng = StdRng::seed_from_u64(settings.seed);

        let mut members: Vec<Vec<f64>> = if settings.latin {
            latin_hypercube(&mut rng, &population.lower, &population.upper, size, true)
        } else {
            (0..size)
                .map(|_| uniform_point(&mut rng, &population.lower, &population.upper))
                .collect()
        };
        members[0] = population.start();

        let mut ndata = 0;
        let mut energies = Vec::with_capacity(size);
        for x in &members {
            match energy(&population, &mut budget, objective, x, &mut ndata) {
                Some(e) => energies.push(e),
                None => break,
            }
        }
        if energies.is_empty() {
            return Err(FitError::method_failure(METHOD_DIFFERENTIAL_EVOLUTION, "no evaluations allowed"));
        }
        if energies.iter().all(|e| e.is_infinite()) {
            return Err(FitError::method_failure(
                METHOD_DIFFERENTIAL_EVOLUTION,
                "no member of the initial population could be evaluated",
            ));
        }
        // A truncated initial population keeps only the evaluated members.
        members.truncate(energies.len());
        let size = members.len();

        let mut best = argmin(&energies);
        let mut iterations = 0;
        let mut converged = false;
        let mut message = "maximum number of iterations reached".to_string();

        'generations: for generation in 1..=settings.maxiter {
            if size < 3 || dims == 0 {
                message = "population too small to evolve".to_string();
                break;
            }
            iterations = generation;
            for i in 0..size {
                let f = settings.mutation.sample(&mut rng);
                let (r1, r2) = pick_two(&mut rng, size, i);
                let forced = rng.gen_range(0..dims);
                let mut trial = members[i].clone();
                for (k, value) in trial.iter_mut().enumerate() {
                    if k == forced || rng.r#gen::<f64>() < settings.recombination {
                        *value = members[best][k] + f * (members[r1][k] - members[r2][k]);
                    }
                }
                population.ensure_bounds(&mut rng, &mut trial);

                let Some(e) = energy(&population, &mut budget, objective, &trial, &mut ndata) else {
                    message = "maximum number of function evaluations reached".to_string();
                    break 'generations;
                };
                if e <= energies[i] {
                    members[i] = trial;
                    energies[i] = e;
                    if e < energies[best] {
                        best = i;
                    }
                }
            }

            if energies.iter().all(|e| e.is_finite()) {
                if let Some((mean, std)) = mean_std(&energies) {
                    if std <= settings.atol + settings.tol * mean.abs() {
                        converged = true;
                        message = "population energies converged".to_string();
                        break;
                    }
                }
            }
        }

        let terminal = population.to_parameters(&members[best])?;
        let chi_square = energies[best];
        let stats = FitStatistics {
            method: METHOD_DIFFERENTIAL_EVOLUTION,
            nfev: budget.used(),
            ndata,
            nvarys: dims,
            chi_square,
            message: &message,
        };
        let native_report = native_report::render(&stats, initial, &terminal, &[], &[]);
        debug!(
            "differential_evolution: {} evaluations, {iterations} generations, best ssq = {chi_square:e}",
            budget.used()
        );

        Ok(MinimizerReport {
            method: METHOD_DIFFERENTIAL_EVOLUTION.to_string(),
            terminal,
            nfev: budget.used(),
            iterations,
            converged,
            message,
            native_report,
        })
    }
}
