//! Bounded Levenberg-Marquardt ("leastsq").
//!
//! Bounds are handled by optimizing in an unbounded internal space and
//! mapping back to external values:
//!
//! - both bounds finite: `x = lo + (sin(u) + 1) (hi - lo) / 2`
//! - lower bound only: `x = lo - 1 + sqrt(u^2 + 1)`
//! - upper bound only: `x = hi + 1 - sqrt(u^2 + 1)`
//!
//! Parameters with `lower == upper` are held fixed. The Jacobian is taken by
//! forward differences in internal space, and the damped step is solved with
//! the SVD in `math::ols`.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::domain::{METHOD_LEASTSQ, MethodOptions, Parameter, ParameterSet};
use crate::error::FitError;
use crate::math::{solve_damped_step, solve_least_squares, sum_squares};
use crate::minimize::native_report::{self, Correlation, FitStatistics, Uncertainty};
use crate::minimize::{EvaluationBudget, Minimizer, MinimizerReport, Objective};

const DEFAULT_TOL: f64 = 1.5e-8;
const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;
const LAMBDA_MIN: f64 = 1e-12;
/// Relative distance a start value sitting on a bound is moved inward.
const BOUND_NUDGE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct LevenbergMarquardt;

#[derive(Debug, Clone, Copy)]
enum Transform {
    Free,
    Lower(f64),
    Upper(f64),
    Both(f64, f64),
}

impl Transform {
    fn of(p: &Parameter) -> Self {
        match (p.lower().is_finite(), p.upper().is_finite()) {
            (true, true) => Self::Both(p.lower(), p.upper()),
            (true, false) => Self::Lower(p.lower()),
            (false, true) => Self::Upper(p.upper()),
            (false, false) => Self::Free,
        }
    }

    /// Moves a value sitting exactly on a bound slightly inside, where `dx/du`
    /// is not zero.
    fn inside(self, x: f64) -> f64 {
        match self {
            Self::Free => x,
            Self::Lower(lo) if x <= lo => lo + BOUND_NUDGE * lo.abs().max(1.0),
            Self::Upper(hi) if x >= hi => hi - BOUND_NUDGE * hi.abs().max(1.0),
            Self::Both(lo, hi) => {
                let step = BOUND_NUDGE * (hi - lo);
                x.clamp(lo + step, hi - step)
            }
            _ => x,
        }
    }

    fn to_internal(self, x: f64) -> f64 {
        match self {
            Self::Free => x,
            Self::Lower(lo) => ((x - lo + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            Self::Upper(hi) => ((hi - x + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            Self::Both(lo, hi) => (2.0 * (x - lo) / (hi - lo) - 1.0).clamp(-1.0, 1.0).asin(),
        }
    }

    fn to_external(self, u: f64) -> f64 {
        match self {
            Self::Free => u,
            Self::Lower(lo) => lo - 1.0 + (u * u + 1.0).sqrt(),
            Self::Upper(hi) => hi + 1.0 - (u * u + 1.0).sqrt(),
            Self::Both(lo, hi) => lo + (u.sin() + 1.0) * (hi - lo) / 2.0,
        }
    }

    /// `dx/du`, used to carry the covariance back to external space.
    fn gradient(self, u: f64) -> f64 {
        match self {
            Self::Free => 1.0,
            Self::Lower(_) => u / (u * u + 1.0).sqrt(),
            Self::Upper(_) => -u / (u * u + 1.0).sqrt(),
            Self::Both(lo, hi) => u.cos() * (hi - lo) / 2.0,
        }
    }
}

/// The varying parameters of a template set, with their transforms.
struct Space<'a> {
    template: &'a ParameterSet,
    varying: Vec<usize>,
    transforms: Vec<Transform>,
}

impl<'a> Space<'a> {
    fn new(template: &'a ParameterSet) -> Self {
        let mut varying = Vec::new();
        let mut transforms = Vec::new();
        for (i, p) in template.iter().enumerate() {
            if p.lower() < p.upper() {
                varying.push(i);
                transforms.push(Transform::of(p));
            }
        }
        Self {
            template,
            varying,
            transforms,
        }
    }

    fn dim(&self) -> usize {
        self.varying.len()
    }

    fn internal(&self) -> DVector<f64> {
        let values = self.template.values();
        DVector::from_iterator(
            self.dim(),
            self.varying
                .iter()
                .zip(&self.transforms)
                .map(|(&i, t)| t.to_internal(t.inside(values[i]))),
        )
    }

    fn external(&self, u: &DVector<f64>) -> Result<ParameterSet, FitError> {
        let mut values = self.template.values();
        for (k, (&i, t)) in self.varying.iter().zip(&self.transforms).enumerate() {
            values[i] = t.to_external(u[k]);
        }
        self.template.with_values(&values)
    }
}

fn evaluate_at(
    space: &Space<'_>,
    budget: &mut EvaluationBudget,
    objective: &mut dyn Objective,
    u: &DVector<f64>,
) -> Option<Result<DVector<f64>, FitError>> {
    let params = match space.external(u) {
        Ok(p) => p,
        Err(e) => return Some(Err(e)),
    };
    budget
        .evaluate(objective, &params)
        .map(|r| r.map(DVector::from_vec))
}

enum JacobianOutcome {
    Ready(DMatrix<f64>),
    OutOfBudget,
    Failed(String),
}

/// Forward differences, falling back to a backward step when the forward
/// point cannot be evaluated.
fn jacobian(
    space: &Space<'_>,
    budget: &mut EvaluationBudget,
    objective: &mut dyn Objective,
    u: &DVector<f64>,
    r: &DVector<f64>,
    rel_step: f64,
) -> JacobianOutcome {
    let m = r.len();
    let n = u.len();
    let mut jac = DMatrix::<f64>::zeros(m, n);
    for j in 0..n {
        let h = rel_step * u[j].abs().max(1.0);
        let mut column = None;
        for step in [h, -h] {
            let mut shifted = u.clone();
            shifted[j] += step;
            match evaluate_at(space, budget, objective, &shifted) {
                None => return JacobianOutcome::OutOfBudget,
                Some(Ok(rs)) if rs.len() == m => {
                    column = Some((rs - r) / step);
                    break;
                }
                Some(Ok(rs)) => {
                    return JacobianOutcome::Failed(format!(
                        "residual length changed from {m} to {}",
                        rs.len()
                    ));
                }
                Some(Err(e)) if e.is_evaluation_error() => debug!("leastsq: derivative step failed: {e}"),
                Some(Err(e)) => return JacobianOutcome::Failed(e.to_string()),
            }
        }
        match column {
            Some(c) => jac.set_column(j, &c),
            None => return JacobianOutcome::Failed(format!("cannot differentiate along parameter {j}")),
        }
    }
    JacobianOutcome::Ready(jac)
}

/// External-space standard errors and correlations from `(J^T J)^-1 * s^2`.
fn uncertainties(
    space: &Space<'_>,
    jac: &DMatrix<f64>,
    u: &DVector<f64>,
    ssq: f64,
) -> (Vec<Uncertainty>, Vec<Correlation>) {
    let (m, n) = jac.shape();
    if n == 0 || m <= n {
        return (Vec::new(), Vec::new());
    }
    let jtj = jac.transpose() * jac;
    let identity = DMatrix::<f64>::identity(n, n);
    let mut inv = DMatrix::<f64>::zeros(n, n);
    for j in 0..n {
        match solve_least_squares(&jtj, &identity.column(j).into_owned()) {
            Some(col) => inv.set_column(j, &col),
            None => return (Vec::new(), Vec::new()),
        }
    }
    let s2 = ssq / (m - n) as f64;
    let grad = DVector::from_iterator(n, space.transforms.iter().zip(u.iter()).map(|(t, &ui)| t.gradient(ui)));
    let cov = DMatrix::from_fn(n, n, |a, b| inv[(a, b)] * s2 * grad[a] * grad[b]);

    let names: Vec<String> = space
        .varying
        .iter()
        .filter_map(|&i| space.template.iter().nth(i).map(|p| p.name().to_string()))
        .collect();
    let stderr: Vec<f64> = (0..n).map(|k| cov[(k, k)].max(0.0).sqrt()).collect();

    let errors = names
        .iter()
        .zip(&stderr)
        .map(|(name, &se)| Uncertainty {
            name: name.clone(),
            stderr: se,
        })
        .collect();
    let mut correlations = Vec::new();
    for a in 0..n {
        for b in (a + 1)..n {
            let denom = stderr[a] * stderr[b];
            if denom > 0.0 {
                correlations.push(Correlation {
                    first: names[a].clone(),
                    second: names[b].clone(),
                    value: cov[(a, b)] / denom,
                });
            }
        }
    }
    (errors, correlations)
}

impl Minimizer for LevenbergMarquardt {
    fn name(&self) -> &'static str {
        METHOD_LEASTSQ
    }

    fn minimize(
        &self,
        objective: &mut dyn Objective,
        initial: &ParameterSet,
        options: &MethodOptions,
    ) -> Result<MinimizerReport, FitError> {
        let space = Space::new(initial);
        let n = space.dim();
        let mut budget = EvaluationBudget::from_options(options, 200 * (n + 1))?;
        let ftol = options.get_f64("ftol")?.unwrap_or(DEFAULT_TOL);
        let xtol = options.get_f64("xtol")?.unwrap_or(DEFAULT_TOL);
        let rel_step = options.get_f64("epsfcn")?.unwrap_or(f64::EPSILON).sqrt();

        let mut u = space.internal();
        let mut r = match evaluate_at(&space, &mut budget, objective, &u) {
            Some(Ok(r)) => r,
            Some(Err(e)) => return Err(FitError::method_failure(METHOD_LEASTSQ, format!("initial evaluation failed: {e}"))),
            None => return Err(FitError::method_failure(METHOD_LEASTSQ, "no evaluations allowed")),
        };
        let m = r.len();
        if m < n {
            return Err(FitError::method_failure(
                METHOD_LEASTSQ,
                format!("{m} residuals cannot determine {n} varying parameters"),
            ));
        }
        let mut cost = sum_squares(r.as_slice());
        let mut lambda = LAMBDA_START;
        let mut scale = DVector::<f64>::zeros(n);
        let mut last_jac: Option<DMatrix<f64>> = None;
        let mut iterations = 0;
        let mut converged = n == 0 || cost == 0.0;
        let mut message = if n == 0 {
            "no varying parameters".to_string()
        } else if cost == 0.0 {
            "sum of squares is zero".to_string()
        } else {
            "maximum number of function evaluations reached".to_string()
        };

        'outer: while !converged {
            let jac = match jacobian(&space, &mut budget, objective, &u, &r, rel_step) {
                JacobianOutcome::Ready(j) => j,
                JacobianOutcome::OutOfBudget => break,
                JacobianOutcome::Failed(reason) => {
                    message = reason;
                    break;
                }
            };
            for (j, col) in jac.column_iter().enumerate() {
                scale[j] = scale[j].max(col.norm()).max(f64::MIN_POSITIVE);
            }
            iterations += 1;

            loop {
                let Some(delta) = solve_damped_step(&jac, &r, lambda, &scale) else {
                    lambda *= 10.0;
                    if lambda > LAMBDA_MAX {
                        message = "damped step could not be solved".to_string();
                        break 'outer;
                    }
                    continue;
                };
                let small_step = delta.norm() <= xtol * (u.norm() + xtol);
                let trial = &u + &delta;
                let outcome = match evaluate_at(&space, &mut budget, objective, &trial) {
                    None => {
                        last_jac = Some(jac);
                        break 'outer;
                    }
                    Some(outcome) => outcome,
                };
                match outcome {
                    Ok(rt) if rt.len() == m && sum_squares(rt.as_slice()) < cost => {
                        let trial_cost = sum_squares(rt.as_slice());
                        let reduction = (cost - trial_cost) / cost;
                        u = trial;
                        r = rt;
                        cost = trial_cost;
                        lambda = (lambda / 10.0).max(LAMBDA_MIN);
                        if reduction <= ftol {
                            converged = true;
                            message = "relative reduction in the sum of squares is at most ftol".to_string();
                        } else if small_step {
                            converged = true;
                            message = "relative step size is at most xtol".to_string();
                        } else if cost == 0.0 {
                            converged = true;
                            message = "sum of squares is zero".to_string();
                        }
                        last_jac = Some(jac);
                        continue 'outer;
                    }
                    Ok(_) => {}
                    Err(e) if e.is_evaluation_error() => debug!("leastsq: trial step rejected: {e}"),
                    Err(e) => return Err(FitError::method_failure(METHOD_LEASTSQ, e.to_string())),
                }
                if small_step {
                    converged = true;
                    message = "relative step size is at most xtol".to_string();
                    last_jac = Some(jac);
                    break 'outer;
                }
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    converged = true;
                    message = "no further reduction in the sum of squares is possible".to_string();
                    last_jac = Some(jac);
                    break 'outer;
                }
            }
        }

        let terminal = space.external(&u)?;
        let (errors, correlations) = match &last_jac {
            Some(jac) => uncertainties(&space, jac, &u, cost),
            None => (Vec::new(), Vec::new()),
        };
        let stats = FitStatistics {
            method: METHOD_LEASTSQ,
            nfev: budget.used(),
            ndata: m,
            nvarys: n,
            chi_square: cost,
            message: &message,
        };
        let native_report = native_report::render(&stats, initial, &terminal, &errors, &correlations);
        debug!(
            "leastsq: {} evaluations, {} iterations, ssq = {cost:e} ({message})",
            budget.used(),
            iterations
        );

        Ok(MinimizerReport {
            method: METHOD_LEASTSQ.to_string(),
            terminal,
            nfev: budget.used(),
            iterations,
            converged,
            message,
            native_report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MAX_NFEV;

    /// y = 2 (x - 10)^2 sampled at x = 0..20.
    struct Parabola {
        calls: usize,
    }

    impl Objective for Parabola {
        fn evaluate(&mut self, p: &ParameterSet) -> Result<Vec<f64>, FitError> {
            self.calls += 1;
            let center = p.value("center").unwrap_or(f64::NAN);
            let mult = p.value("mult").unwrap_or(f64::NAN);
            Ok((0..20)
                .map(|x| {
                    let x = x as f64;
                    2.0 * (x - 10.0).powi(2) - mult * (x - center).powi(2)
                })
                .collect())
        }
    }

    fn start(lower: f64, upper: f64) -> ParameterSet {
        let mut p = ParameterSet::new();
        p.add("center", 1.0, lower, upper).unwrap();
        p.add("mult", 1.0, lower, upper).unwrap();
        p
    }

    #[test]
    fn transforms_round_trip_inside_bounds() {
        let cases = [
            (Transform::Free, 3.5),
            (Transform::Lower(-2.0), 7.0),
            (Transform::Upper(4.0), -1.0),
            (Transform::Both(0.0, 100.0), 37.0),
        ];
        for (t, x) in cases {
            let back = t.to_external(t.to_internal(x));
            assert!((back - x).abs() < 1e-9, "{t:?}: {x} -> {back}");
        }
        // Any internal value maps into the box.
        let both = Transform::Both(0.0, 1.0);
        for u in [-50.0, -1.0, 0.0, 2.0, 90.0] {
            let x = both.to_external(u);
            assert!((0.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn fits_bounded_parabola() {
        let mut objective = Parabola { calls: 0 };
        let options = MethodOptions::new().with(MAX_NFEV, 1000usize);
        let report = LevenbergMarquardt.minimize(&mut objective, &start(0.0, 100.0), &options).unwrap();
        let center = report.terminal.value("center").unwrap();
        let mult = report.terminal.value("mult").unwrap();
        assert!((center - 10.0).abs() < 0.01, "center = {center}");
        assert!((mult - 2.0).abs() < 0.01, "mult = {mult}");
        assert_eq!(report.nfev, objective.calls);
        assert!(report.native_report.contains("# fitting method   = leastsq"));
    }

    #[test]
    fn start_on_a_bound_is_moved_inside() {
        let both = Transform::Both(0.0, 100.0);
        let u = both.to_internal(both.inside(0.0));
        assert!(both.gradient(u).abs() > 0.0);
        assert!(both.inside(0.0) > 0.0 && both.inside(0.0) < 1e-3);
        assert!(both.inside(100.0) < 100.0);
        assert_eq!(both.inside(37.0), 37.0);

        let lower = Transform::Lower(-2.0);
        assert!(lower.gradient(lower.to_internal(lower.inside(-2.0))) > 0.0);
        let upper = Transform::Upper(4.0);
        assert!(upper.gradient(upper.to_internal(upper.inside(4.0))) < 0.0);
    }

    #[test]
    fn fits_parabola_started_on_its_bounds() {
        let mut p = ParameterSet::new();
        p.add("center", 0.0, 0.0, 100.0).unwrap();
        p.add("mult", 0.0, 0.0, 100.0).unwrap();
        let mut objective = Parabola { calls: 0 };
        let options = MethodOptions::new().with(MAX_NFEV, 2000usize);
        let report = LevenbergMarquardt.minimize(&mut objective, &p, &options).unwrap();
        let center = report.terminal.value("center").unwrap();
        let mult = report.terminal.value("mult").unwrap();
        assert!((center - 10.0).abs() < 0.01, "center = {center}");
        assert!((mult - 2.0).abs() < 0.01, "mult = {mult}");
    }

    #[test]
    fn fits_unbounded_parabola() {
        let mut objective = Parabola { calls: 0 };
        let report = LevenbergMarquardt
            .minimize(
                &mut objective,
                &start(f64::NEG_INFINITY, f64::INFINITY),
                &MethodOptions::new(),
            )
            .unwrap();
        assert!((report.terminal.value("center").unwrap() - 10.0).abs() < 0.01);
    }

    #[test]
    fn respects_max_nfev() {
        let mut objective = Parabola { calls: 0 };
        let options = MethodOptions::new().with(MAX_NFEV, 5usize);
        let report = LevenbergMarquardt.minimize(&mut objective, &start(0.0, 100.0), &options).unwrap();
        assert!(objective.calls <= 5);
        assert_eq!(report.nfev, objective.calls);
    }

    #[test]
    fn failing_initial_evaluation_is_a_method_failure() {
        struct Broken;
        impl Objective for Broken {
            fn evaluate(&mut self, _p: &ParameterSet) -> Result<Vec<f64>, FitError> {
                Err(FitError::Evaluation("boom".to_string()))
            }
        }
        let result = LevenbergMarquardt.minimize(&mut Broken, &start(0.0, 100.0), &MethodOptions::new());
        assert!(matches!(result, Err(FitError::MethodFailure { .. })));
    }

    #[test]
    fn bad_points_are_skipped_but_other_errors_stop_the_method() {
        struct Walled {
            calls: usize,
            error: FitError,
        }
        impl Objective for Walled {
            fn evaluate(&mut self, p: &ParameterSet) -> Result<Vec<f64>, FitError> {
                self.calls += 1;
                if self.calls > 1 && p.value("center").is_some_and(|c| c > 5.0) {
                    return Err(self.error.clone());
                }
                Parabola { calls: 0 }.evaluate(p)
            }
        }

        let mut skipping = Walled {
            calls: 0,
            error: FitError::NonFiniteSumSquares,
        };
        let options = MethodOptions::new().with(MAX_NFEV, 300usize);
        let report = LevenbergMarquardt.minimize(&mut skipping, &start(0.0, 100.0), &options).unwrap();
        assert!(report.terminal.value("center").unwrap() <= 5.0);

        let mut stopping = Walled {
            calls: 0,
            error: FitError::Io("disk gone".to_string()),
        };
        let result = LevenbergMarquardt.minimize(&mut stopping, &start(0.0, 100.0), &options);
        assert!(matches!(result, Err(FitError::MethodFailure { .. })));
    }

    #[test]
    fn fixed_parameters_are_not_varied() {
        let mut p = ParameterSet::new();
        p.add("center", 1.0, 0.0, 100.0).unwrap();
        p.add("mult", 2.0, 2.0, 2.0).unwrap();
        let mut objective = Parabola { calls: 0 };
        let report = LevenbergMarquardt.minimize(&mut objective, &p, &MethodOptions::new()).unwrap();
        assert_eq!(report.terminal.value("mult"), Some(2.0));
        assert!((report.terminal.value("center").unwrap() - 10.0).abs() < 0.01);
    }
}
