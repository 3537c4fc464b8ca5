//! Alternative starting points for multi-start fitting.

use std::collections::BTreeSet;

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::domain::{ParameterSet, RestartPlan, SamplingStrategy};
use crate::error::FitError;
use crate::math::{latin_hypercube, uniform_point};

/// Draws starting points inside a template's bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestartSampler {
    strategy: SamplingStrategy,
    seed: u64,
    jitter: bool,
}

impl RestartSampler {
    pub fn new(strategy: SamplingStrategy, seed: u64) -> Self {
        Self {
            strategy,
            seed,
            jitter: true,
        }
    }

    /// Latin hypercube only: stratum centres instead of uniform draws inside strata.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// `count` parameter sets with every value inside its bounds.
    ///
    /// Every parameter needs finite bounds. The same seed gives the same sets.
    pub fn sample(&self, template: &ParameterSet, count: usize) -> Result<Vec<ParameterSet>, FitError> {
        if let Some(p) = template.iter().find(|p| !p.has_finite_bounds()) {
            return Err(FitError::InvalidConfig(format!(
                "restart sampling needs finite bounds for '{}'",
                p.name()
            )));
        }
        let lower = template.lower_bounds();
        let upper = template.upper_bounds();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let points: Vec<Vec<f64>> = match self.strategy {
            SamplingStrategy::Random => (0..count).map(|_| uniform_point(&mut rng, &lower, &upper)).collect(),
            SamplingStrategy::LatinHypercube => latin_hypercube(&mut rng, &lower, &upper, count, self.jitter),
        };
        debug!("sampled {count} restart points ({:?}, seed {})", self.strategy, self.seed);
        points.iter().map(|values| template.with_values(values)).collect()
    }
}

/// Restart 0 is always `initial`; the plan adds the alternatives after it.
///
/// Explicit sets must name the same parameters as `initial`, in any order.
/// They supply values only: the result takes `initial`'s order and bounds.
pub fn starting_points(initial: &ParameterSet, plan: &RestartPlan) -> Result<Vec<ParameterSet>, FitError> {
    let mut starts = vec![initial.clone()];
    match plan {
        RestartPlan::None => {}
        RestartPlan::Sampled {
            count,
            strategy,
            seed,
            jitter,
        } => {
            let sampler = RestartSampler::new(*strategy, *seed).with_jitter(*jitter);
            starts.extend(sampler.sample(initial, *count)?);
        }
        RestartPlan::Explicit(sets) => {
            let expected: BTreeSet<String> = initial.names().into_iter().collect();
            for set in sets {
                let names: BTreeSet<String> = set.names().into_iter().collect();
                if names != expected {
                    return Err(FitError::ParameterMismatch {
                        missing: expected.difference(&names).cloned().collect(),
                        extra: names.difference(&expected).cloned().collect(),
                    });
                }
                starts.push(initial.with_updates(&set.values_by_name())?);
            }
        }
    }
    Ok(starts)
}
