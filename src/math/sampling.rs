//! Point sampling inside box bounds.
//!
//! Both the restart sampler and the differential-evolution backend draw
//! points from here. Callers guarantee finite bounds with `lower <= upper`.

use rand::Rng;
use rand::seq::SliceRandom;

/// One point with every coordinate drawn uniformly in `[lower_i, upper_i]`.
pub fn uniform_point<R: Rng + ?Sized>(rng: &mut R, lower: &[f64], upper: &[f64]) -> Vec<f64> {
    lower
        .iter()
        .zip(upper)
        .map(|(&lo, &hi)| if hi > lo { rng.gen_range(lo..=hi) } else { lo })
        .collect()
}

/// `count` space-filling points (Latin hypercube).
///
/// Each axis is cut into `count` equal strata. Point `k` takes stratum
/// `perm_i[k]` on axis `i`, where every axis has its own random permutation,
/// so each stratum of each axis is used exactly once. With `jitter` the
/// coordinate is uniform inside the stratum, otherwise it is the stratum centre.
pub fn latin_hypercube<R: Rng + ?Sized>(
    rng: &mut R,
    lower: &[f64],
    upper: &[f64],
    count: usize,
    jitter: bool,
) -> Vec<Vec<f64>> {
    let dims = lower.len();
    let mut points = vec![vec![0.0; dims]; count];
    if count == 0 {
        return points;
    }

    let mut strata: Vec<usize> = (0..count).collect();
    for axis in 0..dims {
        strata.shuffle(rng);
        let lo = lower[axis];
        let hi = upper[axis];
        let step = (hi - lo) / count as f64;
        for (k, point) in points.iter_mut().enumerate() {
            let offset = if jitter { rng.r#gen::<f64>() } else { 0.5 };
            let v = lo + (strata[k] as f64 + offset) * step;
            point[axis] = v.clamp(lo, hi);
        }
    }
    points
}
