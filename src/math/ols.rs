//! Linear least squares solves.
//!
//! The Levenberg–Marquardt backend repeatedly solves small damped problems
//!
//! ```text
//! minimize ||J δ + r||² + λ ||D δ||²
//! ```
//!
//! which is the ordinary least squares problem on the stacked system
//! `[J; √λ·D] δ = [-r; 0]`. We solve it with SVD so that tall and
//! rank-deficient Jacobians are handled without special cases.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the damped step `[J; √λ·D] δ = [-r; 0]`.
///
/// `scale` holds the diagonal of `D` (one entry per Jacobian column).
pub fn solve_damped_step(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
    lambda: f64,
    scale: &DVector<f64>,
) -> Option<DVector<f64>> {
    let (m, n) = jacobian.shape();
    let mut a = DMatrix::<f64>::zeros(m + n, n);
    let mut b = DVector::<f64>::zeros(m + n);

    a.view_mut((0, 0), (m, n)).copy_from(jacobian);
    for i in 0..m {
        b[i] = -residuals[i];
    }
    let root = lambda.max(0.0).sqrt();
    for j in 0..n {
        a[(m + j, j)] = root * scale[j];
    }

    solve_least_squares(&a, &b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn undamped_step_is_the_gauss_newton_step() {
        // r(δ) = J δ + r0 with J = I, r0 = [1, -2] => δ = [-1, 2]
        let j = DMatrix::<f64>::identity(2, 2);
        let r = DVector::from_row_slice(&[1.0, -2.0]);
        let scale = DVector::from_element(2, 1.0);
        let step = solve_damped_step(&j, &r, 0.0, &scale).unwrap();
        assert!((step[0] + 1.0).abs() < 1e-12);
        assert!((step[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn damping_shrinks_the_step() {
        let j = DMatrix::<f64>::identity(2, 2);
        let r = DVector::from_row_slice(&[1.0, -2.0]);
        let scale = DVector::from_element(2, 1.0);
        let free = solve_damped_step(&j, &r, 0.0, &scale).unwrap();
        let damped = solve_damped_step(&j, &r, 10.0, &scale).unwrap();
        assert!(damped.norm() < free.norm());
    }
}
