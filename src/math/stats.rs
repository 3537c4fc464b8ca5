//! Small numeric helpers shared by the tracker, backends, and reports.

/// Unweighted sum of squared components.
pub fn sum_squares(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

/// Index of the first non-finite component, if any.
pub fn first_non_finite(values: &[f64]) -> Option<usize> {
    values.iter().position(|v| !v.is_finite())
}

/// Relative error `(estimated - actual) / actual`, optionally absolute.
///
/// Returns `NaN` when `actual == 0`.
pub fn relative_error(actual: f64, estimated: f64, absolute: bool) -> f64 {
    if actual == 0.0 {
        return f64::NAN;
    }
    let err = (estimated - actual) / actual;
    if absolute { err.abs() } else { err }
}

/// Mean and population standard deviation; `None` for an empty slice.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_squares_of_range() {
        assert_eq!(sum_squares(&[0.0, 1.0, 2.0]), 5.0);
        assert_eq!(sum_squares(&[]), 0.0);
    }

    #[test]
    fn relative_error_signs_and_zero() {
        assert!((relative_error(1.5, 1.0, true) - 1.0 / 3.0).abs() < 1e-12);
        assert!((relative_error(1.5, 1.0, false) + 1.0 / 3.0).abs() < 1e-12);
        assert!(relative_error(0.0, 1.0, true).is_nan());
    }

    #[test]
    fn non_finite_detection() {
        assert_eq!(first_non_finite(&[1.0, 2.0]), None);
        assert_eq!(first_non_finite(&[1.0, f64::NAN, f64::INFINITY]), Some(1));
    }

    #[test]
    fn mean_std_basic() {
        let (m, s) = mean_std(&[1.0, 3.0]).unwrap();
        assert_eq!(m, 2.0);
        assert_eq!(s, 1.0);
        assert!(mean_std(&[]).is_none());
    }
}
