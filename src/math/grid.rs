//! Sample grids.
//!
//! - log-spaced T1 points for bracketing the per-voxel root
//! - the inclusive linear TI sweep used by synthesis

use crate::error::AppError;

/// Relative slack when counting linear grid steps, so that an endpoint landing
/// on the grid is kept despite rounding in `(max - min) / step`.
const STEP_COUNT_SLACK: f64 = 1e-9;

/// Upper bound on the points of a linear sweep (one output volume each).
pub const MAX_LINEAR_POINTS: usize = 10_000;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::config(format!(
            "Invalid log-space range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::config("Log-space steps must be >= 2."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    // Pin the endpoints exactly; exp(ln(x)) can be off by an ulp.
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

/// Number of points `linear_inclusive` would produce, if finite and at most
/// `MAX_LINEAR_POINTS`.
pub fn linear_count(min: f64, max: f64, step: f64) -> Option<usize> {
    let ratio = (max - min) / step;
    let steps = (ratio * (1.0 + STEP_COUNT_SLACK)).floor();
    if !(steps.is_finite() && steps >= 0.0 && steps < MAX_LINEAR_POINTS as f64) {
        return None;
    }
    (steps as usize).checked_add(1)
}

/// Points `min + k·step` for `k = 0 … floor((max − min)/step)`.
///
/// Each point is computed from `k` rather than accumulated, so the sequence is
/// free of drift.
pub fn linear_inclusive(min: f64, max: f64, step: f64) -> Result<Vec<f64>, AppError> {
    let count = linear_count(min, max, step).ok_or_else(|| {
        AppError::config(format!(
            "Linear grid [{min}, {max}] with step {step} is invalid or has more than {MAX_LINEAR_POINTS} points."
        ))
    })?;
    Ok((0..count).map(|k| min + k as f64 * step).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(10.0, 10_000.0, 64).unwrap();
        assert_eq!(v.len(), 64);
        assert_eq!(v[0], 10.0);
        assert_eq!(v[63], 10_000.0);
        assert!(v.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn log_space_rejects_bad_range() {
        assert!(log_space(0.0, 10.0, 5).is_err());
        assert!(log_space(10.0, 1.0, 5).is_err());
        assert!(log_space(1.0, 10.0, 1).is_err());
    }

    #[test]
    fn linear_grid_keeps_exact_endpoint() {
        let v = linear_inclusive(400.0, 1400.0, 20.0).unwrap();
        assert_eq!(v.len(), 51);
        assert_eq!(v[0], 400.0);
        assert_eq!(v[50], 1400.0);
    }

    #[test]
    fn linear_grid_stops_before_max_off_grid() {
        let v = linear_inclusive(0.0, 1.0, 0.3).unwrap();
        assert_eq!(v.len(), 4);
        assert!((v[3] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn linear_grid_tolerates_fractional_steps() {
        // 0.1 is not representable; 10 steps must still reach 1.0.
        let v = linear_inclusive(0.0, 1.0, 0.1).unwrap();
        assert_eq!(v.len(), 11);
    }

    #[test]
    fn oversized_linear_grid_is_rejected() {
        assert_eq!(linear_count(0.0, 1e308, 1e-308), None);
        assert_eq!(linear_count(0.0, 1e15, 1.0), None);
        assert_eq!(linear_count(0.0, f64::MAX, f64::MIN_POSITIVE), None);
        assert_eq!(linear_count(0.0, 9_999.0, 1.0), Some(MAX_LINEAR_POINTS));
        assert!(linear_inclusive(0.0, 1e15, 1.0).unwrap_err().is_config());
    }
}
