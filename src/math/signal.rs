//! Inversion-recovery signal model.
//!
//! The ideal longitudinal signal at inversion time `TI` with repetition time `TR` is:
//!
//! ```text
//! S = PD · (1 − 2·exp(−TI/T1) + exp(−TR/T1))
//! ```
//!
//! and the scanner reports `|S|`.
//!
//! Numerical notes:
//! - For long T1 the three terms nearly cancel. We evaluate the factor as
//!   `expm1(−TR/T1) − 2·expm1(−TI/T1)`, which is algebraically identical and keeps
//!   precision when `TI/T1` and `TR/T1` are small.
//! - Invalid inputs give `None` instead of a NaN that would leak into the maps.

/// Longitudinal factor `1 − 2·exp(−ti/t1) + exp(−tr/t1)`.
///
/// Returns `None` for `t1 <= 0`, `tr <= 0`, `ti < 0` or non-finite inputs.
pub fn longitudinal_factor(ti: f64, t1: f64, tr: f64) -> Option<f64> {
    if !(ti.is_finite() && t1.is_finite() && tr.is_finite()) {
        return None;
    }
    if t1 <= 0.0 || tr <= 0.0 || ti < 0.0 {
        return None;
    }
    Some(raw_factor(ti, t1, tr))
}

/// Unchecked factor for hot loops whose inputs were validated up front.
#[inline]
pub(crate) fn raw_factor(ti: f64, t1: f64, tr: f64) -> f64 {
    (-tr / t1).exp_m1() - 2.0 * (-ti / t1).exp_m1()
}

/// Signed signal `PD · factor`.
pub fn forward_signal(pd: f64, t1: f64, ti: f64, tr: f64) -> Option<f64> {
    if !pd.is_finite() {
        return None;
    }
    longitudinal_factor(ti, t1, tr).map(|g| pd * g)
}

/// Magnitude-reconstructed observable `|S|`.
pub fn magnitude_signal(pd: f64, t1: f64, ti: f64, tr: f64) -> Option<f64> {
    forward_signal(pd, t1, ti, tr).map(f64::abs)
}

/// TI at which the signal crosses zero for a given T1: `T1 · ln(2 / (1 + exp(−TR/T1)))`.
pub fn null_point(t1: f64, tr: f64) -> Option<f64> {
    if !(t1.is_finite() && tr.is_finite() && t1 > 0.0 && tr > 0.0) {
        return None;
    }
    Some(t1 * (2.0 / (1.0 + (-tr / t1).exp())).ln())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_matches_direct_formula() {
        for &t1 in &[50.0_f64, 400.0, 800.0, 1500.0, 4000.0] {
            for &ti in &[0.0, 100.0, 400.0, 900.0, 2000.0] {
                let direct = 1.0 - 2.0 * (-ti / t1).exp() + (-3000.0 / t1).exp();
                let g = longitudinal_factor(ti, t1, 3000.0).unwrap();
                assert!((g - direct).abs() < 1e-12, "t1={t1} ti={ti}: {g} vs {direct}");
            }
        }
    }

    #[test]
    fn invalid_inputs_are_undefined() {
        assert!(forward_signal(1.0, 0.0, 400.0, 3000.0).is_none());
        assert!(forward_signal(1.0, -5.0, 400.0, 3000.0).is_none());
        assert!(forward_signal(1.0, 800.0, 400.0, 0.0).is_none());
        assert!(forward_signal(f64::NAN, 800.0, 400.0, 3000.0).is_none());
        assert!(forward_signal(1.0, f64::INFINITY, 400.0, 3000.0).is_none());
    }

    #[test]
    fn full_inversion_at_zero_ti() {
        // At TI=0 the factor is −1 + exp(−TR/T1).
        let g = longitudinal_factor(0.0, 800.0, 3000.0).unwrap();
        assert!((g - (-1.0 + (-3000.0_f64 / 800.0).exp())).abs() < 1e-12);
        assert!(g < 0.0);
    }

    #[test]
    fn signal_vanishes_at_null_point() {
        let ti0 = null_point(800.0, 3000.0).unwrap();
        let s = forward_signal(1.0, 800.0, ti0, 3000.0).unwrap();
        assert!(s.abs() < 1e-12, "signal at null point was {s}");
        // FGATIR-like TI sits before the null, MPRAGE-like TI after it.
        assert!(forward_signal(1.0, 800.0, 400.0, 3000.0).unwrap() < 0.0);
        assert!(forward_signal(1.0, 800.0, 900.0, 3000.0).unwrap() > 0.0);
    }

    #[test]
    fn magnitude_drops_sign() {
        let m = magnitude_signal(2.0, 800.0, 400.0, 3000.0).unwrap();
        let s = forward_signal(2.0, 800.0, 400.0, 3000.0).unwrap();
        assert_eq!(m, s.abs());
    }
}
