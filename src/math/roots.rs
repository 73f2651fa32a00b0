//! Scalar root finding on a bracketing interval.
//!
//! The per-voxel solver needs two primitives:
//! - locate the first sign change of `f` over an increasing sample grid
//! - refine that bracket by bisection with an iteration cap
//!
//! Bisection is chosen over Newton because it cannot leave the bracket, and its
//! result depends only on the inputs, so runs are reproducible.

/// A sign-change interval `[lo, hi]` with the function values at its ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lo: f64,
    pub hi: f64,
    pub f_lo: f64,
    pub f_hi: f64,
}

/// Result of a bracketed refinement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RootOutcome {
    Converged { root: f64, iterations: usize },
    /// Cap reached before the bracket closed; `best` is the last midpoint.
    NotConverged { best: f64 },
}

/// Find the first sign change of `f` over the (increasing) sample points.
///
/// An exact zero at a sample is returned as a degenerate bracket `lo == hi`.
/// Non-finite samples break the chain: no bracket spans them.
pub fn find_bracket<F>(f: F, xs: &[f64]) -> Option<Bracket>
where
    F: Fn(f64) -> f64,
{
    let mut prev: Option<(f64, f64)> = None;
    for &x in xs {
        let fx = f(x);
        if !fx.is_finite() {
            prev = None;
            continue;
        }
        if fx == 0.0 {
            return Some(Bracket {
                lo: x,
                hi: x,
                f_lo: 0.0,
                f_hi: 0.0,
            });
        }
        if let Some((px, pf)) = prev {
            if pf.signum() != fx.signum() {
                return Some(Bracket {
                    lo: px,
                    hi: x,
                    f_lo: pf,
                    f_hi: fx,
                });
            }
        }
        prev = Some((x, fx));
    }
    None
}

/// Bisect until the bracket is narrower than `rel_tol·|mid|` with `|f(mid)| < tol`,
/// or until `max_iter` midpoints have been evaluated.
///
/// A small residual alone is not enough: where `f` is flat the residual can fall
/// below `tol` far from the root.
pub fn bisect<F>(f: F, bracket: Bracket, tol: f64, rel_tol: f64, max_iter: usize) -> RootOutcome
where
    F: Fn(f64) -> f64,
{
    if bracket.lo == bracket.hi || bracket.f_lo == 0.0 {
        return RootOutcome::Converged {
            root: bracket.lo,
            iterations: 0,
        };
    }
    if bracket.f_hi == 0.0 {
        return RootOutcome::Converged {
            root: bracket.hi,
            iterations: 0,
        };
    }

    let (mut lo, mut hi) = (bracket.lo, bracket.hi);
    let mut f_lo = bracket.f_lo;
    let mut mid = 0.5 * (lo + hi);

    for iter in 1..=max_iter {
        mid = 0.5 * (lo + hi);
        let f_mid = f(mid);
        if f_mid == 0.0 {
            return RootOutcome::Converged {
                root: mid,
                iterations: iter,
            };
        }
        if !f_mid.is_finite() {
            break;
        }
        // Interval exhausted at machine precision without meeting the tolerances.
        if mid <= lo || mid >= hi {
            break;
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
        if hi - lo <= rel_tol * mid.abs() && f_mid.abs() < tol {
            return RootOutcome::Converged {
                root: 0.5 * (lo + hi),
                iterations: iter,
            };
        }
    }

    RootOutcome::NotConverged { best: mid }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brackets_first_sign_change() {
        // Roots at 1 and 3; the scan must report the one near 1.
        let f = |x: f64| (x - 1.0) * (x - 3.0);
        let xs: Vec<f64> = (0..10).map(|i| 0.25 + i as f64 * 0.5).collect();
        let b = find_bracket(f, &xs).unwrap();
        assert!(b.lo < 1.0 && b.hi > 1.0);
    }

    #[test]
    fn no_bracket_without_sign_change() {
        let f = |x: f64| x * x + 1.0;
        assert!(find_bracket(f, &[0.0, 1.0, 2.0]).is_none());
    }

    #[test]
    fn exact_zero_on_grid() {
        let f = |x: f64| x - 2.0;
        let b = find_bracket(f, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(b.lo, 2.0);
        assert_eq!(b.hi, 2.0);
        assert_eq!(
            bisect(f, b, 1e-12, 1e-9, 10),
            RootOutcome::Converged {
                root: 2.0,
                iterations: 0
            }
        );
    }

    #[test]
    fn bisection_converges_on_sqrt2() {
        let f = |x: f64| x * x - 2.0;
        let b = find_bracket(f, &[1.0, 2.0]).unwrap();
        match bisect(f, b, 1e-12, 1e-12, 200) {
            RootOutcome::Converged { root, .. } => {
                assert!((root - 2.0_f64.sqrt()).abs() < 1e-11);
            }
            other => panic!("expected convergence, got {other:?}"),
        }
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let f = |x: f64| x - 1.234_567;
        let b = find_bracket(f, &[0.0, 10.0]).unwrap();
        assert!(matches!(bisect(f, b, 1e-14, 1e-12, 3), RootOutcome::NotConverged { .. }));
    }

    #[test]
    fn flat_residual_keeps_bisecting_to_the_root() {
        // |f| < tol across the whole bracket; only the width test can stop it.
        let f = |x: f64| 1e-12 * (x - 1.234);
        let b = find_bracket(f, &[0.0, 10.0]).unwrap();
        match bisect(f, b, 1e-10, 1e-9, 200) {
            RootOutcome::Converged { root, iterations } => {
                assert!((root - 1.234).abs() < 1e-8, "stopped at {root}");
                assert!(iterations > 1);
            }
            other => panic!("expected convergence, got {other:?}"),
        }
    }
}
