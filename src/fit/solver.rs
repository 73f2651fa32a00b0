//! Per-voxel two-point relaxometry.
//!
//! Given two polarity-corrected observations
//!
//! ```text
//! s1 = PD · g(TI1, T1),   s2 = PD · g(TI2, T1),   g = 1 − 2e^(−TI/T1) + e^(−TR/T1)
//! ```
//!
//! we eliminate PD by cross-multiplying, leaving one scalar equation in T1:
//!
//! ```text
//! h(T1) = ŝ1 · g(TI2, T1) − ŝ2 · g(TI1, T1) = 0
//! ```
//!
//! where `ŝ = s / max(|s1|, |s2|)`. The normalization makes the tolerance
//! independent of the intensity scale. The product form has no pole at the null
//! point of either acquisition, which a ratio `g1/g2` would have.
//!
//! The root is bracketed on a log-spaced T1 grid (first sign change wins) and
//! refined by bisection until the bracket itself is narrow; a small residual is
//! not enough on its own because `h` flattens out at short T1. PD is then back-substituted from the observation with
//! the larger magnitude.

use crate::domain::{AcquisitionParameters, SolverOptions, VoxelEstimate, VoxelStatus};
use crate::error::AppError;
use crate::math::{RootOutcome, bisect, find_bracket, log_space, raw_factor};

/// Immutable per-run solver state, shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct VoxelSolver {
    acq: AcquisitionParameters,
    opts: SolverOptions,
    t1_grid: Vec<f64>,
}

impl VoxelSolver {
    pub fn new(acq: AcquisitionParameters, opts: SolverOptions) -> Result<Self, AppError> {
        acq.validate()?;
        opts.validate()?;
        let t1_grid = log_space(opts.t1_min, opts.t1_max, opts.bracket_steps)?;
        Ok(Self { acq, opts, t1_grid })
    }

    /// Solve from two reconstructed magnitudes, applying the configured polarities.
    pub fn solve(&self, magnitude1: f64, magnitude2: f64) -> VoxelEstimate {
        let s1 = self.acq.polarity1.apply(magnitude1);
        let s2 = self.acq.polarity2.apply(magnitude2);
        self.solve_signed(s1, s2)
    }

    /// Solve from already-signed observations.
    pub fn solve_signed(&self, s1: f64, s2: f64) -> VoxelEstimate {
        if !(s1.is_finite() && s2.is_finite()) || s1 == 0.0 || s2 == 0.0 {
            return VoxelEstimate::sentinel(VoxelStatus::Degenerate);
        }

        let scale = s1.abs().max(s2.abs());
        let (n1, n2) = (s1 / scale, s2 / scale);
        let AcquisitionParameters { tr, ti1, ti2, .. } = self.acq;
        let reduced = |t1: f64| n1 * raw_factor(ti2, t1, tr) - n2 * raw_factor(ti1, t1, tr);

        let Some(bracket) = find_bracket(reduced, &self.t1_grid) else {
            return VoxelEstimate::sentinel(VoxelStatus::NoBracket);
        };

        let t1 = match bisect(reduced, bracket, self.opts.abs_tol, self.opts.rel_tol, self.opts.max_iter) {
            RootOutcome::Converged { root, .. } => root,
            RootOutcome::NotConverged { .. } => {
                return VoxelEstimate::sentinel(VoxelStatus::NotConverged);
            }
        };

        let (s_ref, ti_ref) = if s1.abs() >= s2.abs() { (s1, ti1) } else { (s2, ti2) };
        let g = raw_factor(ti_ref, t1, tr);
        let pd = s_ref / g;
        if !(pd.is_finite() && pd >= 0.0 && t1 > 0.0) {
            return VoxelEstimate::sentinel(VoxelStatus::NonPhysical);
        }

        VoxelEstimate {
            pd,
            t1,
            status: VoxelStatus::Valid,
        }
    }
}
