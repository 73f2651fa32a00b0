//! Shared domain types.
//!
//! These types are small, `Copy` where possible and serializable so they can be:
//!
//! - passed by value into the parallel workers
//! - recorded verbatim in the run manifest

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::{MAX_LINEAR_POINTS, linear_count};

/// Assumed sign of the longitudinal magnetization at an inversion time.
///
/// Magnitude reconstruction discards the sign, so it has to be supplied from
/// outside (the `isflip` convention: flipped means negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub fn from_isflip(isflip: bool) -> Self {
        if isflip {
            Polarity::Negative
        } else {
            Polarity::Positive
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Polarity::Positive => 1.0,
            Polarity::Negative => -1.0,
        }
    }

    /// Restore a signed observation from a magnitude.
    pub fn apply(self, magnitude: f64) -> f64 {
        self.sign() * magnitude.abs()
    }
}

/// Scalar acquisition parameters shared by every voxel. Times in ms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParameters {
    pub tr: f64,
    /// Inversion time of the first (long-TI, MPRAGE-type) volume.
    pub ti1: f64,
    /// Inversion time of the second (short-TI, FGATIR-type) volume.
    pub ti2: f64,
    pub polarity1: Polarity,
    pub polarity2: Polarity,
}

impl AcquisitionParameters {
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, v) in [("TR", self.tr), ("TI1", self.ti1), ("TI2", self.ti2)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(AppError::config(format!(
                    "Invalid acquisition parameter {name}={v} (must be finite and > 0 ms)."
                )));
            }
        }
        if self.ti1 == self.ti2 {
            return Err(AppError::config(format!(
                "TI1 and TI2 must differ (both {} ms); the two-point system is singular.",
                self.ti1
            )));
        }
        Ok(())
    }
}

/// Knobs for the per-voxel T1 root search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Lower end of the T1 search interval (ms).
    pub t1_min: f64,
    /// Upper end of the T1 search interval (ms).
    pub t1_max: f64,
    /// Number of log-spaced points used to bracket the root.
    pub bracket_steps: usize,
    /// Absolute tolerance on the normalized reduced residual.
    pub abs_tol: f64,
    /// Bisection stops only once the T1 bracket is narrower than `rel_tol · T1`.
    pub rel_tol: f64,
    /// Bisection iteration cap per voxel.
    pub max_iter: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            // Below ~15 ms both factors round to 1 in f64 at typical TIs and T1
            // is no longer resolvable.
            t1_min: 50.0,
            t1_max: 10_000.0,
            bracket_steps: 64,
            abs_tol: 1e-10,
            rel_tol: 1e-9,
            max_iter: 200,
        }
    }
}

impl SolverOptions {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.t1_min.is_finite() && self.t1_max.is_finite() && self.t1_min > 0.0 && self.t1_max > self.t1_min) {
            return Err(AppError::config(format!(
                "Invalid T1 search interval [{}, {}] (must be finite with 0 < min < max).",
                self.t1_min, self.t1_max
            )));
        }
        if self.bracket_steps < 2 {
            return Err(AppError::config("Bracket steps must be >= 2."));
        }
        if !(self.abs_tol.is_finite() && self.abs_tol > 0.0) {
            return Err(AppError::config(format!("Invalid solver tolerance {}.", self.abs_tol)));
        }
        if !(self.rel_tol.is_finite() && self.rel_tol > 0.0 && self.rel_tol < 1.0) {
            return Err(AppError::config(format!(
                "Invalid relative T1 tolerance {} (must be in (0, 1)).",
                self.rel_tol
            )));
        }
        if self.max_iter == 0 {
            return Err(AppError::config("Solver max iterations must be >= 1."));
        }
        Ok(())
    }
}

/// Outcome of a single voxel solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoxelStatus {
    Valid,
    /// Outside the mask; the solve was bypassed.
    Background,
    /// One of the observations is exactly zero.
    Degenerate,
    /// No sign change of the reduced equation inside the T1 interval.
    NoBracket,
    /// Iteration cap reached before the bracket closed on the root.
    NotConverged,
    /// Root found but back-substitution gave a negative or non-finite PD.
    NonPhysical,
}

/// Fitted `(PD, T1)` for one voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelEstimate {
    pub pd: f64,
    pub t1: f64,
    pub status: VoxelStatus,
}

impl VoxelEstimate {
    /// Sentinel `(0, 0)` tagged with the reason.
    pub fn sentinel(status: VoxelStatus) -> Self {
        Self {
            pd: 0.0,
            t1: 0.0,
            status,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == VoxelStatus::Valid
    }
}

/// Per-status voxel counts accumulated over a fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub total: usize,
    pub valid: usize,
    pub background: usize,
    pub degenerate: usize,
    pub no_bracket: usize,
    pub not_converged: usize,
    pub non_physical: usize,
}

impl FitDiagnostics {
    pub fn record(&mut self, status: VoxelStatus) {
        self.total += 1;
        match status {
            VoxelStatus::Valid => self.valid += 1,
            VoxelStatus::Background => self.background += 1,
            VoxelStatus::Degenerate => self.degenerate += 1,
            VoxelStatus::NoBracket => self.no_bracket += 1,
            VoxelStatus::NotConverged => self.not_converged += 1,
            VoxelStatus::NonPhysical => self.non_physical += 1,
        }
    }

    pub fn merge(mut self, other: FitDiagnostics) -> Self {
        self.total += other.total;
        self.valid += other.valid;
        self.background += other.background;
        self.degenerate += other.degenerate;
        self.no_bracket += other.no_bracket;
        self.not_converged += other.not_converged;
        self.non_physical += other.non_physical;
        self
    }

    /// Foreground voxels that did not yield a valid estimate.
    pub fn invalid(&self) -> usize {
        self.degenerate + self.no_bracket + self.not_converged + self.non_physical
    }

    pub fn foreground(&self) -> usize {
        self.total - self.background
    }

    pub fn invalid_fraction(&self) -> f64 {
        let fg = self.foreground();
        if fg == 0 {
            0.0
        } else {
            self.invalid() as f64 / fg as f64
        }
    }
}

/// Inclusive TI sweep for synthesis. Times in ms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisGrid {
    pub ti_min: f64,
    pub ti_max: f64,
    pub ti_step: f64,
}

impl SynthesisGrid {
    pub fn new(ti_min: f64, ti_max: f64, ti_step: f64) -> Result<Self, AppError> {
        let grid = Self {
            ti_min,
            ti_max,
            ti_step,
        };
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.ti_min.is_finite() && self.ti_max.is_finite() && self.ti_step.is_finite()) {
            return Err(AppError::config(format!(
                "Invalid synthesis grid: min={}, max={}, step={} (must be finite).",
                self.ti_min, self.ti_max, self.ti_step
            )));
        }
        if self.ti_min >= self.ti_max {
            return Err(AppError::config(format!(
                "Invalid synthesis grid: ti_min={} must be < ti_max={}.",
                self.ti_min, self.ti_max
            )));
        }
        if self.ti_step <= 0.0 {
            return Err(AppError::config(format!(
                "Invalid synthesis grid: ti_step={} must be > 0.",
                self.ti_step
            )));
        }
        if linear_count(self.ti_min, self.ti_max, self.ti_step).is_none() {
            return Err(AppError::config(format!(
                "Invalid synthesis grid: [{}, {}] in steps of {} exceeds {MAX_LINEAR_POINTS} TI points.",
                self.ti_min, self.ti_max, self.ti_step
            )));
        }
        Ok(())
    }
}

/// Fit stage configuration as understood by the pipeline (derived from CLI flags).
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Long-TI (MPRAGE-type) volume.
    pub mprage: PathBuf,
    /// Short-TI (FGATIR-type) volume.
    pub fgatir: PathBuf,
    /// Foreground mask; `None` solves every voxel.
    pub mask: Option<PathBuf>,
    pub acquisition: AcquisitionParameters,
    pub solver: SolverOptions,
    pub num_workers: usize,
    /// Slabs per chunk; `None` lets the dispatcher pick.
    pub slices_per_chunk: Option<usize>,
    pub out_dir: PathBuf,
}

/// Synthesis stage configuration.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub pd_map: PathBuf,
    pub t1_map: PathBuf,
    pub tr: f64,
    pub grid: SynthesisGrid,
    pub num_workers: usize,
    pub out_dir: PathBuf,
    /// Output file prefix, e.g. `synth` gives `synth_TI-00400.nii.gz`.
    pub prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AcquisitionParameters {
        AcquisitionParameters {
            tr: 3000.0,
            ti1: 900.0,
            ti2: 400.0,
            polarity1: Polarity::Positive,
            polarity2: Polarity::Negative,
        }
    }

    #[test]
    fn isflip_maps_to_negative() {
        assert_eq!(Polarity::from_isflip(true), Polarity::Negative);
        assert_eq!(Polarity::from_isflip(false), Polarity::Positive);
        assert_eq!(Polarity::Negative.apply(-2.5), -2.5);
        assert_eq!(Polarity::Negative.apply(2.5), -2.5);
        assert_eq!(Polarity::Positive.apply(-2.5), 2.5);
    }

    #[test]
    fn acquisition_validation() {
        assert!(params().validate().is_ok());

        let mut p = params();
        p.tr = 0.0;
        assert!(p.validate().unwrap_err().is_config());

        let mut p = params();
        p.ti2 = f64::NAN;
        assert!(p.validate().is_err());

        let mut p = params();
        p.ti2 = p.ti1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn solver_options_validation() {
        assert!(SolverOptions::default().validate().is_ok());
        let bad = SolverOptions {
            t1_min: 100.0,
            t1_max: 50.0,
            ..SolverOptions::default()
        };
        assert!(bad.validate().is_err());
        let bad = SolverOptions {
            max_iter: 0,
            ..SolverOptions::default()
        };
        assert!(bad.validate().is_err());
        for rel_tol in [0.0, 1.0, f64::NAN] {
            let bad = SolverOptions {
                rel_tol,
                ..SolverOptions::default()
            };
            assert!(bad.validate().unwrap_err().is_config(), "rel_tol={rel_tol}");
        }
    }

    #[test]
    fn degenerate_grids_are_rejected() {
        assert!(SynthesisGrid::new(400.0, 1400.0, 20.0).is_ok());
        assert!(SynthesisGrid::new(1400.0, 400.0, 20.0).unwrap_err().is_config());
        assert!(SynthesisGrid::new(400.0, 400.0, 20.0).is_err());
        assert!(SynthesisGrid::new(400.0, 1400.0, 0.0).is_err());
        assert!(SynthesisGrid::new(400.0, 1400.0, -5.0).is_err());
    }

    #[test]
    fn grids_with_too_many_points_are_config_errors() {
        assert!(SynthesisGrid::new(0.0, 1e308, 1e-308).unwrap_err().is_config());
        assert!(SynthesisGrid::new(0.0, 1e15, 1.0).unwrap_err().is_config());
        assert!(SynthesisGrid::new(0.0, 1e308, 1e-300).unwrap_err().is_config());
        assert!(SynthesisGrid::new(0.0, 9_999.0, 1.0).is_ok());
    }

    #[test]
    fn diagnostics_merge_and_fractions() {
        let mut a = FitDiagnostics::default();
        a.record(VoxelStatus::Valid);
        a.record(VoxelStatus::Background);
        let mut b = FitDiagnostics::default();
        b.record(VoxelStatus::NoBracket);
        b.record(VoxelStatus::Valid);

        let m = a.merge(b);
        assert_eq!(m.total, 4);
        assert_eq!(m.foreground(), 3);
        assert_eq!(m.invalid(), 1);
        assert!((m.invalid_fraction() - 1.0 / 3.0).abs() < 1e-12);
    }
}
