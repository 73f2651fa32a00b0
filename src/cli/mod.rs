//! Command-line parsing for the IR relaxometry tool.
//!
//! Argument parsing and dispatch stay separate from the numerical code: the
//! structs here are converted into `FitConfig` / `SynthConfig` in `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{Polarity, SolverOptions};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "irs", version, about = "Two-point inversion-recovery PD/T1 mapping and multi-TI synthesis")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit PD and T1 maps from an MPRAGE/FGATIR pair.
    Fit(FitArgs),
    /// Synthesize a TI sweep from previously fitted PD/T1 maps.
    Synth(SynthArgs),
    /// Fit, then synthesize from the fresh maps.
    Run(RunArgs),
    /// Write a synthetic head phantom (inputs, mask and ground truth).
    Phantom(PhantomArgs),
    /// Print geometry and intensity statistics of one or more volumes.
    Inspect(InspectArgs),
}

/// Sequence timing and assumed polarities.
#[derive(Debug, Args, Clone)]
pub struct AcquisitionArgs {
    /// Repetition time (ms).
    #[arg(long, env = "IRS_TR", default_value_t = 3000.0)]
    pub tr: f64,

    /// Inversion time of the MPRAGE-type volume (ms).
    #[arg(long, default_value_t = 900.0)]
    pub ti1: f64,

    /// Inversion time of the FGATIR-type volume (ms).
    #[arg(long, default_value_t = 400.0)]
    pub ti2: f64,

    /// Assumed sign of the MPRAGE-type signal.
    #[arg(long, value_enum, default_value_t = Polarity::Positive)]
    pub polarity1: Polarity,

    /// Assumed sign of the FGATIR-type signal.
    #[arg(long, value_enum, default_value_t = Polarity::Negative)]
    pub polarity2: Polarity,
}

/// Root-finder settings.
#[derive(Debug, Args, Clone)]
pub struct SolverArgs {
    /// Lower end of the T1 search interval (ms).
    #[arg(long, default_value_t = SolverOptions::default().t1_min)]
    pub t1_min: f64,

    /// Upper end of the T1 search interval (ms).
    #[arg(long, default_value_t = SolverOptions::default().t1_max)]
    pub t1_max: f64,

    /// Log-spaced bracket scan points.
    #[arg(long, default_value_t = SolverOptions::default().bracket_steps)]
    pub bracket_steps: usize,

    /// Residual bound on the normalized reduced equation at the root.
    #[arg(long, default_value_t = SolverOptions::default().abs_tol)]
    pub abs_tol: f64,

    /// Relative width the T1 bracket must shrink to before bisection stops.
    #[arg(long, default_value_t = SolverOptions::default().rel_tol)]
    pub rel_tol: f64,

    /// Bisection iteration cap.
    #[arg(long, default_value_t = SolverOptions::default().max_iter)]
    pub max_iter: usize,
}

impl SolverArgs {
    pub fn options(&self) -> SolverOptions {
        SolverOptions {
            t1_min: self.t1_min,
            t1_max: self.t1_max,
            bracket_steps: self.bracket_steps,
            abs_tol: self.abs_tol,
            rel_tol: self.rel_tol,
            max_iter: self.max_iter,
        }
    }
}

/// Worker pool size and output location.
#[derive(Debug, Args, Clone)]
pub struct ExecArgs {
    /// Worker threads (defaults to the available parallelism).
    #[arg(short = 'j', long, env = "IRS_WORKERS")]
    pub workers: Option<usize>,

    /// Output directory (created if missing).
    #[arg(short = 'o', long, env = "IRS_OUT_DIR", default_value = "irs_out")]
    pub out_dir: PathBuf,
}

/// Options for `irs fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Long-TI (MPRAGE-type) magnitude volume.
    #[arg(long, value_name = "NIFTI")]
    pub mprage: PathBuf,

    /// Short-TI (FGATIR-type) magnitude volume.
    #[arg(long, value_name = "NIFTI")]
    pub fgatir: PathBuf,

    /// Foreground mask (non-zero = fit). Without one, every voxel is fitted.
    #[arg(long, value_name = "NIFTI")]
    pub mask: Option<PathBuf>,

    #[command(flatten)]
    pub acquisition: AcquisitionArgs,

    #[command(flatten)]
    pub solver: SolverArgs,

    /// z-slices per work chunk (defaults to ~4 chunks per worker).
    #[arg(long)]
    pub slices_per_chunk: Option<usize>,

    #[command(flatten)]
    pub exec: ExecArgs,
}

/// TI sweep and output naming.
#[derive(Debug, Args, Clone)]
pub struct GridArgs {
    /// First synthesized TI (ms).
    #[arg(long, default_value_t = 400.0)]
    pub ti_min: f64,

    /// Last synthesized TI (ms), included when on the grid.
    #[arg(long, default_value_t = 1400.0)]
    pub ti_max: f64,

    /// TI increment (ms).
    #[arg(long, default_value_t = 20.0)]
    pub ti_step: f64,

    /// File prefix for synthesized volumes.
    #[arg(long, default_value = "synth")]
    pub prefix: String,
}

/// Options for `irs synth`.
#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// PD map written by `irs fit`.
    #[arg(long, value_name = "NIFTI")]
    pub pd_map: PathBuf,

    /// T1 map written by `irs fit`.
    #[arg(long, value_name = "NIFTI")]
    pub t1_map: PathBuf,

    /// Repetition time used for synthesis (ms).
    #[arg(long, env = "IRS_TR", default_value_t = 3000.0)]
    pub tr: f64,

    #[command(flatten)]
    pub grid: GridArgs,

    #[command(flatten)]
    pub exec: ExecArgs,
}

/// Options for `irs run`.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub fit: FitArgs,

    #[command(flatten)]
    pub grid: GridArgs,
}

/// Options for `irs phantom`.
#[derive(Debug, Args, Clone)]
pub struct PhantomArgs {
    #[arg(long, default_value_t = 64)]
    pub nx: usize,

    #[arg(long, default_value_t = 64)]
    pub ny: usize,

    #[arg(long, default_value_t = 48)]
    pub nz: usize,

    /// Isotropic voxel size (mm).
    #[arg(long, default_value_t = 1.0)]
    pub voxel_mm: f64,

    /// PD scale applied to the nominal tissue values.
    #[arg(long, default_value_t = 1000.0)]
    pub intensity_scale: f64,

    /// Gaussian noise standard deviation, in scaled signal units.
    #[arg(long, default_value_t = 5.0)]
    pub noise_sigma: f64,

    /// Random seed (same seed, same volumes).
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[command(flatten)]
    pub acquisition: AcquisitionArgs,

    /// Output directory (created if missing).
    #[arg(short = 'o', long, env = "IRS_OUT_DIR", default_value = "irs_phantom")]
    pub out_dir: PathBuf,
}

/// Options for `irs inspect`.
#[derive(Debug, Args, Clone)]
pub struct InspectArgs {
    /// Volumes to describe.
    #[arg(required = true, value_name = "NIFTI")]
    pub paths: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fit_defaults() {
        let cli = Cli::try_parse_from(["irs", "fit", "--mprage", "a.nii", "--fgatir", "b.nii"]).unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.acquisition.ti1, 900.0);
        assert_eq!(args.acquisition.polarity2, Polarity::Negative);
        assert_eq!(args.solver.options(), SolverOptions::default());
        assert!(args.mask.is_none());
    }

    #[test]
    fn run_takes_fit_and_grid_flags() {
        let cli = Cli::try_parse_from([
            "irs", "run", "--mprage", "a.nii", "--fgatir", "b.nii", "--ti-step", "50", "-j", "2",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.grid.ti_step, 50.0);
        assert_eq!(args.fit.exec.workers, Some(2));
    }

    #[test]
    fn inspect_requires_a_path() {
        assert!(Cli::try_parse_from(["irs", "inspect"]).is_err());
    }
}
