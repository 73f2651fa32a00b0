//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - turns arguments into `FitConfig` / `SynthConfig`
//! - runs the pipeline stages against the NIfTI store
//! - prints reports and writes the run manifest

use clap::Parser;

use crate::cli::{Command, ExecArgs, FitArgs, GridArgs, InspectArgs, PhantomArgs, RunArgs, SynthArgs};
use crate::data::PhantomConfig;
use crate::domain::{AcquisitionParameters, FitConfig, SynthConfig, SynthesisGrid};
use crate::error::AppError;
use crate::io::{NiftiStore, RunManifest, VolumeStore};
use crate::report::{format_fit_summary, format_synth_summary, format_volume_info};

pub mod pipeline;

/// Entry point for the `irs` binary.
pub fn run() -> Result<(), AppError> {
    // A missing `.env` is fine; flags and the real environment still apply.
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Synth(args) => handle_synth(args),
        Command::Run(args) => handle_run(args),
        Command::Phantom(args) => handle_phantom(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args);
    let store = NiftiStore;
    let run = pipeline::run_fit(&config, &store)?;

    println!(
        "{}",
        format_fit_summary(&config.acquisition, &run.output, config.num_workers)
    );

    let mut manifest = RunManifest::new(run.output.t1.geometry());
    manifest.fit = Some(pipeline::fit_record(&config, &run));
    let path = pipeline::record_manifest(&config.out_dir, &manifest)?;
    log::info!("Manifest: {}", path.display());
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = synth_config_from_args(&args)?;
    let store = NiftiStore;
    let run = pipeline::run_synth(&config, &store)?;

    println!("{}", format_synth_summary(config.tr, &run.entries));

    let mut manifest = RunManifest::new(&run.geometry);
    manifest.synth = Some(pipeline::synth_record(&config, &run));
    let path = pipeline::record_manifest(&config.out_dir, &manifest)?;
    log::info!("Manifest: {}", path.display());
    Ok(())
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let fit_config = fit_config_from_args(&args.fit);
    let synth_config = SynthConfig {
        pd_map: fit_config.out_dir.join(pipeline::PD_MAP_FILE),
        t1_map: fit_config.out_dir.join(pipeline::T1_MAP_FILE),
        tr: fit_config.acquisition.tr,
        grid: grid_from_args(&args.grid)?,
        num_workers: fit_config.num_workers,
        out_dir: fit_config.out_dir.clone(),
        prefix: args.grid.prefix.clone(),
    };

    let store = NiftiStore;
    let fit = pipeline::run_fit(&fit_config, &store)?;
    println!(
        "{}",
        format_fit_summary(&fit_config.acquisition, &fit.output, fit_config.num_workers)
    );

    let synth = pipeline::synthesize_to_store(&fit.output.pd, &fit.output.t1, &synth_config, &store)?;
    println!("{}", format_synth_summary(synth_config.tr, &synth.entries));

    let mut manifest = RunManifest::new(fit.output.t1.geometry());
    manifest.fit = Some(pipeline::fit_record(&fit_config, &fit));
    manifest.synth = Some(pipeline::synth_record(&synth_config, &synth));
    let path = pipeline::record_manifest(&fit_config.out_dir, &manifest)?;
    log::info!("Manifest: {}", path.display());
    Ok(())
}

fn handle_phantom(args: PhantomArgs) -> Result<(), AppError> {
    let config = PhantomConfig {
        dims: (args.nx, args.ny, args.nz),
        voxel_size: (args.voxel_mm, args.voxel_mm, args.voxel_mm),
        acquisition: acquisition_from_args(&args.acquisition),
        intensity_scale: args.intensity_scale,
        noise_sigma: args.noise_sigma,
        seed: args.seed,
    };
    let files = pipeline::run_phantom(&config, &args.out_dir, &NiftiStore)?;

    println!("Phantom written to {}", args.out_dir.display());
    println!("  inputs: {} {}", files.mprage.display(), files.fgatir.display());
    println!("  mask:   {} ({} foreground voxels)", files.mask.display(), files.foreground);
    println!("  truth:  {} {}", files.true_pd.display(), files.true_t1.display());
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<(), AppError> {
    let store = NiftiStore;
    for path in &args.paths {
        let volume = store.load(path)?;
        println!("{}", format_volume_info(path, &volume));
    }
    Ok(())
}

pub fn acquisition_from_args(args: &crate::cli::AcquisitionArgs) -> AcquisitionParameters {
    AcquisitionParameters {
        tr: args.tr,
        ti1: args.ti1,
        ti2: args.ti2,
        polarity1: args.polarity1,
        polarity2: args.polarity2,
    }
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    FitConfig {
        mprage: args.mprage.clone(),
        fgatir: args.fgatir.clone(),
        mask: args.mask.clone(),
        acquisition: acquisition_from_args(&args.acquisition),
        solver: args.solver.options(),
        num_workers: resolve_workers(&args.exec),
        slices_per_chunk: args.slices_per_chunk,
        out_dir: args.exec.out_dir.clone(),
    }
}

pub fn synth_config_from_args(args: &SynthArgs) -> Result<SynthConfig, AppError> {
    Ok(SynthConfig {
        pd_map: args.pd_map.clone(),
        t1_map: args.t1_map.clone(),
        tr: args.tr,
        grid: grid_from_args(&args.grid)?,
        num_workers: resolve_workers(&args.exec),
        out_dir: args.exec.out_dir.clone(),
        prefix: args.grid.prefix.clone(),
    })
}

fn grid_from_args(args: &GridArgs) -> Result<SynthesisGrid, AppError> {
    SynthesisGrid::new(args.ti_min, args.ti_max, args.ti_step)
}

/// Explicit `--workers` / `IRS_WORKERS`, else the machine's parallelism.
///
/// An explicit 0 is passed through so validation can reject it.
fn resolve_workers(args: &ExecArgs) -> usize {
    args.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}
