//! Shared pipeline stages used by the subcommands.
//!
//! Each stage takes an explicit config plus a `VolumeStore`, so the same code
//! drives `irs fit`, `irs synth`, `irs run` and the integration tests:
//!
//! load -> validate -> fit/synthesize -> store -> record

use std::path::{Path, PathBuf};

use crate::data::{PhantomConfig, generate_phantom};
use crate::domain::{FitConfig, Geometry, Mask, SynthConfig, Volume};
use crate::error::AppError;
use crate::fit::{FitOutput, VoxelSolver, fit_volumes};
use crate::io::{
    FitRecord, MANIFEST_FILE, RunManifest, SynthRecord, TI_INDEX_FILE, TiEntry, VolumeStore, synth_file_name,
    write_manifest, write_ti_index_csv,
};
use crate::synth::{synthesize_each, validate_inputs};

pub const PD_MAP_FILE: &str = "pd_map.nii.gz";
pub const T1_MAP_FILE: &str = "t1_map.nii.gz";

/// Above this share of invalid foreground voxels the fit is logged as suspicious.
const INVALID_WARN_FRACTION: f64 = 0.05;

/// Outputs of the fit stage.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub output: FitOutput,
    pub pd_path: PathBuf,
    pub t1_path: PathBuf,
}

/// Outputs of the synthesis stage.
#[derive(Debug, Clone)]
pub struct SynthRun {
    pub geometry: Geometry,
    pub entries: Vec<TiEntry>,
    pub index_path: PathBuf,
}

/// Paths written by the phantom stage.
#[derive(Debug, Clone)]
pub struct PhantomFiles {
    pub mprage: PathBuf,
    pub fgatir: PathBuf,
    pub mask: PathBuf,
    pub true_pd: PathBuf,
    pub true_t1: PathBuf,
    pub foreground: usize,
}

pub fn ensure_out_dir(dir: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::io(format!("Failed to create output directory '{}': {e}", dir.display())))
}

/// Load the inputs, fit PD/T1 and store both maps in `config.out_dir`.
pub fn run_fit(config: &FitConfig, store: &dyn VolumeStore) -> Result<FitRun, AppError> {
    // Reject bad parameters before touching the (possibly large) inputs.
    let solver = VoxelSolver::new(config.acquisition, config.solver)?;
    if config.num_workers == 0 {
        return Err(AppError::config("num_workers must be >= 1."));
    }

    let mprage = store.load(&config.mprage)?;
    let fgatir = store.load(&config.fgatir)?;
    let mask = match &config.mask {
        Some(path) => store.load_mask(path)?,
        None => Mask::full(mprage.geometry().clone()),
    };
    log::info!(
        "Loaded {} and {} ({:?}, {} foreground voxels)",
        config.mprage.display(),
        config.fgatir.display(),
        mprage.dims(),
        mask.foreground_count()
    );

    let output = fit_volumes(&mprage, &fgatir, &mask, &solver, config.num_workers, config.slices_per_chunk)?;
    let d = &output.diagnostics;
    log::info!("Fit complete: {} valid, {} invalid of {} foreground voxels", d.valid, d.invalid(), d.foreground());
    if d.invalid_fraction() > INVALID_WARN_FRACTION {
        log::warn!(
            "{:.1}% of foreground voxels have no valid estimate (no bracket: {}, not converged: {}, degenerate: {}, non-physical: {}); check TI/TR and polarities",
            100.0 * d.invalid_fraction(),
            d.no_bracket,
            d.not_converged,
            d.degenerate,
            d.non_physical
        );
    }

    ensure_out_dir(&config.out_dir)?;
    let pd_path = config.out_dir.join(PD_MAP_FILE);
    let t1_path = config.out_dir.join(T1_MAP_FILE);
    store.store(&output.pd, &pd_path)?;
    store.store(&output.t1, &t1_path)?;
    log::info!("Wrote {} and {}", pd_path.display(), t1_path.display());

    Ok(FitRun {
        output,
        pd_path,
        t1_path,
    })
}

/// Load PD/T1 maps from disk and synthesize the TI sweep.
pub fn run_synth(config: &SynthConfig, store: &dyn VolumeStore) -> Result<SynthRun, AppError> {
    config.grid.validate()?;
    let pd = store.load(&config.pd_map)?;
    let t1 = store.load(&config.t1_map)?;
    synthesize_to_store(&pd, &t1, config, store)
}

/// Synthesize the sweep from in-memory maps, storing each volume as it is produced.
///
/// Writes one file per TI plus `ti_index.csv`. Nothing is created on disk when
/// the inputs are rejected.
pub fn synthesize_to_store(
    pd: &Volume,
    t1: &Volume,
    config: &SynthConfig,
    store: &dyn VolumeStore,
) -> Result<SynthRun, AppError> {
    validate_inputs(pd, t1, config.tr, &config.grid)?;
    ensure_out_dir(&config.out_dir)?;
    let mut entries = Vec::new();
    synthesize_each(pd, t1, config.tr, &config.grid, config.num_workers, |synth| {
        let name = synth_file_name(&config.prefix, synth.ti);
        store.store(&synth.volume, &config.out_dir.join(&name))?;
        log::info!("TI={} ms -> {name}", synth.ti);
        let k = entries.len();
        entries.push(TiEntry {
            k,
            ti_ms: synth.ti,
            file: PathBuf::from(name),
        });
        Ok(())
    })?;

    let index_path = config.out_dir.join(TI_INDEX_FILE);
    write_ti_index_csv(&index_path, &entries)?;
    Ok(SynthRun {
        geometry: pd.geometry().clone(),
        entries,
        index_path,
    })
}

pub fn fit_record(config: &FitConfig, run: &FitRun) -> FitRecord {
    FitRecord {
        mprage: config.mprage.clone(),
        fgatir: config.fgatir.clone(),
        mask: config.mask.clone(),
        acquisition: config.acquisition,
        solver: config.solver,
        num_workers: config.num_workers,
        diagnostics: run.output.diagnostics,
        pd_map: run.pd_path.clone(),
        t1_map: run.t1_path.clone(),
    }
}

pub fn synth_record(config: &SynthConfig, run: &SynthRun) -> SynthRecord {
    SynthRecord {
        pd_map: config.pd_map.clone(),
        t1_map: config.t1_map.clone(),
        tr: config.tr,
        grid: config.grid,
        volumes: run.entries.clone(),
    }
}

/// Write `run_manifest.json` into `out_dir` and return its path.
pub fn record_manifest(out_dir: &Path, manifest: &RunManifest) -> Result<PathBuf, AppError> {
    let path = out_dir.join(MANIFEST_FILE);
    write_manifest(&path, manifest)?;
    Ok(path)
}

/// Generate a phantom and write inputs, mask and ground truth into `out_dir`.
pub fn run_phantom(config: &PhantomConfig, out_dir: &Path, store: &dyn VolumeStore) -> Result<PhantomFiles, AppError> {
    let phantom = generate_phantom(config)?;
    ensure_out_dir(out_dir)?;

    let files = PhantomFiles {
        mprage: out_dir.join("mprage.nii.gz"),
        fgatir: out_dir.join("fgatir.nii.gz"),
        mask: out_dir.join("mask.nii.gz"),
        true_pd: out_dir.join("true_pd.nii.gz"),
        true_t1: out_dir.join("true_t1.nii.gz"),
        foreground: phantom.mask.foreground_count(),
    };
    store.store(&phantom.mprage, &files.mprage)?;
    store.store(&phantom.fgatir, &files.fgatir)?;
    store.store(&phantom.mask.to_volume(), &files.mask)?;
    store.store(&phantom.true_pd, &files.true_pd)?;
    store.store(&phantom.true_t1, &files.true_t1)?;
    log::info!("Phantom {:?} written to {}", config.dims, out_dir.display());
    Ok(files)
}
