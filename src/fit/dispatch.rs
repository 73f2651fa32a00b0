//! Parallel fitting over z-slab chunks.
//!
//! The volume is cut along its slowest axis into contiguous slabs. Each slab is
//! one task on a dedicated rayon pool of `num_workers` threads. A task reads only
//! its slice of the two inputs and the mask, and writes only its disjoint slice of
//! the preallocated PD/T1 outputs (`par_chunks_mut`), so no locking is needed.
//!
//! Merging is positional, and the diagnostics are summed as integers. The maps
//! are therefore bit-identical for any worker count or completion order.
//!
//! Failures:
//! - per-voxel numerical failures stay inside the solver (sentinel + count)
//! - a non-finite foreground intensity or a panic inside a chunk is fatal;
//!   `try_reduce` stops handing out remaining chunks and the error is returned
//!   with no partial maps

use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};

use rayon::prelude::*;

use crate::domain::{FitDiagnostics, Mask, Volume, VoxelStatus};
use crate::error::AppError;
use crate::fit::solver::VoxelSolver;

/// Target number of chunks per worker when the caller does not fix the slab size.
const CHUNKS_PER_WORKER: usize = 4;

/// Fitted maps plus per-status counts.
#[derive(Debug, Clone)]
pub struct FitOutput {
    pub pd: Volume,
    pub t1: Volume,
    pub diagnostics: FitDiagnostics,
}

/// Slab decomposition of the z axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub slices_per_chunk: usize,
    /// z ranges, contiguous, disjoint and covering `0..nz`.
    pub ranges: Vec<Range<usize>>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Split `0..nz` into slabs of `slices_per_chunk` (last one may be shorter).
pub fn plan_chunks(
    nz: usize,
    num_workers: usize,
    slices_per_chunk: Option<usize>,
) -> Result<ChunkPlan, AppError> {
    if num_workers == 0 {
        return Err(AppError::config("Worker count must be >= 1."));
    }
    if nz == 0 {
        return Err(AppError::config("Cannot partition an empty volume (nz = 0)."));
    }
    let spc = match slices_per_chunk {
        Some(0) => return Err(AppError::config("Slices per chunk must be >= 1.")),
        Some(n) => n.min(nz),
        None => nz.div_ceil(num_workers * CHUNKS_PER_WORKER).max(1),
    };

    let ranges = (0..nz)
        .step_by(spc)
        .map(|z0| z0..(z0 + spc).min(nz))
        .collect();
    Ok(ChunkPlan {
        slices_per_chunk: spc,
        ranges,
    })
}

/// Build the bounded worker pool.
pub fn build_pool(num_workers: usize) -> Result<rayon::ThreadPool, AppError> {
    if num_workers == 0 {
        return Err(AppError::config("Worker count must be >= 1."));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .thread_name(|i| format!("irs-worker-{i}"))
        .build()
        .map_err(|e| AppError::worker(format!("Failed to create worker pool: {e}")))
}

/// Fit PD/T1 for every voxel of two compatible volumes.
pub fn fit_volumes(
    mprage: &Volume,
    fgatir: &Volume,
    mask: &Mask,
    solver: &VoxelSolver,
    num_workers: usize,
    slices_per_chunk: Option<usize>,
) -> Result<FitOutput, AppError> {
    let geometry = mprage.geometry();
    mprage.ensure_compatible(fgatir.geometry(), "input volumes (MPRAGE vs FGATIR)")?;
    mprage.ensure_compatible(mask.geometry(), "mask")?;

    let plan = plan_chunks(geometry.dims.2, num_workers, slices_per_chunk)?;
    let chunk_len = plan.slices_per_chunk * geometry.slice_len();
    if chunk_len == 0 {
        return Err(AppError::config(format!(
            "Cannot partition a volume with an empty slice (shape {:?}).",
            geometry.dims
        )));
    }
    log::debug!(
        "Fitting {} voxels in {} chunk(s) of {} slice(s) on {} worker(s)",
        geometry.len(),
        plan.len(),
        plan.slices_per_chunk,
        num_workers
    );

    let n = geometry.len();
    let mut pd = vec![0.0; n];
    let mut t1 = vec![0.0; n];
    let (m1, m2, fg) = (mprage.data(), fgatir.data(), mask.data());

    let pool = build_pool(num_workers)?;
    let diagnostics = pool.install(|| {
        pd.par_chunks_mut(chunk_len)
            .zip(t1.par_chunks_mut(chunk_len))
            .enumerate()
            .map(|(index, (pd_out, t1_out))| {
                let start = index * chunk_len;
                let end = start + pd_out.len();
                let input = ChunkInput {
                    index,
                    offset: start,
                    magnitude1: &m1[start..end],
                    magnitude2: &m2[start..end],
                    mask: &fg[start..end],
                };
                run_guarded(index, || solve_chunk(&input, solver, pd_out, t1_out))
            })
            .try_reduce(FitDiagnostics::default, |a, b| Ok(a.merge(b)))
    })?;

    Ok(FitOutput {
        pd: Volume::new(geometry.clone(), pd)?,
        t1: Volume::new(geometry.clone(), t1)?,
        diagnostics,
    })
}

struct ChunkInput<'a> {
    index: usize,
    offset: usize,
    magnitude1: &'a [f64],
    magnitude2: &'a [f64],
    mask: &'a [bool],
}

fn solve_chunk(
    input: &ChunkInput<'_>,
    solver: &VoxelSolver,
    pd_out: &mut [f64],
    t1_out: &mut [f64],
) -> Result<FitDiagnostics, AppError> {
    let mut diag = FitDiagnostics::default();
    let voxels = input
        .magnitude1
        .iter()
        .zip(input.magnitude2)
        .zip(input.mask)
        .zip(pd_out.iter_mut().zip(t1_out.iter_mut()))
        .enumerate();

    for (i, (((&a, &b), &foreground), (pd, t1))) in voxels {
        if !foreground {
            *pd = 0.0;
            *t1 = 0.0;
            diag.record(VoxelStatus::Background);
            continue;
        }
        if !(a.is_finite() && b.is_finite()) {
            return Err(AppError::worker(format!(
                "Non-finite input intensity at voxel {} (chunk {}): mprage={a}, fgatir={b}.",
                input.offset + i,
                input.index
            )));
        }
        let est = solver.solve(a, b);
        *pd = est.pd;
        *t1 = est.t1;
        diag.record(est.status);
    }

    log::debug!(
        "chunk {}: {} voxels, {} valid, {} invalid",
        input.index,
        diag.total,
        diag.valid,
        diag.invalid()
    );
    Ok(diag)
}

/// Run one chunk's work, turning a panic into a worker error.
fn run_guarded<F>(index: usize, work: F) -> Result<FitDiagnostics, AppError>
where
    F: FnOnce() -> Result<FitDiagnostics, AppError>,
{
    catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
        Err(AppError::worker(format!(
            "Worker panicked on chunk {index}: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
