//! Multi-TI synthesis.
//!
//! Given fitted PD/T1 maps, evaluate the forward inversion-recovery model at every
//! TI of a `SynthesisGrid` and emit one magnitude volume per TI, ordered by
//! increasing TI.
//!
//! - Sentinel or otherwise unusable voxels (T1 <= 0, non-finite PD/T1) map to 0.
//! - All configuration checks run before the first volume is computed.
//! - Within a TI the voxels are evaluated in parallel on the same bounded pool
//!   the fit uses; the result does not depend on the worker count.

use rayon::prelude::*;

use crate::domain::{SynthesisGrid, Volume};
use crate::error::AppError;
use crate::fit::build_pool;
use crate::math::{linear_inclusive, raw_factor};

/// Voxels per parallel work item within one TI.
const SYNTH_CHUNK: usize = 16 * 1024;

/// One synthetic inversion-recovery volume tagged with its TI (ms).
#[derive(Debug, Clone)]
pub struct SynthesizedVolume {
    pub ti: f64,
    pub volume: Volume,
}

/// TI sample points of a grid, validated.
pub fn ti_values(grid: &SynthesisGrid) -> Result<Vec<f64>, AppError> {
    grid.validate()?;
    linear_inclusive(grid.ti_min, grid.ti_max, grid.ti_step)
}

/// Check everything a sweep needs before any volume is produced.
///
/// Returns the TI sample points.
pub fn validate_inputs(pd: &Volume, t1: &Volume, tr: f64, grid: &SynthesisGrid) -> Result<Vec<f64>, AppError> {
    let tis = ti_values(grid)?;
    if !(tr.is_finite() && tr > 0.0) {
        return Err(AppError::config(format!("Invalid TR={tr} for synthesis (must be finite and > 0 ms).")));
    }
    pd.ensure_compatible(t1.geometry(), "PD and T1 maps")?;
    Ok(tis)
}

/// Magnitude signal for one voxel; 0 for sentinel or invalid parameters.
#[inline]
pub fn synth_voxel(pd: f64, t1: f64, ti: f64, tr: f64) -> f64 {
    if !(pd.is_finite() && t1.is_finite()) || t1 <= 0.0 {
        return 0.0;
    }
    (pd * raw_factor(ti, t1, tr)).abs()
}

/// Synthesize the whole sweep and collect it.
pub fn synthesize(
    pd: &Volume,
    t1: &Volume,
    tr: f64,
    grid: &SynthesisGrid,
    num_workers: usize,
) -> Result<Vec<SynthesizedVolume>, AppError> {
    let mut out = Vec::new();
    synthesize_each(pd, t1, tr, grid, num_workers, |v| {
        out.push(v);
        Ok(())
    })?;
    Ok(out)
}

/// Synthesize the sweep, handing each volume to `sink` as soon as it is ready.
///
/// Returns the number of volumes emitted. An error from `sink` stops the sweep.
pub fn synthesize_each<F>(
    pd: &Volume,
    t1: &Volume,
    tr: f64,
    grid: &SynthesisGrid,
    num_workers: usize,
    mut sink: F,
) -> Result<usize, AppError>
where
    F: FnMut(SynthesizedVolume) -> Result<(), AppError>,
{
    let tis = validate_inputs(pd, t1, tr, grid)?;
    let pool = build_pool(num_workers)?;

    let pd_data = pd.data();
    let t1_data = t1.data();
    for &ti in &tis {
        let mut out = vec![0.0; pd_data.len()];
        pool.install(|| {
            out.par_chunks_mut(SYNTH_CHUNK)
                .zip(pd_data.par_chunks(SYNTH_CHUNK))
                .zip(t1_data.par_chunks(SYNTH_CHUNK))
                .for_each(|((dst, pd_chunk), t1_chunk)| {
                    for ((d, &p), &t) in dst.iter_mut().zip(pd_chunk).zip(t1_chunk) {
                        *d = synth_voxel(p, t, ti, tr);
                    }
                });
        });
        log::debug!("synthesized TI={ti} ms");
        sink(SynthesizedVolume {
            ti,
            volume: Volume::new(pd.geometry().clone(), out)?,
        })?;
    }
    Ok(tis.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Geometry;
    use crate::math::magnitude_signal;

    fn maps(pd: &[f64], t1: &[f64]) -> (Volume, Volume) {
        let g = Geometry::scaled((pd.len(), 1, 1), (1.0, 1.0, 1.0));
        (
            Volume::new(g.clone(), pd.to_vec()).unwrap(),
            Volume::new(g, t1.to_vec()).unwrap(),
        )
    }

    #[test]
    fn grid_cardinality_and_order() {
        let grid = SynthesisGrid::new(400.0, 1400.0, 20.0).unwrap();
        let (pd, t1) = maps(&[1.0, 0.8], &[800.0, 1200.0]);
        let vols = synthesize(&pd, &t1, 3000.0, &grid, 2).unwrap();

        assert_eq!(vols.len(), 51);
        for (k, v) in vols.iter().enumerate() {
            assert_eq!(v.ti, 400.0 + 20.0 * k as f64);
        }
        assert_eq!(vols.last().map(|v| v.ti), Some(1400.0));
    }

    #[test]
    fn off_grid_max_is_not_emitted() {
        let grid = SynthesisGrid::new(400.0, 1410.0, 20.0).unwrap();
        let tis = ti_values(&grid).unwrap();
        assert_eq!(tis.len(), 51);
        assert_eq!(tis[50], 1400.0);
    }

    #[test]
    fn matches_forward_model_and_zeroes_sentinels() {
        let grid = SynthesisGrid::new(700.0, 900.0, 100.0).unwrap();
        let (pd, t1) = maps(&[1.0, 0.0, 2.0], &[800.0, 0.0, 1100.0]);
        let vols = synthesize(&pd, &t1, 3000.0, &grid, 1).unwrap();

        let at_800 = vols.iter().find(|v| v.ti == 800.0).unwrap();
        let expected = magnitude_signal(1.0, 800.0, 800.0, 3000.0).unwrap();
        assert!((at_800.volume.data()[0] - expected).abs() < 1e-12);
        assert_eq!(at_800.volume.data()[1], 0.0);
        let expected = magnitude_signal(2.0, 1100.0, 800.0, 3000.0).unwrap();
        assert!((at_800.volume.data()[2] - expected).abs() < 1e-12);
    }

    #[test]
    fn output_is_non_negative() {
        // TI=400 is before the null for T1=800, so the signed signal is negative.
        let grid = SynthesisGrid::new(300.0, 500.0, 100.0).unwrap();
        let (pd, t1) = maps(&[1.0], &[800.0]);
        for v in synthesize(&pd, &t1, 3000.0, &grid, 1).unwrap() {
            assert!(v.volume.data()[0] >= 0.0);
        }
    }

    #[test]
    fn invalid_configuration_emits_nothing() {
        let (pd, t1) = maps(&[1.0], &[800.0]);
        let bad = SynthesisGrid {
            ti_min: 1400.0,
            ti_max: 400.0,
            ti_step: 20.0,
        };
        let mut calls = 0;
        let err = synthesize_each(&pd, &t1, 3000.0, &bad, 1, |_| {
            calls += 1;
            Ok(())
        })
        .unwrap_err();
        assert!(err.is_config());
        assert_eq!(calls, 0);

        let zero_step = SynthesisGrid {
            ti_min: 400.0,
            ti_max: 1400.0,
            ti_step: 0.0,
        };
        assert!(synthesize(&pd, &t1, 3000.0, &zero_step, 1).unwrap_err().is_config());

        let good = SynthesisGrid::new(400.0, 1400.0, 20.0).unwrap();
        assert!(synthesize(&pd, &t1, 0.0, &good, 1).unwrap_err().is_config());

        let (other_pd, _) = maps(&[1.0, 2.0], &[800.0, 900.0]);
        assert!(synthesize(&other_pd, &t1, 3000.0, &good, 1).unwrap_err().is_config());
    }

    #[test]
    fn sink_error_stops_the_sweep() {
        let grid = SynthesisGrid::new(400.0, 1400.0, 20.0).unwrap();
        let (pd, t1) = maps(&[1.0], &[800.0]);
        let mut seen = 0;
        let err = synthesize_each(&pd, &t1, 3000.0, &grid, 1, |_| {
            seen += 1;
            if seen == 3 {
                Err(AppError::io("disk full"))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_IO);
        assert_eq!(seen, 3);
    }
}
