//! Reporting utilities: map statistics and formatted terminal output.
//!
//! Formatting lives here so the numerical modules never print.

pub mod format;

pub use format::*;

use crate::domain::Volume;
use crate::fit::FitOutput;

/// Summary statistics over a set of voxels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p05: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
}

/// Statistics over the finite values at indices where `include(i)` holds.
///
/// Returns `None` when nothing is selected.
pub fn map_stats<F>(values: &[f64], include: F) -> Option<MapStats>
where
    F: Fn(usize) -> bool,
{
    let mut selected: Vec<f64> = values
        .iter()
        .enumerate()
        .filter(|(i, v)| include(*i) && v.is_finite())
        .map(|(_, &v)| v)
        .collect();
    if selected.is_empty() {
        return None;
    }
    selected.sort_by(f64::total_cmp);

    let n = selected.len();
    let mean = selected.iter().sum::<f64>() / n as f64;
    Some(MapStats {
        count: n,
        mean,
        median: percentile_sorted(&selected, 0.5),
        p05: percentile_sorted(&selected, 0.05),
        p95: percentile_sorted(&selected, 0.95),
        min: selected[0],
        max: selected[n - 1],
    })
}

/// Linear-interpolated percentile of an ascending slice (`q` in `[0, 1]`).
fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// PD and T1 statistics over voxels with a valid estimate (T1 > 0).
pub fn fit_map_stats(output: &FitOutput) -> (Option<MapStats>, Option<MapStats>) {
    let t1 = output.t1.data();
    let valid = |i: usize| t1[i] > 0.0;
    (map_stats(output.pd.data(), valid), map_stats(t1, valid))
}

/// Statistics over every voxel, and over the non-zero ones.
pub fn volume_stats(volume: &Volume) -> (Option<MapStats>, Option<MapStats>) {
    let data = volume.data();
    (map_stats(data, |_| true), map_stats(data, |i| data[i] != 0.0))
}
