//! Terminal formatting for fit, synthesis and inspection reports.

use std::path::Path;

use crate::domain::{AcquisitionParameters, FitDiagnostics, Volume};
use crate::fit::FitOutput;
use crate::io::TiEntry;
use crate::math::null_point;
use crate::report::{MapStats, fit_map_stats, volume_stats};

/// Format the fit report: acquisition, voxel accounting and map statistics.
pub fn format_fit_summary(acq: &AcquisitionParameters, output: &FitOutput, num_workers: usize) -> String {
    let mut out = String::new();
    let d = &output.diagnostics;
    let (nx, ny, nz) = output.t1.dims();

    out.push_str("=== irs - PD/T1 relaxometry ===\n");
    out.push_str(&format!(
        "TR: {} ms | TI1: {} ms ({:?}) | TI2: {} ms ({:?})\n",
        acq.tr, acq.ti1, acq.polarity1, acq.ti2, acq.polarity2
    ));
    out.push_str(&format!("Grid: {nx} x {ny} x {nz} | workers: {num_workers}\n"));
    out.push_str(&format_diagnostics(d));

    let (pd, t1) = fit_map_stats(output);
    out.push_str("\nMap statistics (valid voxels)\n");
    out.push_str(&format!("{:<6} {}\n", "", stats_header()));
    out.push_str(&format!("{:<6} {}\n", "PD", fmt_stats(pd.as_ref())));
    out.push_str(&format!("{:<6} {}\n", "T1", fmt_stats(t1.as_ref())));
    if let Some(ti0) = t1.and_then(|s| null_point(s.median, acq.tr)) {
        out.push_str(&format!("Signal null at median T1: TI = {ti0:.1} ms\n"));
    }
    out
}

/// Per-status voxel accounting.
pub fn format_diagnostics(d: &FitDiagnostics) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Voxels: {} total | {} foreground | {} background\n",
        d.total,
        d.foreground(),
        d.background
    ));
    out.push_str(&format!(
        "Valid: {} | invalid: {} ({:.2}% of foreground)\n",
        d.valid,
        d.invalid(),
        100.0 * d.invalid_fraction()
    ));
    if d.invalid() > 0 {
        out.push_str(&format!(
            "  degenerate: {} | no bracket: {} | not converged: {} | non-physical: {}\n",
            d.degenerate, d.no_bracket, d.not_converged, d.non_physical
        ));
    }
    out
}

/// List the synthesized TIs.
pub fn format_synth_summary(tr: f64, entries: &[TiEntry]) -> String {
    let mut out = String::new();
    out.push_str("=== irs - multi-TI synthesis ===\n");
    out.push_str(&format!("TR: {tr} ms | volumes: {}\n", entries.len()));
    if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
        out.push_str(&format!("TI range: {} .. {} ms\n", first.ti_ms, last.ti_ms));
    }
    for e in entries {
        out.push_str(&format!("  [{:>3}] TI={:>8} ms  {}\n", e.k, e.ti_ms, e.file.display()));
    }
    out
}

/// Geometry and intensity summary of a single volume.
pub fn format_volume_info(path: &Path, volume: &Volume) -> String {
    let g = volume.geometry();
    let mut out = String::new();
    out.push_str(&format!("{}\n", path.display()));
    out.push_str(&format!("  shape: {:?}\n", g.dims));
    out.push_str(&format!(
        "  voxel size: {:.4} x {:.4} x {:.4} mm\n",
        g.voxel_size.0, g.voxel_size.1, g.voxel_size.2
    ));
    out.push_str("  affine:\n");
    let a = g.affine_row_major();
    for row in a.chunks(4) {
        out.push_str(&format!(
            "    [{:>10.4} {:>10.4} {:>10.4} {:>10.4}]\n",
            row[0], row[1], row[2], row[3]
        ));
    }
    let (all, nonzero) = volume_stats(volume);
    out.push_str(&format!("  {:<8} {}\n", "", stats_header()));
    out.push_str(&format!("  {:<8} {}\n", "all", fmt_stats(all.as_ref())));
    out.push_str(&format!("  {:<8} {}\n", "nonzero", fmt_stats(nonzero.as_ref())));
    out
}

fn stats_header() -> String {
    format!(
        "{:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "n", "mean", "median", "p05", "p95", "min", "max"
    )
}

fn fmt_stats(stats: Option<&MapStats>) -> String {
    match stats {
        Some(s) => format!(
            "{:>10} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
            s.count, s.mean, s.median, s.p05, s.p95, s.min, s.max
        ),
        None => format!("{:>10}", "-"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Geometry, Polarity, VoxelStatus};

    fn output_with_t1(t1: &[f64]) -> FitOutput {
        let g = Geometry::scaled((t1.len(), 1, 1), (1.0, 1.0, 1.0));
        let mut diagnostics = FitDiagnostics::default();
        for &v in t1 {
            diagnostics.record(if v > 0.0 { VoxelStatus::Valid } else { VoxelStatus::NoBracket });
        }
        FitOutput {
            pd: Volume::new(g.clone(), t1.iter().map(|&v| if v > 0.0 { 1.0 } else { 0.0 }).collect()).unwrap(),
            t1: Volume::new(g, t1.to_vec()).unwrap(),
            diagnostics,
        }
    }

    fn acquisition() -> AcquisitionParameters {
        AcquisitionParameters {
            tr: 3000.0,
            ti1: 900.0,
            ti2: 400.0,
            polarity1: Polarity::Positive,
            polarity2: Polarity::Negative,
        }
    }

    #[test]
    fn fit_summary_reports_null_ti_of_median_t1() {
        let output = output_with_t1(&[700.0, 800.0, 900.0, 0.0]);
        let text = format_fit_summary(&acquisition(), &output, 2);
        let expected = null_point(800.0, 3000.0).unwrap();
        assert!(text.contains(&format!("TI = {expected:.1} ms")), "{text}");
        assert!(text.contains("workers: 2"));
    }

    #[test]
    fn fit_summary_without_valid_voxels_has_no_null_ti() {
        let output = output_with_t1(&[0.0, 0.0]);
        let text = format_fit_summary(&acquisition(), &output, 1);
        assert!(!text.contains("Signal null"), "{text}");
    }

    #[test]
    fn diagnostics_breakdown_only_when_invalid() {
        let mut d = FitDiagnostics::default();
        d.record(VoxelStatus::Valid);
        assert!(!format_diagnostics(&d).contains("no bracket"));
        d.record(VoxelStatus::NoBracket);
        let text = format_diagnostics(&d);
        assert!(text.contains("no bracket: 1"));
        assert!(text.contains("50.00%"));
    }

    #[test]
    fn volume_info_lists_shape() {
        let g = Geometry::scaled((2, 2, 1), (1.0, 1.0, 1.0));
        let v = Volume::new(g, vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let text = format_volume_info(Path::new("x.nii"), &v);
        assert!(text.contains("shape: (2, 2, 1)"));
        assert!(text.contains("nonzero"));
    }
}
