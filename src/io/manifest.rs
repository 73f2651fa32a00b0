//! Read/write the run manifest (JSON).
//!
//! The manifest is the portable record of a run:
//! - input paths and the acquisition/solver settings used
//! - grid geometry of the maps
//! - fit diagnostics (per-status voxel counts)
//! - every synthesized TI with its file name

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AcquisitionParameters, FitDiagnostics, Geometry, SolverOptions, SynthesisGrid};
use crate::error::AppError;

pub const MANIFEST_FILE: &str = "run_manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub tool: String,
    pub version: String,
    pub created: DateTime<Utc>,
    pub geometry: GeometryRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synth: Option<SynthRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryRecord {
    pub dims: [usize; 3],
    pub voxel_size_mm: [f64; 3],
    /// Row-major 4x4 voxel-to-world affine.
    pub affine: [f64; 16],
}

impl From<&Geometry> for GeometryRecord {
    fn from(g: &Geometry) -> Self {
        Self {
            dims: [g.dims.0, g.dims.1, g.dims.2],
            voxel_size_mm: [g.voxel_size.0, g.voxel_size.1, g.voxel_size.2],
            affine: g.affine_row_major(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRecord {
    pub mprage: PathBuf,
    pub fgatir: PathBuf,
    pub mask: Option<PathBuf>,
    pub acquisition: AcquisitionParameters,
    pub solver: SolverOptions,
    pub num_workers: usize,
    pub diagnostics: FitDiagnostics,
    pub pd_map: PathBuf,
    pub t1_map: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthRecord {
    pub pd_map: PathBuf,
    pub t1_map: PathBuf,
    pub tr: f64,
    pub grid: SynthesisGrid,
    pub volumes: Vec<TiEntry>,
}

/// One emitted synthetic volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiEntry {
    pub k: usize,
    pub ti_ms: f64,
    pub file: PathBuf,
}

impl RunManifest {
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created: Utc::now(),
            geometry: geometry.into(),
            fit: None,
            synth: None,
        }
    }
}

/// Write the manifest as pretty JSON.
pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create manifest '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, manifest)
        .map_err(|e| AppError::io(format!("Failed to write manifest JSON: {e}")))?;
    Ok(())
}

/// Read a manifest written by a previous run.
pub fn read_manifest(path: &Path) -> Result<RunManifest, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open manifest '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::io(format!("Invalid manifest JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Polarity;

    #[test]
    fn manifest_survives_json() {
        let geometry = Geometry::scaled((2, 3, 4), (1.0, 1.0, 1.2));
        let mut manifest = RunManifest::new(&geometry);
        manifest.fit = Some(FitRecord {
            mprage: "mprage.nii.gz".into(),
            fgatir: "fgatir.nii.gz".into(),
            mask: None,
            acquisition: AcquisitionParameters {
                tr: 3000.0,
                ti1: 900.0,
                ti2: 400.0,
                polarity1: Polarity::Positive,
                polarity2: Polarity::Negative,
            },
            solver: SolverOptions::default(),
            num_workers: 4,
            diagnostics: FitDiagnostics::default(),
            pd_map: "pd.nii.gz".into(),
            t1_map: "t1.nii.gz".into(),
        });

        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"polarity2\":\"negative\""));
        assert!(!json.contains("\"synth\""));

        let back: RunManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.geometry.dims, [2, 3, 4]);
        let fit = back.fit.unwrap();
        assert_eq!(fit.acquisition.ti2, 400.0);
        assert_eq!(fit.solver, SolverOptions::default());
    }
}
