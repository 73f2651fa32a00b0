//! Dense 3-D volumes and foreground masks.
//!
//! Voxels are stored flat in NIfTI (Fortran) order so that a z-slab is a
//! contiguous run of memory:
//!
//! ```text
//! index = x + y*nx + z*nx*ny
//! ```

use nalgebra::Matrix4;

use crate::error::AppError;

/// Grid shape, voxel size and voxel-to-world transform shared by a family of volumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// `(nx, ny, nz)`.
    pub dims: (usize, usize, usize),
    /// Voxel size in mm.
    pub voxel_size: (f64, f64, f64),
    /// Voxel index to physical (scanner) coordinates.
    pub affine: Matrix4<f64>,
}

impl Geometry {
    pub fn new(dims: (usize, usize, usize), voxel_size: (f64, f64, f64), affine: Matrix4<f64>) -> Self {
        Self {
            dims,
            voxel_size,
            affine,
        }
    }

    /// Axis-aligned geometry with the affine built from the voxel size.
    pub fn scaled(dims: (usize, usize, usize), voxel_size: (f64, f64, f64)) -> Self {
        let affine = Matrix4::new_nonuniform_scaling(&nalgebra::Vector3::new(
            voxel_size.0,
            voxel_size.1,
            voxel_size.2,
        ));
        Self::new(dims, voxel_size, affine)
    }

    pub fn len(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Voxels in one z-slice.
    pub fn slice_len(&self) -> usize {
        self.dims.0 * self.dims.1
    }

    /// Two geometries are compatible iff shape and affine match exactly.
    pub fn is_compatible(&self, other: &Geometry) -> bool {
        self.dims == other.dims && self.affine == other.affine
    }

    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.dims.0 + z * self.dims.0 * self.dims.1
    }

    /// Affine flattened row-major (the NIfTI `srow_*` layout plus the last row).
    pub fn affine_row_major(&self) -> [f64; 16] {
        let mut out = [0.0; 16];
        for r in 0..4 {
            for c in 0..4 {
                out[r * 4 + c] = self.affine[(r, c)];
            }
        }
        out
    }
}

/// A dense real-valued volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    geometry: Geometry,
    data: Vec<f64>,
}

impl Volume {
    pub fn new(geometry: Geometry, data: Vec<f64>) -> Result<Self, AppError> {
        if data.len() != geometry.len() {
            return Err(AppError::config(format!(
                "Volume data has {} voxels but shape {:?} needs {}.",
                data.len(),
                geometry.dims,
                geometry.len()
            )));
        }
        Ok(Self { geometry, data })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.geometry.dims
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> f64 {
        self.data[self.geometry.index(x, y, z)]
    }

    pub fn is_compatible(&self, other: &Volume) -> bool {
        self.geometry.is_compatible(&other.geometry)
    }

    /// Fail with a configuration error naming both sides when geometries differ.
    pub fn ensure_compatible(&self, other: &Geometry, what: &str) -> Result<(), AppError> {
        if self.geometry.is_compatible(other) {
            return Ok(());
        }
        Err(AppError::config(format!(
            "Incompatible {what}: shape {:?} vs {:?}, affines {}.",
            self.geometry.dims,
            other.dims,
            if self.geometry.affine == other.affine {
                "match"
            } else {
                "differ"
            }
        )))
    }
}

/// Boolean foreground mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    geometry: Geometry,
    data: Vec<bool>,
}

impl Mask {
    pub fn new(geometry: Geometry, data: Vec<bool>) -> Result<Self, AppError> {
        if data.len() != geometry.len() {
            return Err(AppError::config(format!(
                "Mask has {} voxels but shape {:?} needs {}.",
                data.len(),
                geometry.dims,
                geometry.len()
            )));
        }
        Ok(Self { geometry, data })
    }

    /// Every voxel is foreground.
    pub fn full(geometry: Geometry) -> Self {
        let data = vec![true; geometry.len()];
        Self { geometry, data }
    }

    /// Any non-zero voxel is foreground.
    pub fn from_volume(volume: &Volume) -> Self {
        Self {
            geometry: volume.geometry().clone(),
            data: volume.data().iter().map(|&v| v != 0.0).collect(),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn data(&self) -> &[bool] {
        &self.data
    }

    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&m| m).count()
    }

    pub fn to_volume(&self) -> Volume {
        Volume {
            geometry: self.geometry.clone(),
            data: self.data.iter().map(|&m| if m { 1.0 } else { 0.0 }).collect(),
        }
    }
}
