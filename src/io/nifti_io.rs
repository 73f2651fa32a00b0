//! NIfTI-1 persistence for volumes.
//!
//! The core only depends on the `VolumeStore` trait ("load a volume from a path",
//! "store a volume at a path"). `NiftiStore` is the on-disk implementation:
//!
//! - reading goes through the `nifti` crate (`.nii` and `.nii.gz`, gzip sniffed
//!   from the magic bytes, 4-D inputs reduced to their first frame)
//! - writing emits a single-file NIfTI-1 with float32 voxels and the affine in
//!   `srow_*`, gzipped when the path ends in `.nii.gz`

use std::io::{Cursor, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use nalgebra::{Matrix4, Vector3};
use ndarray::{Array, IxDyn};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::domain::{Geometry, Mask, Volume};
use crate::error::AppError;

const HEADER_SIZE: usize = 348;
/// Header plus the 4-byte "no extension" marker.
const VOX_OFFSET: usize = 352;
const DT_FLOAT32: i16 = 16;
/// `NIFTI_UNITS_MM | NIFTI_UNITS_MSEC`.
const XYZT_UNITS_MM_MS: u8 = 2 | 16;

/// Boundary between the numerical core and persistence.
pub trait VolumeStore {
    fn load(&self, path: &Path) -> Result<Volume, AppError>;
    fn store(&self, volume: &Volume, path: &Path) -> Result<(), AppError>;

    /// Load a mask; any non-zero voxel is foreground.
    fn load_mask(&self, path: &Path) -> Result<Mask, AppError> {
        self.load(path).map(|v| Mask::from_volume(&v))
    }
}

/// NIfTI-1 files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiStore;

impl VolumeStore for NiftiStore {
    fn load(&self, path: &Path) -> Result<Volume, AppError> {
        let bytes = std::fs::read(path)
            .map_err(|e| AppError::io(format!("Failed to read '{}': {e}", path.display())))?;
        decode_nifti(&bytes).map_err(|e| AppError::io(format!("'{}': {}", path.display(), e.message())))
    }

    fn store(&self, volume: &Volume, path: &Path) -> Result<(), AppError> {
        let raw = encode_nifti(volume)?;
        let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
            gzip(&raw)?
        } else {
            raw
        };
        std::fs::write(path, &bytes)
            .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", path.display())))
    }
}

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Decode `.nii` or `.nii.gz` bytes into a volume.
pub fn decode_nifti(bytes: &[u8]) -> Result<Volume, AppError> {
    let obj = if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes)))
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
    }
    .map_err(|e| AppError::io(format!("Malformed NIfTI: {e}")))?;

    let header = obj.header().clone();
    if (header.dim[0] as usize) < 3 {
        return Err(AppError::io(format!("Expected at least a 3-D volume, got {}-D.", header.dim[0])));
    }

    let array: Array<f64, IxDyn> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| AppError::io(format!("Failed to convert NIfTI voxels: {e}")))?;
    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(AppError::io(format!("Expected at least a 3-D array, got {}-D.", shape.len())));
    }

    // Flatten in Fortran order; keep only the first frame of 4-D inputs.
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let mut data = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let v = if shape.len() == 3 {
                    array[[i, j, k]]
                } else {
                    array[[i, j, k, 0]]
                };
                data.push(v);
            }
        }
    }

    let voxel_size = (
        header.pixdim[1] as f64,
        header.pixdim[2] as f64,
        header.pixdim[3] as f64,
    );
    Volume::new(Geometry::new((nx, ny, nz), voxel_size, header_affine(&header)), data)
}

/// Prefer the sform; fall back to axis-aligned voxel scaling.
fn header_affine(header: &NiftiHeader) -> Matrix4<f64> {
    if header.sform_code > 0 {
        let (x, y, z) = (&header.srow_x, &header.srow_y, &header.srow_z);
        Matrix4::new(
            x[0] as f64, x[1] as f64, x[2] as f64, x[3] as f64,
            y[0] as f64, y[1] as f64, y[2] as f64, y[3] as f64,
            z[0] as f64, z[1] as f64, z[2] as f64, z[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        )
    } else {
        Matrix4::new_nonuniform_scaling(&Vector3::new(
            header.pixdim[1] as f64,
            header.pixdim[2] as f64,
            header.pixdim[3] as f64,
        ))
    }
}

/// Encode a volume as uncompressed single-file NIfTI-1 (float32).
pub fn encode_nifti(volume: &Volume) -> Result<Vec<u8>, AppError> {
    let geometry = volume.geometry();
    let (nx, ny, nz) = geometry.dims;
    for (axis, n) in [("x", nx), ("y", ny), ("z", nz)] {
        if n == 0 || n > i16::MAX as usize {
            return Err(AppError::io(format!("Axis {axis} length {n} cannot be stored in NIfTI-1.")));
        }
    }
    let (vsx, vsy, vsz) = geometry.voxel_size;

    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());

    let dim: [i16; 8] = [3, nx as i16, ny as i16, nz as i16, 1, 1, 1, 1];
    for (i, d) in dim.iter().enumerate() {
        let off = 40 + i * 2;
        header[off..off + 2].copy_from_slice(&d.to_le_bytes());
    }
    header[70..72].copy_from_slice(&DT_FLOAT32.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, p) in pixdim.iter().enumerate() {
        let off = 76 + i * 4;
        header[off..off + 4].copy_from_slice(&p.to_le_bytes());
    }
    header[108..112].copy_from_slice(&(VOX_OFFSET as f32).to_le_bytes());
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());
    header[123] = XYZT_UNITS_MM_MS;

    let descrip = b"ir-synth";
    header[148..148 + descrip.len()].copy_from_slice(descrip);

    // sform_code = 1 (scanner anatomical), rows 0..3 of the affine.
    header[254..256].copy_from_slice(&1i16.to_le_bytes());
    let affine = geometry.affine_row_major();
    for (row, base) in [(0usize, 280usize), (1, 296), (2, 312)] {
        for c in 0..4 {
            let off = base + c * 4;
            header[off..off + 4].copy_from_slice(&(affine[row * 4 + c] as f32).to_le_bytes());
        }
    }
    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(VOX_OFFSET + volume.data().len() * 4);
    buffer.extend_from_slice(&header);
    buffer.extend_from_slice(&[0u8; 4]);
    for &v in volume.data() {
        buffer.extend_from_slice(&(v as f32).to_le_bytes());
    }
    Ok(buffer)
}

fn gzip(raw: &[u8]) -> Result<Vec<u8>, AppError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(raw)
        .map_err(|e| AppError::io(format!("Gzip compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| AppError::io(format!("Gzip finish failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Volume {
        let mut affine = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 1.0, 1.5));
        affine[(0, 3)] = -90.0;
        affine[(1, 3)] = -126.0;
        affine[(2, 3)] = -72.0;
        let g = Geometry::new((3, 2, 2), (1.0, 1.0, 1.5), affine);
        let data = (0..12).map(|i| i as f64 * 0.5).collect();
        Volume::new(g, data).unwrap()
    }

    #[test]
    fn encoded_header_layout() {
        let bytes = encode_nifti(&sample()).unwrap();
        assert_eq!(bytes.len(), VOX_OFFSET + 12 * 4);
        assert_eq!(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 348);
        assert_eq!(&bytes[344..348], b"n+1\0");
        assert_eq!(i16::from_le_bytes([bytes[70], bytes[71]]), DT_FLOAT32);
        assert_eq!(i16::from_le_bytes([bytes[42], bytes[43]]), 3);
    }

    #[test]
    fn decode_inverts_encode() {
        let vol = sample();
        let back = decode_nifti(&encode_nifti(&vol).unwrap()).unwrap();
        assert_eq!(back.dims(), (3, 2, 2));
        assert_eq!(back.data(), vol.data());
        assert_eq!(back.geometry().affine, vol.geometry().affine);
        assert_eq!(back.get(2, 1, 1), vol.get(2, 1, 1));
    }

    #[test]
    fn decode_accepts_gzip() {
        let vol = sample();
        let gz = gzip(&encode_nifti(&vol).unwrap()).unwrap();
        assert!(is_gzip(&gz));
        assert_eq!(decode_nifti(&gz).unwrap().data(), vol.data());
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_nifti(&[0u8; 16]).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_IO);
    }

    #[test]
    fn affine_falls_back_to_pixdim() {
        let mut header = NiftiHeader::default();
        header.pixdim[1] = 1.0;
        header.pixdim[2] = 2.0;
        header.pixdim[3] = 3.0;
        header.sform_code = 0;

        let a = header_affine(&header);
        assert_eq!(a[(0, 0)], 1.0);
        assert_eq!(a[(1, 1)], 2.0);
        assert_eq!(a[(2, 2)], 3.0);
        assert_eq!(a[(3, 3)], 1.0);
    }
}
