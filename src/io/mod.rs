//! Input/output helpers.
//!
//! - NIfTI volume persistence behind `VolumeStore` (`nifti_io`)
//! - run manifest JSON read/write (`manifest`)
//! - TI index CSV export (`export`)

pub mod export;
pub mod manifest;
pub mod nifti_io;

pub use export::*;
pub use manifest::*;
pub use nifti_io::*;
