//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - spatial containers (`Geometry`, `Volume`, `Mask`)
//! - acquisition and solver settings (`AcquisitionParameters`, `Polarity`, `SolverOptions`)
//! - fit outputs (`VoxelEstimate`, `VoxelStatus`, `FitDiagnostics`)
//! - synthesis inputs (`SynthesisGrid`) and CLI-derived configs

pub mod types;
pub mod volume;

pub use types::*;
pub use volume::*;
