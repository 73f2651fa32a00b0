//! `ir-synth` library crate.
//!
//! The binary (`irs`) is a thin wrapper around this library so that:
//!
//! - the voxel solver, dispatcher and synthesizer are testable without files
//! - persistence stays behind `io::VolumeStore`
//! - the pipeline stages can be driven from tests exactly as the CLI drives them

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod report;
pub mod synth;
