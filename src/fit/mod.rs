//! PD/T1 relaxometry.
//!
//! Responsibilities:
//!
//! - solve the two-point inversion-recovery system for one voxel (`solver`)
//! - run that solver over a whole volume on a bounded worker pool (`dispatch`)

pub mod dispatch;
pub mod solver;

pub use dispatch::*;
pub use solver::*;
