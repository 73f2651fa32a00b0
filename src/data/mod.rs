//! Synthetic data generation.

pub mod phantom;

pub use phantom::*;
