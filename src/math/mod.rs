//! Numerical utilities: the IR signal model, bracketing root finding and sample grids.

pub mod grid;
pub mod roots;
pub mod signal;

pub use grid::*;
pub use roots::*;
pub use signal::*;
