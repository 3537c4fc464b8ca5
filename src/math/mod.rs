//! Mathematical utilities: least squares solves, sampling, and small statistics.

pub mod ols;
pub mod sampling;
pub mod stats;

pub use ols::*;
pub use sampling::*;
pub use stats::*;
