//! Fitting orchestration.
//!
//! Responsibilities:
//!
//! - wrap user residual functions (plain, named, table-producing)
//! - track the best evaluation of each method run
//! - sequence methods and restarts, keeping the global champion

pub mod residual;
pub mod restart;
pub mod sequencer;
pub mod tracker;

pub use residual::*;
pub use restart::*;
pub use sequencer::*;
pub use tracker::*;
