//! Labelled tables and their alignment against reference data.

pub mod align;
pub mod frame;

pub use align::*;
pub use frame::*;
