//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - bounded parameters and ordered parameter sets (`Parameter`, `ParameterSet`)
//! - fitting methods and their keyword options (`FitterMethod`, `MethodOptions`)
//! - tracker and statistics outputs (`BestResult`, `MethodStatistics`, etc.)

pub mod method;
pub mod params;
pub mod types;

pub use method::*;
pub use params::*;
pub use types::*;
