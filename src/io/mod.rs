//! Input/output helpers.
//!
//! - CSV ingest of reference tables (`ingest`)
//! - result exports (JSON summary, statistics CSV) (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
