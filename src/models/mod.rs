//! Built-in curve models.
//!
//! Models are implemented as small, pure functions so the CLI can wrap them
//! as residual closures or table-producing functions.

pub mod model;

pub use model::*;
