//! `fitterpp` library crate.
//!
//! Runs a sequence of minimization methods over a residual function, keeps
//! the best point any evaluation produced, and restarts the sequence from
//! alternative starting points.
//!
//! The binary (`fpp`) is a thin wrapper around this library so that core
//! logic is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod minimize;
pub mod models;
pub mod plot;
pub mod report;
pub mod table;
