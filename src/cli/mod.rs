//! Command-line parsing for the `fpp` fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{MAX_NFEV_DEFAULT, ModelKind, SamplingStrategy};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fpp", version, about = "Multi-method, multi-start nonlinear least-squares fitter")]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace, off). Overrides FITTERPP_LOG.
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit `mult * (x - center)^2` to generated data with known parameters.
    Demo(DemoArgs),
    /// Fit a built-in model to every value column of a CSV table.
    Fit(FitArgs),
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Standard deviation of Gaussian noise added to the generated data.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Reference CSV: first column is the row key, the rest are value columns.
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Model fitted to every value column.
    #[arg(long, value_enum, default_value_t = ModelKind::Parabola)]
    pub model: ModelKind,

    /// Override a parameter default: `name=value` or `name=value:lower:upper`.
    #[arg(long = "param", value_name = "SPEC")]
    pub params: Vec<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Options shared by every fitting command.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Method to run, in order (repeatable). Defaults to differential_evolution then leastsq.
    #[arg(long = "method", value_name = "NAME")]
    pub methods: Vec<String>,

    /// `key=value` option passed to every method (repeatable).
    #[arg(long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Function evaluation bound per method.
    #[arg(long, default_value_t = MAX_NFEV_DEFAULT)]
    pub max_nfev: usize,

    /// Drop the evaluation bound entirely.
    #[arg(long)]
    pub unbounded: bool,

    /// Extra starting points sampled within the parameter bounds.
    #[arg(long, default_value_t = 0)]
    pub restarts: usize,

    /// How restart starting points are drawn.
    #[arg(long, value_enum, default_value_t = SamplingStrategy::LatinHypercube)]
    pub sampling: SamplingStrategy,

    /// Seed for restart sampling and demo noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Jitter Latin hypercube points within their strata.
    #[arg(long)]
    pub jitter: bool,

    /// Run restarts in parallel.
    #[arg(long)]
    pub parallel: bool,

    /// Collect per-evaluation timing and print performance statistics.
    #[arg(long)]
    pub stats: bool,

    /// Render ASCII plots in the terminal.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Export the fit summary to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Export per-evaluation statistics to CSV.
    #[arg(long = "export-stats", value_name = "CSV")]
    pub export_stats: Option<PathBuf>,
}
