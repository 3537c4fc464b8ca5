//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and installs the logger
//! - runs the demo or a CSV fit through the shared pipeline
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;

use crate::cli::{Cli, Command, DemoArgs, FitArgs, RunArgs};
use crate::domain::{FitConfig, ModelKind};
use crate::error::AppError;
use crate::logging::{LogSettings, init};

pub mod pipeline;

/// Entry point for the `fpp` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let settings = LogSettings::from_env(cli.log_level.as_deref())?;
    init(&settings)?;

    let config = match &cli.command {
        Command::Demo(args) => demo_config_from_args(args),
        Command::Fit(args) => fit_config_from_args(args),
    };
    let run = match cli.command {
        Command::Demo(_) => pipeline::run_demo(&config)?,
        Command::Fit(_) => pipeline::run_fit(&config)?,
    };
    print_run(&run, &config)?;
    export(&run, &config)
}

fn print_run(run: &pipeline::RunOutput, config: &FitConfig) -> Result<(), AppError> {
    let outcome = &run.outcome;
    println!("{}", crate::report::format_run_summary(outcome));
    if run.skipped_rows > 0 {
        println!("Skipped {} unusable input row(s)\n", run.skipped_rows);
    }
    println!("{}", crate::report::format_report(Some(outcome))?);
    if !run.known.is_empty() {
        println!("{}", crate::report::format_comparison(&run.known));
    }
    println!("{}", crate::report::format_quality(outcome));

    if config.collect_stats {
        let rows = crate::report::performance_summary(outcome)?;
        println!("{}", crate::report::format_performance(&rows));
        if config.plot {
            println!("{}", crate::plot::render_performance_bars(&rows, config.plot_width));
        }
    }

    if config.plot {
        println!(
            "{}",
            crate::plot::render_fit_plot(&run.observed, &run.curve, config.plot_width, config.plot_height)
        );
        println!(
            "{}",
            crate::plot::render_quality_plot(&outcome.statistics, config.plot_width, config.plot_height)
        );
    }
    Ok(())
}

fn export(run: &pipeline::RunOutput, config: &FitConfig) -> Result<(), AppError> {
    if let Some(path) = &config.export_summary {
        crate::io::write_summary_json(path, &run.outcome)?;
    }
    if let Some(path) = &config.export_stats {
        crate::io::write_statistics_csv(path, &run.outcome.statistics)?;
    }
    Ok(())
}

pub fn demo_config_from_args(args: &DemoArgs) -> FitConfig {
    let mut config = config_from_run_args(&args.run);
    config.noise = args.noise;
    config
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    let mut config = config_from_run_args(&args.run);
    config.data_path = Some(args.data.clone());
    config.model = args.model;
    config.param_overrides = args.params.clone();
    config
}

fn config_from_run_args(args: &RunArgs) -> FitConfig {
    FitConfig {
        data_path: None,
        model: ModelKind::Parabola,
        param_overrides: Vec::new(),
        methods: args.methods.clone(),
        method_options: args.options.clone(),
        max_nfev: (!args.unbounded).then_some(args.max_nfev),
        restarts: args.restarts,
        sampling: args.sampling,
        seed: args.seed,
        jitter: args.jitter,
        parallel: args.parallel,
        noise: 0.0,
        collect_stats: args.stats,
        plot: args.plot,
        plot_width: args.width,
        plot_height: args.height,
        export_summary: args.export.clone(),
        export_stats: args.export_stats.clone(),
    }
}
