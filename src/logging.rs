//! Logger setup for the `fpp` binary.
//!
//! The library only emits through the `log` macros; this module installs a
//! `simplelog` terminal logger (stderr) plus an optional file logger.
//!
//! Settings come from the environment (an optional `.env` is loaded first):
//! - `FITTERPP_LOG`: error|warn|info|debug|trace|off (default `info`)
//! - `FITTERPP_LOG_FILE`: path of a log file to write as well
//!
//! `--log-level` on the command line wins over `FITTERPP_LOG`.

use std::fs::File;
use std::path::PathBuf;

use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use crate::error::FitError;

pub const LOG_LEVEL_ENV: &str = "FITTERPP_LOG";
pub const LOG_FILE_ENV: &str = "FITTERPP_LOG_FILE";

#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file: None,
        }
    }
}

impl LogSettings {
    /// Read settings from the process environment after loading `.env`.
    pub fn from_env(cli_level: Option<&str>) -> Result<Self, FitError> {
        dotenvy::dotenv().ok();
        Self::resolve(
            cli_level,
            std::env::var(LOG_LEVEL_ENV).ok(),
            std::env::var(LOG_FILE_ENV).ok(),
        )
    }

    pub fn resolve(
        cli_level: Option<&str>,
        env_level: Option<String>,
        env_file: Option<String>,
    ) -> Result<Self, FitError> {
        let level = match cli_level.or(env_level.as_deref()) {
            Some(raw) => parse_level(raw)?,
            None => LevelFilter::Info,
        };
        let file = env_file
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .map(PathBuf::from);
        Ok(Self { level, file })
    }
}

pub fn parse_level(raw: &str) -> Result<LevelFilter, FitError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "off" => Ok(LevelFilter::Off),
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        other => Err(FitError::InvalidConfig(format!(
            "log level must be one of off, error, warn, info, debug, trace (got '{other}')"
        ))),
    }
}

/// Install the global logger.
///
/// A logger that is already installed is left in place.
pub fn init(settings: &LogSettings) -> Result<(), FitError> {
    let config = ConfigBuilder::new().set_target_level(LevelFilter::Off).build();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        settings.level,
        config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = &settings.file {
        let file = File::create(path)
            .map_err(|e| FitError::Io(format!("failed to create log file '{}': {e}", path.display())))?;
        loggers.push(WriteLogger::new(settings.level, Config::default(), file));
    }
    if CombinedLogger::init(loggers).is_err() {
        log::debug!("logger already installed");
    }
    Ok(())
}
