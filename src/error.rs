//! Error types.
//!
//! - `FitError` is the library taxonomy. Evaluation-level variants abort one
//!   evaluation, `MethodFailure` aborts one method, and only
//!   `FatalOptimizationFailure` aborts a whole fit.
//! - `AppError` carries a process exit code for the `fpp` binary.

use thiserror::Error;

/// Errors produced by the fitting library.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// A parameter was constructed or updated with invalid bounds/value.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A parameter name appears twice in one set.
    #[error("Duplicate parameter name '{0}'")]
    DuplicateParameter(String),

    /// The residual function was invoked with a different set of names than it declares.
    #[error("Missing or extra parameters on call to fitter function (missing: {missing:?}, extra: {extra:?})")]
    ParameterMismatch { missing: Vec<String>, extra: Vec<String> },

    /// Model output and reference data disagree in shape (rows, columns).
    #[error("Shape mismatch: expected {expected:?} (rows, columns), got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Model output and reference data share no rows or no columns.
    #[error("Model output and reference data have no rows/columns in common")]
    EmptyAlignment,

    /// A residual component was NaN or infinite.
    #[error("Non-finite residual at position {index}")]
    NonFiniteResidual { index: usize },

    /// Every residual was finite but their sum of squares overflowed.
    #[error("Sum of squares is not finite")]
    NonFiniteSumSquares,

    /// The residual function returned an empty vector.
    #[error("Residual function returned no residuals")]
    EmptyResiduals,

    /// The user function reported a failure of its own.
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// The minimizer failed for a single method of the sequence.
    #[error("Method '{method}' failed: {reason}")]
    MethodFailure { method: String, reason: String },

    /// No minimizer is registered under this name.
    #[error("Unknown fitting method '{0}'")]
    UnknownMethod(String),

    /// Every method of a pass failed (or no evaluation ever succeeded).
    #[error("Optimization failed: {}", .failures.join("; "))]
    FatalOptimizationFailure { failures: Vec<String> },

    /// Invalid fitter/sampler/CLI configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timing statistics were requested but not collected.
    #[error("Must enable statistics collection to get {0}")]
    StatisticsNotCollected(&'static str),

    /// File or stream error (message only, so the enum stays `Clone`).
    #[error("I/O error: {0}")]
    Io(String),
}

impl FitError {
    pub fn method_failure(method: &str, reason: impl Into<String>) -> Self {
        Self::MethodFailure {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that only invalidate a single evaluation.
    pub fn is_evaluation_error(&self) -> bool {
        matches!(
            self,
            Self::ParameterMismatch { .. }
                | Self::ShapeMismatch { .. }
                | Self::EmptyAlignment
                | Self::NonFiniteResidual { .. }
                | Self::NonFiniteSumSquares
                | Self::EmptyResiduals
                | Self::Evaluation(_)
        )
    }
}

impl From<std::io::Error> for FitError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<FitError> for AppError {
    fn from(value: FitError) -> Self {
        let code = match &value {
            FitError::InvalidParameter { .. }
            | FitError::DuplicateParameter(_)
            | FitError::InvalidConfig(_)
            | FitError::UnknownMethod(_)
            | FitError::StatisticsNotCollected(_)
            | FitError::Io(_) => 2,
            FitError::EmptyAlignment | FitError::EmptyResiduals => 3,
            _ => 4,
        };
        AppError::new(code, value.to_string())
    }
}
