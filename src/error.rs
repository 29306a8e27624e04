use thiserror::Error;

/// Logging engine error types
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error("Session not running")]
    NotRunning,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for logging operations
pub type Result<T> = std::result::Result<T, LoggerError>;

/// Numeric failures raised by the wind estimator.
///
/// These are never swallowed: a `NaN` that reaches the filter state cannot be
/// recovered from, so every degenerate case is surfaced before the state is
/// touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error("Matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Matrix is singular (pivot column {column})")]
    Singular { column: usize },

    #[error("Sideslip undefined for zero relative airspeed")]
    UndefinedSideslip,

    #[error("Non-finite input: {0}")]
    NonFiniteInput(&'static str),
}

pub(crate) fn lock_poisoned(what: &str) -> LoggerError {
    LoggerError::Internal(format!("Failed to acquire {} lock", what))
}
