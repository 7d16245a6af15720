//! Error types for the boosting engine

use thiserror::Error;

/// Errors returned by engine calls.
///
/// The `Display` text is the engine's own error string; callers report it
/// verbatim.
#[derive(Error, Debug)]
pub enum BoostError {
    /// A parameter string could not be parsed or holds an invalid value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Dataset construction or field assignment failed
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Booster construction or a boosting round failed
    #[error("Booster error: {0}")]
    Booster(String),

    /// A model file could not be parsed
    #[error("Model format error: {0}")]
    ModelFormat(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, BoostError>;
