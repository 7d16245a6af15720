use gbm_core::BoostError;
use thiserror::Error;

/// Errors returned by the trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("row {row} has {found} columns, expected {expected}")]
    ShapeMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Engine call failed; the engine's message is reported as is
    #[error("{step} failed: {source}")]
    Engine {
        step: &'static str,
        #[source]
        source: BoostError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrainerError {
    /// Wrap an engine error with the step that produced it.
    pub fn engine(step: &'static str) -> impl FnOnce(BoostError) -> Self {
        move |source| Self::Engine { step, source }
    }
}

pub type Result<T> = std::result::Result<T, TrainerError>;
