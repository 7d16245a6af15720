//! GBDT trainer
//!
//! Reads a labeled CSV table, splits it into training and validation
//! partitions and drives the `gbm-core` engine to fit a binary classifier.

pub mod config;
pub mod dataset;
pub mod errors;
pub mod split;
pub mod trainer;

use std::path::Path;

pub use config::{BoosterParams, DataConfig, DatasetParams, TrainerConfig};
pub use dataset::{load_csv, read_table, Row, Table};
pub use errors::TrainerError;
pub use split::{split_table, train_size, Partition, DEFAULT_TRAIN_RATIO};
pub use trainer::{IterationRecord, StopReason, Trainer, TrainingOutcome};

/// Train from `input` with the default configuration, saving the model to
/// `output`.
pub fn train_from_csv(input: &Path, output: &Path) -> Result<TrainingOutcome, TrainerError> {
    let mut config = TrainerConfig::default();
    config.data.input = input.to_path_buf();
    config.data.output = output.to_path_buf();
    Trainer::new(config).run()
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
