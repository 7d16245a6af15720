//! Training driver
//!
//! Builds the engine datasets from the two partitions, configures a booster
//! and runs the boosting loop, logging train and validation metrics after
//! every round. Engine handles are plain owned values; they are released
//! when this function returns, whichever way it returns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gbm_core::{Booster, Dataset, FinishReason};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::TrainerConfig;
use crate::dataset::load_csv;
use crate::errors::{Result, TrainerError};
use crate::split::{split_table, Partition};

/// Metrics reported after one boosting round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Zero-based loop index
    pub iteration: usize,
    pub train: BTreeMap<String, f64>,
    pub valid: BTreeMap<String, f64>,
}

/// Why the loop ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum StopReason {
    /// All configured iterations ran
    Completed,
    /// No leaf could be split any more
    NoMoreSplits,
    /// Validation metrics stopped improving
    EarlyStopped,
    /// A boosting round returned an error
    IterationFailed { iteration: usize, message: String },
}

/// Summary of a training run, also written as the JSON report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub train_rows: usize,
    pub valid_rows: usize,
    pub num_features: usize,
    pub history: Vec<IterationRecord>,
    pub best_iteration: usize,
    pub num_trees: usize,
    pub stop_reason: StopReason,
    pub model_path: PathBuf,
    /// BLAKE3 of the saved model file, hex encoded
    pub model_hash: String,
    pub created_at: DateTime<Utc>,
}

impl TrainingOutcome {
    pub fn write_report<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| TrainerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}

/// Drives the engine for one configuration
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Load the configured CSV, split it and train.
    pub fn run(&self) -> Result<TrainingOutcome> {
        let table = load_csv(&self.config.data.input)?;
        if table.is_empty() {
            return Err(TrainerError::EmptyDataset);
        }
        info!(
            "Loaded {} rows from {}",
            table.len(),
            self.config.data.input.display()
        );

        let (train, valid) = split_table(table, self.config.data.train_ratio)?;
        self.train(&train, &valid)
    }

    /// Train on prepared partitions and save the model to the configured
    /// output path.
    pub fn train(&self, train: &Partition, valid: &Partition) -> Result<TrainingOutcome> {
        let dataset_params = self.config.dataset.to_params();

        let mut train_set = Dataset::from_mat(
            &train.features,
            train.num_rows,
            train.num_features,
            &dataset_params,
            None,
        )
        .map_err(TrainerError::engine("train dataset creation"))?;
        train_set
            .set_label(&train.labels)
            .map_err(TrainerError::engine("train label assignment"))?;

        let mut valid_set = Dataset::from_mat(
            &valid.features,
            valid.num_rows,
            valid.num_features,
            &dataset_params,
            Some(&train_set),
        )
        .map_err(TrainerError::engine("valid dataset creation"))?;
        valid_set
            .set_label(&valid.labels)
            .map_err(TrainerError::engine("valid label assignment"))?;

        info!(
            "Datasets created: train={}, valid={}",
            train.num_rows, valid.num_rows
        );

        let mut booster = Booster::new(&train_set, &self.config.booster.to_params())
            .map_err(TrainerError::engine("booster creation"))?;
        booster
            .add_valid_data(&valid_set)
            .map_err(TrainerError::engine("adding validation data"))?;

        let names = booster.eval_names();
        let mut history = Vec::new();
        let mut stop_reason = StopReason::Completed;

        for i in 0..self.config.booster.num_iterations {
            let finished = match booster.update_one_iter() {
                Ok(finished) => finished,
                Err(err) => {
                    error!("Iteration {} failed: {}", i, err);
                    stop_reason = StopReason::IterationFailed {
                        iteration: i,
                        message: err.to_string(),
                    };
                    break;
                }
            };

            let train_eval = booster
                .get_eval(0)
                .map_err(TrainerError::engine("train evaluation"))?;
            let valid_eval = booster
                .get_eval(1)
                .map_err(TrainerError::engine("valid evaluation"))?;
            let record = IterationRecord {
                iteration: i,
                train: named(&names, train_eval),
                valid: named(&names, valid_eval),
            };
            info!("Iteration {} Train: {}", i, format_metrics(&names, &record.train));
            info!("Iteration {} Valid: {}", i, format_metrics(&names, &record.valid));
            history.push(record);

            if finished {
                stop_reason = match booster.finish_reason() {
                    Some(FinishReason::EarlyStopped { .. }) => StopReason::EarlyStopped,
                    _ => StopReason::NoMoreSplits,
                };
                break;
            }
        }

        info!("Model trained");

        let model_path = self.config.data.output.clone();
        booster
            .save_model(&model_path, -1)
            .map_err(TrainerError::engine("model save"))?;
        let saved = std::fs::read(&model_path).map_err(|source| TrainerError::Io {
            path: model_path.display().to_string(),
            source,
        })?;
        let model_hash = hex::encode(blake3::hash(&saved).as_bytes());
        info!(
            "Model saved to {} (blake3 {})",
            model_path.display(),
            model_hash
        );

        Ok(TrainingOutcome {
            train_rows: train.num_rows,
            valid_rows: valid.num_rows,
            num_features: train.num_features,
            history,
            best_iteration: booster.best_iteration(),
            num_trees: booster.model().num_trees(),
            stop_reason,
            model_path,
            model_hash,
            created_at: Utc::now(),
        })
    }
}

fn named(names: &[&str], values: Vec<f64>) -> BTreeMap<String, f64> {
    names
        .iter()
        .map(|name| name.to_string())
        .zip(values)
        .collect()
}

/// Label printed for an engine metric; log-loss is shown as `logloss`
fn display_name(name: &str) -> &str {
    match name {
        "binary_logloss" => "logloss",
        other => other,
    }
}

/// `accuracy=.., auc=.., logloss=..` in the booster's metric order
fn format_metrics(names: &[&str], values: &BTreeMap<String, f64>) -> String {
    names
        .iter()
        .filter_map(|name| {
            values
                .get(*name)
                .map(|value| format!("{}={value}", display_name(name)))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_metrics_keeps_booster_order() {
        let names = ["accuracy", "auc", "binary_logloss"];
        let values = named(&names, vec![0.9, 0.95, 0.3]);
        assert_eq!(
            format_metrics(&names, &values),
            "accuracy=0.9, auc=0.95, logloss=0.3"
        );
    }

    #[test]
    fn test_display_name_only_renames_logloss() {
        assert_eq!(display_name("binary_logloss"), "logloss");
        assert_eq!(display_name("auc"), "auc");
        assert_eq!(display_name("binary_error"), "binary_error");
    }

    #[test]
    fn test_stop_reason_serialization() {
        let json = serde_json::to_string(&StopReason::IterationFailed {
            iteration: 3,
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"reason":"iteration_failed","iteration":3,"message":"boom"}"#
        );
        assert_eq!(
            serde_json::to_string(&StopReason::EarlyStopped).unwrap(),
            r#"{"reason":"early_stopped"}"#
        );
    }
}
