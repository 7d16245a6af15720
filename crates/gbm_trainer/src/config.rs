//! Trainer configuration
//!
//! Defaults reproduce the fixed training setup: `Dataset_LGBM.csv` in,
//! `LGBM_model.txt` out, an 80/20 split and the booster parameters below.
//! A TOML file may override any subset of keys; missing keys keep their
//! defaults.
//!
//! ```toml
//! [data]
//! input = "Dataset_LGBM.csv"
//! output = "LGBM_model.txt"
//! train_ratio = 0.8
//!
//! [dataset]
//! min_data_in_bin = 1
//! min_data_in_leaf = 1
//!
//! [booster]
//! num_leaves = 6
//! early_stopping_round = 10
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{Result, TrainerError};
use crate::split::DEFAULT_TRAIN_RATIO;

/// Input/output locations and split ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub train_ratio: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("Dataset_LGBM.csv"),
            output: PathBuf::from("LGBM_model.txt"),
            train_ratio: DEFAULT_TRAIN_RATIO,
        }
    }
}

/// Parameters for dataset construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetParams {
    pub min_data_in_bin: usize,
    pub min_data_in_leaf: usize,
}

impl Default for DatasetParams {
    fn default() -> Self {
        Self {
            min_data_in_bin: 1,
            min_data_in_leaf: 1,
        }
    }
}

impl DatasetParams {
    /// Engine parameter string
    pub fn to_params(&self) -> String {
        format!(
            "min_data_in_bin={} min_data_in_leaf={}",
            self.min_data_in_bin, self.min_data_in_leaf
        )
    }
}

/// Booster hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    pub objective: String,
    pub metrics: Vec<String>,
    pub max_depth: i32,
    pub scale_pos_weight: f64,
    pub learning_rate: f64,
    pub num_iterations: usize,
    pub seed: i64,
    pub min_data_in_leaf: usize,
    pub force_row_wise: bool,
    pub num_leaves: usize,
    pub feature_fraction: f64,
    pub lambda_l1: f64,
    pub lambda_l2: f64,
    pub verbose: i32,
    pub early_stopping_round: usize,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            objective: "binary".to_string(),
            metrics: vec![
                "accuracy".to_string(),
                "auc".to_string(),
                "binary_logloss".to_string(),
            ],
            max_depth: 7,
            scale_pos_weight: 3.2,
            learning_rate: 0.1,
            num_iterations: 100,
            seed: 42,
            min_data_in_leaf: 1,
            force_row_wise: true,
            num_leaves: 6,
            feature_fraction: 0.8,
            lambda_l1: 0.1,
            lambda_l2: 0.1,
            verbose: 2,
            early_stopping_round: 10,
        }
    }
}

impl BoosterParams {
    /// Engine parameter string, in the engine's `key=value` form
    pub fn to_params(&self) -> String {
        format!(
            "objective={} metric={} max_depth={} scale_pos_weight={} learning_rate={} \
             num_iterations={} seed={} min_data_in_leaf={} force_row_wise={} num_leaves={} \
             feature_fraction={} lambda_l1={} lambda_l2={} verbose={} early_stopping_round={}",
            self.objective,
            self.metrics.join(","),
            self.max_depth,
            self.scale_pos_weight,
            self.learning_rate,
            self.num_iterations,
            self.seed,
            self.min_data_in_leaf,
            self.force_row_wise,
            self.num_leaves,
            self.feature_fraction,
            self.lambda_l1,
            self.lambda_l2,
            self.verbose,
            self.early_stopping_round
        )
    }
}

/// Full trainer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub data: DataConfig,
    pub dataset: DatasetParams,
    pub booster: BoosterParams,
}

impl TrainerConfig {
    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TrainerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|source| TrainerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.data.train_ratio) {
            return Err(TrainerError::Config(format!(
                "data.train_ratio must be within [0, 1], got {}",
                self.data.train_ratio
            )));
        }
        if self.booster.num_iterations == 0 {
            return Err(TrainerError::Config(
                "booster.num_iterations must be positive".to_string(),
            ));
        }
        if self.booster.metrics.is_empty() {
            return Err(TrainerError::Config(
                "booster.metrics must name at least one metric".to_string(),
            ));
        }
        Ok(())
    }
}
