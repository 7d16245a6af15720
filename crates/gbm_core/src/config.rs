//! Parameter string parsing
//!
//! Datasets and boosters are configured with whitespace-separated
//! `key=value` pairs. Keys are matched case-insensitively and common aliases
//! are folded onto one canonical name before the value is parsed.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::errors::{BoostError, Result};
use crate::metrics::MetricKind;

/// Training objective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveKind {
    /// Binary log loss on 0/1 labels
    Binary,
}

impl ObjectiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectiveKind::Binary => "binary",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "binary" | "binary_logloss" => Ok(ObjectiveKind::Binary),
            other => Err(BoostError::InvalidParameter(format!(
                "unsupported objective: {other}"
            ))),
        }
    }
}

/// Engine configuration shared by datasets and boosters
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub objective: ObjectiveKind,
    /// Metrics in evaluation order
    pub metrics: Vec<MetricKind>,
    pub num_iterations: usize,
    pub learning_rate: f64,
    pub num_leaves: usize,
    /// Maximum tree depth, `<= 0` means unlimited
    pub max_depth: i32,
    pub min_data_in_leaf: usize,
    pub min_sum_hessian_in_leaf: f64,
    pub min_gain_to_split: f64,
    pub lambda_l1: f64,
    pub lambda_l2: f64,
    pub feature_fraction: f64,
    pub scale_pos_weight: f64,
    /// Rounds without improvement before stopping, `0` disables early stopping
    pub early_stopping_round: usize,
    pub first_metric_only: bool,
    pub boost_from_average: bool,
    pub seed: i64,
    pub max_bin: usize,
    pub min_data_in_bin: usize,
    pub verbosity: i32,
    pub force_row_wise: bool,
    pub force_col_wise: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            objective: ObjectiveKind::Binary,
            metrics: vec![MetricKind::BinaryLogloss],
            num_iterations: 100,
            learning_rate: 0.1,
            num_leaves: 31,
            max_depth: -1,
            min_data_in_leaf: 20,
            min_sum_hessian_in_leaf: 1e-3,
            min_gain_to_split: 0.0,
            lambda_l1: 0.0,
            lambda_l2: 0.0,
            feature_fraction: 1.0,
            scale_pos_weight: 1.0,
            early_stopping_round: 0,
            first_metric_only: false,
            boost_from_average: true,
            seed: 0,
            max_bin: 255,
            min_data_in_bin: 3,
            verbosity: 1,
            force_row_wise: false,
            force_col_wise: false,
        }
    }
}

/// Fold an alias onto its canonical parameter name.
fn canonical_key(key: &str) -> Option<&'static str> {
    let canonical = match key {
        "objective" | "objective_type" | "application" | "app" | "loss" => "objective",
        "metric" | "metrics" | "metric_types" => "metric",
        "num_iterations" | "num_iteration" | "n_iter" | "num_tree" | "num_trees"
        | "num_round" | "num_rounds" | "num_boost_round" | "n_estimators" => "num_iterations",
        "learning_rate" | "shrinkage_rate" | "eta" => "learning_rate",
        "num_leaves" | "num_leaf" | "max_leaves" | "max_leaf" | "max_leaf_nodes" => "num_leaves",
        "max_depth" => "max_depth",
        "min_data_in_leaf" | "min_data_per_leaf" | "min_data" | "min_child_samples"
        | "min_samples_leaf" => "min_data_in_leaf",
        "min_sum_hessian_in_leaf" | "min_sum_hessian_per_leaf" | "min_sum_hessian"
        | "min_hessian" | "min_child_weight" => "min_sum_hessian_in_leaf",
        "min_gain_to_split" | "min_split_gain" => "min_gain_to_split",
        "lambda_l1" | "reg_alpha" | "l1_regularization" => "lambda_l1",
        "lambda_l2" | "reg_lambda" | "lambda" | "l2_regularization" => "lambda_l2",
        "feature_fraction" | "sub_feature" | "colsample_bytree" => "feature_fraction",
        "scale_pos_weight" => "scale_pos_weight",
        "early_stopping_round" | "early_stopping_rounds" | "early_stopping"
        | "n_iter_no_change" => "early_stopping_round",
        "first_metric_only" => "first_metric_only",
        "boost_from_average" => "boost_from_average",
        "seed" | "random_seed" | "random_state" => "seed",
        "max_bin" | "max_bins" => "max_bin",
        "min_data_in_bin" => "min_data_in_bin",
        "verbose" | "verbosity" => "verbose",
        "force_row_wise" => "force_row_wise",
        "force_col_wise" => "force_col_wise",
        _ => return None,
    };
    Some(canonical)
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
{
    value.parse::<T>().map_err(|_| {
        BoostError::InvalidParameter(format!("cannot parse value '{value}' for {key}"))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "+" => Ok(true),
        "false" | "0" | "-" => Ok(false),
        other => Err(BoostError::InvalidParameter(format!(
            "cannot parse value '{other}' for {key}, expected true or false"
        ))),
    }
}

impl Config {
    /// Parse a parameter string on top of the defaults.
    pub fn parse(params: &str) -> Result<Self> {
        let mut config = Self::default();
        config.apply(params)?;
        Ok(config)
    }

    /// Apply a parameter string on top of the current values.
    pub fn apply(&mut self, params: &str) -> Result<()> {
        for token in params.split_whitespace() {
            let (raw_key, value) = token.split_once('=').ok_or_else(|| {
                BoostError::InvalidParameter(format!("expected key=value, got '{token}'"))
            })?;
            let key = raw_key.trim().to_ascii_lowercase();
            let value = value.trim();

            let Some(canonical) = canonical_key(&key) else {
                warn!("Unknown parameter: {}", key);
                continue;
            };

            match canonical {
                "objective" => self.objective = ObjectiveKind::parse(value)?,
                "metric" => self.metrics = MetricKind::parse_list(value)?,
                "num_iterations" => self.num_iterations = parse_value(canonical, value)?,
                "learning_rate" => self.learning_rate = parse_value(canonical, value)?,
                "num_leaves" => self.num_leaves = parse_value(canonical, value)?,
                "max_depth" => self.max_depth = parse_value(canonical, value)?,
                "min_data_in_leaf" => self.min_data_in_leaf = parse_value(canonical, value)?,
                "min_sum_hessian_in_leaf" => {
                    self.min_sum_hessian_in_leaf = parse_value(canonical, value)?
                }
                "min_gain_to_split" => self.min_gain_to_split = parse_value(canonical, value)?,
                "lambda_l1" => self.lambda_l1 = parse_value(canonical, value)?,
                "lambda_l2" => self.lambda_l2 = parse_value(canonical, value)?,
                "feature_fraction" => self.feature_fraction = parse_value(canonical, value)?,
                "scale_pos_weight" => self.scale_pos_weight = parse_value(canonical, value)?,
                "early_stopping_round" => {
                    self.early_stopping_round = parse_value(canonical, value)?
                }
                "first_metric_only" => self.first_metric_only = parse_bool(canonical, value)?,
                "boost_from_average" => self.boost_from_average = parse_bool(canonical, value)?,
                "seed" => self.seed = parse_value(canonical, value)?,
                "max_bin" => self.max_bin = parse_value(canonical, value)?,
                "min_data_in_bin" => self.min_data_in_bin = parse_value(canonical, value)?,
                "verbose" => self.verbosity = parse_value(canonical, value)?,
                "force_row_wise" => self.force_row_wise = parse_bool(canonical, value)?,
                "force_col_wise" => self.force_col_wise = parse_bool(canonical, value)?,
                _ => unreachable!("canonical_key returned an unhandled key"),
            }
        }

        self.validate()
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(BoostError::InvalidParameter(msg));

        if self.num_leaves < 2 {
            return invalid(format!("num_leaves must be at least 2, got {}", self.num_leaves));
        }
        if !(self.learning_rate > 0.0) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return invalid(format!(
                "feature_fraction must be in (0, 1], got {}",
                self.feature_fraction
            ));
        }
        if !(self.scale_pos_weight > 0.0) {
            return invalid(format!(
                "scale_pos_weight must be positive, got {}",
                self.scale_pos_weight
            ));
        }
        if self.lambda_l1 < 0.0 || self.lambda_l2 < 0.0 {
            return invalid("lambda_l1 and lambda_l2 must be non-negative".to_string());
        }
        if self.min_sum_hessian_in_leaf < 0.0 || self.min_gain_to_split < 0.0 {
            return invalid(
                "min_sum_hessian_in_leaf and min_gain_to_split must be non-negative".to_string(),
            );
        }
        if self.max_bin < 2 {
            return invalid(format!("max_bin must be at least 2, got {}", self.max_bin));
        }
        if self.min_data_in_bin == 0 {
            return invalid("min_data_in_bin must be at least 1".to_string());
        }
        if self.force_row_wise && self.force_col_wise {
            return invalid("force_row_wise and force_col_wise cannot both be set".to_string());
        }

        Ok(())
    }

    /// Parameter lines in the model file's `parameters:` section.
    pub fn parameter_lines(&self) -> Vec<String> {
        let metrics: Vec<&str> = self.metrics.iter().map(|m| m.name()).collect();
        vec![
            "[boosting: gbdt]".to_string(),
            format!("[objective: {}]", self.objective.name()),
            format!("[metric: {}]", metrics.join(",")),
            format!("[num_iterations: {}]", self.num_iterations),
            format!("[learning_rate: {}]", self.learning_rate),
            format!("[num_leaves: {}]", self.num_leaves),
            format!("[max_depth: {}]", self.max_depth),
            format!("[min_data_in_leaf: {}]", self.min_data_in_leaf),
            format!("[min_sum_hessian_in_leaf: {}]", self.min_sum_hessian_in_leaf),
            format!("[min_gain_to_split: {}]", self.min_gain_to_split),
            format!("[lambda_l1: {}]", self.lambda_l1),
            format!("[lambda_l2: {}]", self.lambda_l2),
            format!("[feature_fraction: {}]", self.feature_fraction),
            format!("[scale_pos_weight: {}]", self.scale_pos_weight),
            format!("[early_stopping_round: {}]", self.early_stopping_round),
            format!("[first_metric_only: {}]", self.first_metric_only as i32),
            format!("[boost_from_average: {}]", self.boost_from_average as i32),
            format!("[seed: {}]", self.seed),
            format!("[max_bin: {}]", self.max_bin),
            format!("[min_data_in_bin: {}]", self.min_data_in_bin),
            format!("[verbosity: {}]", self.verbosity),
            format!("[force_row_wise: {}]", self.force_row_wise as i32),
            format!("[force_col_wise: {}]", self.force_col_wise as i32),
        ]
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parameter_lines().join("\n"))
    }
}
