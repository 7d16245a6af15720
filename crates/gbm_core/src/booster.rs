//! Booster handle
//!
//! A booster borrows its training dataset and any validation datasets for
//! its whole lifetime; the borrow checker keeps every dataset alive while the
//! booster uses it, and dropping the booster releases everything it owns.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dataset::Dataset;
use crate::errors::{BoostError, Result};
use crate::learner::TreeLearner;
use crate::metrics::MetricKind;
use crate::model::Model;
use crate::objective::BinaryLogloss;
use crate::tree::Tree;

/// Scores kept for one validation dataset
struct ValidSet<'a> {
    dataset: &'a Dataset,
    scores: Vec<f64>,
}

/// Early stopping bookkeeping for one (validation set, metric) pair
#[derive(Debug, Clone, Copy)]
struct BestScore {
    score: f64,
    iteration: usize,
}

/// Why training finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// No leaf could be split with positive gain
    NoMoreSplits,
    /// A validation metric did not improve for `early_stopping_round` rounds
    EarlyStopped { best_iteration: usize },
}

pub struct Booster<'a> {
    config: Config,
    train: &'a Dataset,
    train_labels: &'a [f32],
    objective: BinaryLogloss,
    learner: TreeLearner<'a>,
    train_scores: Vec<f64>,
    valid: Vec<ValidSet<'a>>,
    model: Model,
    gradients: Vec<f64>,
    hessians: Vec<f64>,
    init_score: f64,
    iteration: usize,
    best_scores: Vec<Vec<Option<BestScore>>>,
    finished: Option<FinishReason>,
}

impl<'a> Booster<'a> {
    /// Create a booster over `train`, configured by `params`.
    ///
    /// The training dataset must have labels.
    pub fn new(train: &'a Dataset, params: &str) -> Result<Self> {
        let config = Config::parse(params)?;
        let train_labels = train.labels().ok_or_else(|| {
            BoostError::Booster("training dataset has no labels".to_string())
        })?;
        BinaryLogloss::check_labels(train_labels)?;

        let objective = BinaryLogloss::new(&config);
        let feature_infos = train
            .bin_mappers()
            .iter()
            .map(|mapper| mapper.feature_info())
            .collect();
        let model = Model::new(feature_infos, objective.sigmoid(), config.parameter_lines());
        let learner = TreeLearner::new(config.clone(), train);

        if config.verbosity > 0 {
            info!(
                "Booster created: {} rows, {} features, objective={}",
                train.num_data(),
                train.num_features(),
                config.objective.name()
            );
        }

        Ok(Self {
            train,
            train_labels,
            objective,
            learner,
            train_scores: vec![0.0; train.num_data()],
            valid: Vec::new(),
            model,
            gradients: vec![0.0; train.num_data()],
            hessians: vec![0.0; train.num_data()],
            init_score: 0.0,
            iteration: 0,
            best_scores: Vec::new(),
            finished: None,
            config,
        })
    }

    /// Register a validation dataset; it must share the training dataset's
    /// bin mappers and have labels.
    pub fn add_valid_data(&mut self, valid: &'a Dataset) -> Result<()> {
        if !valid.shares_bins_with(self.train) {
            return Err(BoostError::Booster(
                "validation dataset must be constructed with the training dataset as reference"
                    .to_string(),
            ));
        }
        let labels = valid.labels().ok_or_else(|| {
            BoostError::Booster("validation dataset has no labels".to_string())
        })?;
        BinaryLogloss::check_labels(labels)?;

        // Bring the new set up to date with the trees trained so far
        let scores = (0..valid.num_data())
            .map(|row| {
                self.model
                    .trees
                    .iter()
                    .map(|tree| tree.predict_binned(valid, row))
                    .sum()
            })
            .collect();

        self.valid.push(ValidSet {
            dataset: valid,
            scores,
        });
        self.best_scores.push(vec![None; self.config.metrics.len()]);
        Ok(())
    }

    /// Number of metrics reported per dataset
    pub fn eval_counts(&self) -> usize {
        self.config.metrics.len()
    }

    pub fn eval_names(&self) -> Vec<&'static str> {
        self.config.metrics.iter().map(MetricKind::name).collect()
    }

    /// Completed boosting rounds still held in the model
    pub fn current_iteration(&self) -> usize {
        self.iteration
    }

    /// Best round found by early stopping, or the current round
    pub fn best_iteration(&self) -> usize {
        match self.finished {
            Some(FinishReason::EarlyStopped { best_iteration }) => best_iteration,
            _ => self.iteration,
        }
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finished
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Run one boosting round. Returns `true` once training has finished.
    pub fn update_one_iter(&mut self) -> Result<bool> {
        if self.finished.is_some() {
            return Ok(true);
        }

        if self.iteration == 0 && self.model.trees.is_empty() && self.config.boost_from_average {
            self.init_score = self.objective.boost_from_score(self.train_labels);
            if self.init_score != 0.0 {
                debug!("Start training from score {}", self.init_score);
                add_constant(&mut self.train_scores, self.init_score);
                for set in &mut self.valid {
                    add_constant(&mut set.scores, self.init_score);
                }
            }
        }

        self.objective.get_gradients(
            self.train_labels,
            &self.train_scores,
            &mut self.gradients,
            &mut self.hessians,
        );
        if let Some(bad) = self.gradients.iter().chain(&self.hessians).find(|v| !v.is_finite()) {
            return Err(BoostError::Booster(format!(
                "non-finite gradient statistic {bad} at iteration {}",
                self.iteration
            )));
        }

        let (mut tree, row_leaf) = self.learner.train(&self.gradients, &self.hessians);

        if tree.num_leaves <= 1 {
            if self.model.trees.is_empty() {
                // Keep a constant tree so the model still carries the init score
                self.model
                    .trees
                    .push(Tree::single_leaf(self.init_score, self.train.num_data(), 0.0));
                self.iteration += 1;
            }
            warn!("Stopped training because there are no more leaves that meet the split requirements");
            self.finished = Some(FinishReason::NoMoreSplits);
            return Ok(true);
        }

        tree.apply_shrinkage(self.config.learning_rate);

        for (score, &leaf) in self.train_scores.iter_mut().zip(&row_leaf) {
            *score += tree.leaf_value[leaf];
        }
        for set in &mut self.valid {
            for (row, score) in set.scores.iter_mut().enumerate() {
                *score += tree.predict_binned(set.dataset, row);
            }
        }

        if self.model.trees.is_empty() && self.init_score != 0.0 {
            tree.add_bias(self.init_score);
        }
        self.model.trees.push(tree);
        self.iteration += 1;

        if let Some(best_iteration) = self.check_early_stopping() {
            info!(
                "Early stopping at iteration {}, the best iteration round is {}",
                self.iteration, best_iteration
            );
            self.rollback_to(best_iteration);
            self.finished = Some(FinishReason::EarlyStopped { best_iteration });
            return Ok(true);
        }

        Ok(false)
    }

    /// Returns the round to roll back to when some validation metric has not
    /// improved for `early_stopping_round` rounds.
    fn check_early_stopping(&mut self) -> Option<usize> {
        if self.config.early_stopping_round == 0 || self.valid.is_empty() {
            return None;
        }

        let metric_count = if self.config.first_metric_only {
            self.config.metrics.len().min(1)
        } else {
            self.config.metrics.len()
        };

        for set_idx in 0..self.valid.len() {
            let dataset = self.valid[set_idx].dataset;
            let labels = dataset.labels().unwrap_or(&[]);
            let probs = self.probabilities(&self.valid[set_idx].scores);

            for metric_idx in 0..metric_count {
                let metric = self.config.metrics[metric_idx];
                let value = metric.evaluate(labels, &probs);
                // Larger is better after the sign flip
                let score = if metric.higher_is_better() { value } else { -value };

                let improved = match self.best_scores[set_idx][metric_idx] {
                    Some(best) if score <= best.score => {
                        if self.iteration - best.iteration >= self.config.early_stopping_round {
                            return Some(best.iteration);
                        }
                        false
                    }
                    _ => true,
                };
                if improved {
                    self.best_scores[set_idx][metric_idx] = Some(BestScore {
                        score,
                        iteration: self.iteration,
                    });
                }
            }
        }

        None
    }

    /// Drop trees past `iteration` and take their contribution out of the
    /// cached scores.
    fn rollback_to(&mut self, iteration: usize) {
        while self.model.trees.len() > iteration.max(1) {
            let Some(mut tree) = self.model.trees.pop() else {
                break;
            };
            if self.model.trees.is_empty() && self.init_score != 0.0 {
                tree.add_bias(-self.init_score);
            }
            for row in 0..self.train.num_data() {
                self.train_scores[row] -= tree.predict_binned(self.train, row);
            }
            for set in &mut self.valid {
                for (row, score) in set.scores.iter_mut().enumerate() {
                    *score -= tree.predict_binned(set.dataset, row);
                }
            }
        }
        self.iteration = self.model.trees.len();
    }

    fn probabilities(&self, scores: &[f64]) -> Vec<f64> {
        scores
            .iter()
            .map(|&raw| self.objective.convert_output(raw))
            .collect()
    }

    /// Metrics for dataset `data_idx`: 0 is the training set, `1..` are the
    /// validation sets in the order they were added.
    pub fn get_eval(&self, data_idx: usize) -> Result<Vec<f64>> {
        let (labels, scores) = if data_idx == 0 {
            (self.train_labels, &self.train_scores)
        } else {
            let set = self.valid.get(data_idx - 1).ok_or_else(|| {
                BoostError::Booster(format!(
                    "data_idx {data_idx} out of range, booster has {} validation sets",
                    self.valid.len()
                ))
            })?;
            (set.dataset.labels().unwrap_or(&[]), &set.scores)
        };

        let probs = self.probabilities(scores);
        Ok(self
            .config
            .metrics
            .iter()
            .map(|metric| metric.evaluate(labels, &probs))
            .collect())
    }

    /// Render the model; `num_iteration <= 0` keeps every retained tree.
    pub fn model_to_string(&self, num_iteration: i32) -> String {
        self.model.to_model_string(num_iteration)
    }

    pub fn save_model(&self, path: &Path, num_iteration: i32) -> Result<()> {
        self.model.save(path, num_iteration)
    }

    /// Probability of the positive class for one raw feature row
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.model.predict(features)
    }
}

fn add_constant(scores: &mut [f64], value: f64) {
    for score in scores {
        *score += value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Balanced, separable on feature 0 at 24.5; feature 1 is noise
    fn separable(rows: std::ops::Range<i32>) -> (Vec<f64>, Vec<f32>) {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in rows {
            let x = f64::from(i * 7 % 50);
            data.push(x);
            data.push(f64::from(i * 13 % 17));
            labels.push(if x >= 25.0 { 1.0 } else { 0.0 });
        }
        (data, labels)
    }

    fn datasets() -> (Dataset, Dataset) {
        let (train_x, train_y) = separable(0..40);
        let (valid_x, valid_y) = separable(40..50);
        let mut train = Dataset::from_mat(&train_x, 40, 2, "min_data_in_bin=1", None).unwrap();
        train.set_label(&train_y).unwrap();
        let mut valid =
            Dataset::from_mat(&valid_x, 10, 2, "min_data_in_bin=1", Some(&train)).unwrap();
        valid.set_label(&valid_y).unwrap();
        (train, valid)
    }

    #[test]
    fn test_requires_labels() {
        let train = Dataset::from_mat(&[1.0, 2.0], 2, 1, "", None).unwrap();
        assert!(Booster::new(&train, "").is_err());
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let mut train = Dataset::from_mat(&[1.0, 2.0], 2, 1, "", None).unwrap();
        train.set_label(&[0.0, 3.0]).unwrap();
        assert!(Booster::new(&train, "").is_err());
    }

    #[test]
    fn test_valid_data_needs_reference() {
        let (train, _) = datasets();
        let (valid_x, valid_y) = separable(40..50);
        let mut unrelated = Dataset::from_mat(&valid_x, 10, 2, "", None).unwrap();
        unrelated.set_label(&valid_y).unwrap();

        let mut booster = Booster::new(&train, "min_data_in_leaf=1").unwrap();
        assert!(booster.add_valid_data(&unrelated).is_err());
    }

    #[test]
    fn test_learns_separable_data() {
        let (train, valid) = datasets();
        let mut booster =
            Booster::new(&train, "metric=accuracy,auc min_data_in_leaf=1 num_leaves=4").unwrap();
        booster.add_valid_data(&valid).unwrap();
        assert_eq!(booster.eval_counts(), 2);
        assert_eq!(booster.eval_names(), vec!["accuracy", "auc"]);

        let finished = booster.update_one_iter().unwrap();
        assert!(!finished);
        assert_eq!(booster.current_iteration(), 1);
        assert_eq!(booster.get_eval(0).unwrap(), vec![1.0, 1.0]);
        assert_eq!(booster.get_eval(1).unwrap(), vec![1.0, 1.0]);
        assert!(booster.get_eval(2).is_err());

        assert!(booster.predict(&[40.0, 0.0]) > 0.5);
        assert!(booster.predict(&[3.0, 0.0]) < 0.5);
    }

    #[test]
    fn test_logloss_decreases() {
        let (train, valid) = datasets();
        let mut booster = Booster::new(&train, "min_data_in_leaf=1").unwrap();
        booster.add_valid_data(&valid).unwrap();

        booster.update_one_iter().unwrap();
        let first = booster.get_eval(0).unwrap()[0];
        for _ in 0..5 {
            booster.update_one_iter().unwrap();
        }
        let later = booster.get_eval(0).unwrap()[0];
        assert!(later < first);
    }

    #[test]
    fn test_early_stopping_rolls_back() {
        let (train, valid) = datasets();
        let mut booster = Booster::new(
            &train,
            "metric=accuracy min_data_in_leaf=1 early_stopping_round=3 num_iterations=50",
        )
        .unwrap();
        booster.add_valid_data(&valid).unwrap();

        let mut rounds = 0;
        while !booster.update_one_iter().unwrap() {
            rounds += 1;
            assert!(rounds < 50);
        }

        // best at round 1, stops at round 4
        assert_eq!(rounds, 3);
        assert_eq!(
            booster.finish_reason(),
            Some(FinishReason::EarlyStopped { best_iteration: 1 })
        );
        assert_eq!(booster.best_iteration(), 1);
        assert_eq!(booster.current_iteration(), 1);
        assert_eq!(booster.model().num_trees(), 1);
        assert!(booster.update_one_iter().unwrap());
    }

    #[test]
    fn test_no_split_keeps_constant_tree() {
        let mut train = Dataset::from_mat(&[1.0, 1.0, 1.0, 1.0], 4, 1, "", None).unwrap();
        train.set_label(&[1.0, 1.0, 1.0, 0.0]).unwrap();
        let mut booster = Booster::new(&train, "min_data_in_leaf=1").unwrap();

        assert!(booster.update_one_iter().unwrap());
        assert_eq!(booster.finish_reason(), Some(FinishReason::NoMoreSplits));
        assert_eq!(booster.model().num_trees(), 1);
        let expected = 1.0 / (1.0 + (-(3.0f64).ln()).exp());
        assert!((booster.predict(&[1.0]) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_negative_infinity_routes_like_training() {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for _ in 0..4 {
            for (x, y) in [(f64::NEG_INFINITY, 1.0), (0.0, 0.0), (1.0, 0.0)] {
                data.push(x);
                labels.push(y);
            }
        }
        let mut train = Dataset::from_mat(&data, 12, 1, "min_data_in_bin=1", None).unwrap();
        train.set_label(&labels).unwrap();
        let mut booster = Booster::new(&train, "min_data_in_leaf=1").unwrap();
        for _ in 0..10 {
            booster.update_one_iter().unwrap();
        }

        assert!(booster.get_eval(0).unwrap()[0].is_finite());
        assert!(booster.predict(&[f64::NEG_INFINITY]) > 0.5);
        assert!(booster.predict(&[0.0]) < 0.5);
        assert!(booster.predict(&[1.0]) < 0.5);

        let loaded = Model::parse(&booster.model_to_string(-1)).unwrap();
        for x in [f64::NEG_INFINITY, 0.0, 1.0] {
            assert_eq!(loaded.predict(&[x]), booster.predict(&[x]));
        }
    }

    #[test]
    fn test_non_finite_gradient_fails_round() {
        let (train, _) = datasets();
        let mut booster =
            Booster::new(&train, "min_data_in_leaf=1 scale_pos_weight=inf").unwrap();
        let err = booster.update_one_iter().unwrap_err();
        assert!(err.to_string().contains("non-finite"));
        assert_eq!(booster.current_iteration(), 0);
    }

    #[test]
    fn test_saved_model_matches_booster() {
        let (train, valid) = datasets();
        let mut booster = Booster::new(&train, "min_data_in_leaf=1 num_iterations=5").unwrap();
        booster.add_valid_data(&valid).unwrap();
        for _ in 0..5 {
            booster.update_one_iter().unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.txt");
        booster.save_model(&path, -1).unwrap();
        let loaded = Model::load(&path).unwrap();

        assert_eq!(loaded.num_trees(), 5);
        for row in [[0.0, 3.0], [24.0, 1.0], [25.0, 9.0], [49.0, 16.0]] {
            assert_eq!(loaded.predict(&row), booster.predict(&row));
        }
    }
}
