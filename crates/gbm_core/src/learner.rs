//! Leaf-wise histogram tree learner
//!
//! Grows one regression tree on the current gradients. At every step the
//! leaf with the largest split gain is split, until `num_leaves` is reached
//! or no leaf has a split with positive gain. Split search scans per-bin
//! gradient histograms of the features sampled for this tree.

use tracing::trace;

use crate::config::Config;
use crate::dataset::{Bin, Dataset};
use crate::random::FeatureSampler;
use crate::tree::{SplitRecord, Tree};

/// Soft-threshold the gradient sum by the L1 penalty.
fn threshold_l1(sum_grad: f64, l1: f64) -> f64 {
    let reduced = (sum_grad.abs() - l1).max(0.0);
    reduced.copysign(sum_grad)
}

/// Gradient/hessian/count sums for a set of rows
#[derive(Debug, Clone, Copy, Default)]
struct Sums {
    grad: f64,
    hess: f64,
    count: usize,
}

impl Sums {
    fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
        self.count += 1;
    }

    fn minus(&self, other: &Sums) -> Sums {
        Sums {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count - other.count,
        }
    }
}

/// Best split found for a leaf
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature: usize,
    threshold_bin: Bin,
    gain: f64,
    left: Sums,
    right: Sums,
}

struct LeafState {
    rows: Vec<usize>,
    sums: Sums,
    best: Option<SplitCandidate>,
}

/// Tree learner bound to one training dataset
pub struct TreeLearner<'a> {
    config: Config,
    train: &'a Dataset,
    usable_features: Vec<usize>,
    sampler: FeatureSampler,
}

impl<'a> TreeLearner<'a> {
    pub fn new(config: Config, train: &'a Dataset) -> Self {
        let usable_features = (0..train.num_features())
            .filter(|&f| !train.bin_mapper(f).is_trivial())
            .collect();

        Self {
            sampler: FeatureSampler::new(config.seed),
            config,
            train,
            usable_features,
        }
    }

    fn leaf_gain(&self, sums: &Sums) -> f64 {
        let g = threshold_l1(sums.grad, self.config.lambda_l1);
        g * g / (sums.hess + self.config.lambda_l2)
    }

    fn leaf_output(&self, sums: &Sums) -> f64 {
        let denominator = sums.hess + self.config.lambda_l2;
        if denominator <= 0.0 {
            return 0.0;
        }
        -threshold_l1(sums.grad, self.config.lambda_l1) / denominator
    }

    fn sample_features(&mut self) -> Vec<usize> {
        let total = self.usable_features.len();
        if self.config.feature_fraction >= 1.0 || total == 0 {
            return self.usable_features.clone();
        }
        let count = ((total as f64 * self.config.feature_fraction + 0.5) as usize).max(1);
        self.sampler.sample(&self.usable_features, count)
    }

    /// Grow a tree on `gradients`/`hessians`.
    ///
    /// Returns the unshrunk tree and the leaf each training row landed in.
    pub fn train(&mut self, gradients: &[f64], hessians: &[f64]) -> (Tree, Vec<usize>) {
        let num_data = self.train.num_data();
        let features = self.sample_features();

        let mut root = Sums::default();
        for row in 0..num_data {
            root.add(gradients[row], hessians[row]);
        }

        let mut tree = Tree::single_leaf(self.leaf_output(&root), root.count, root.hess);
        let mut leaves = vec![LeafState {
            rows: (0..num_data).collect(),
            sums: root,
            best: None,
        }];
        leaves[0].best = self.find_best_split(&leaves[0], 0, &features, gradients, hessians);

        while tree.num_leaves < self.config.num_leaves {
            // Highest gain wins; ties keep the lowest leaf index
            let mut chosen: Option<(usize, f64)> = None;
            for (idx, leaf) in leaves.iter().enumerate() {
                if let Some(split) = &leaf.best {
                    if chosen.map_or(true, |(_, gain)| split.gain > gain) {
                        chosen = Some((idx, split.gain));
                    }
                }
            }
            let Some((leaf_idx, _)) = chosen else {
                break;
            };

            let Some(split) = leaves[leaf_idx].best.take() else {
                break;
            };
            let bins = self.train.feature_bins(split.feature);
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaves[leaf_idx]
                .rows
                .iter()
                .partition(|&&row| bins[row] <= split.threshold_bin);

            let record = SplitRecord {
                feature: split.feature,
                threshold_bin: split.threshold_bin,
                threshold: self
                    .train
                    .bin_mapper(split.feature)
                    .bin_to_threshold(split.threshold_bin),
                gain: split.gain,
                left_output: self.leaf_output(&split.left),
                right_output: self.leaf_output(&split.right),
                left_count: split.left.count,
                right_count: split.right.count,
                left_weight: split.left.hess,
                right_weight: split.right.hess,
            };
            trace!(
                "Split leaf {} on feature {} at {} (gain {})",
                leaf_idx,
                record.feature,
                record.threshold,
                record.gain
            );

            let right_idx = tree.split(leaf_idx, &record);
            let depth = tree.leaf_depth(leaf_idx);

            leaves[leaf_idx] = LeafState {
                rows: left_rows,
                sums: split.left,
                best: None,
            };
            leaves.push(LeafState {
                rows: right_rows,
                sums: split.right,
                best: None,
            });
            debug_assert_eq!(leaves.len() - 1, right_idx);

            for idx in [leaf_idx, right_idx] {
                let best = self.find_best_split(&leaves[idx], depth, &features, gradients, hessians);
                leaves[idx].best = best;
            }
        }

        let mut row_leaf = vec![0usize; num_data];
        for (leaf_idx, leaf) in leaves.iter().enumerate() {
            for &row in &leaf.rows {
                row_leaf[row] = leaf_idx;
            }
        }

        (tree, row_leaf)
    }

    fn find_best_split(
        &self,
        leaf: &LeafState,
        depth: usize,
        features: &[usize],
        gradients: &[f64],
        hessians: &[f64],
    ) -> Option<SplitCandidate> {
        let config = &self.config;
        if config.max_depth > 0 && depth >= config.max_depth as usize {
            return None;
        }
        if leaf.sums.count < 2 * config.min_data_in_leaf.max(1) {
            return None;
        }

        let min_gain_shift = self.leaf_gain(&leaf.sums) + config.min_gain_to_split;
        let mut best: Option<SplitCandidate> = None;

        for &feature in features {
            let num_bins = self.train.bin_mapper(feature).num_bins();
            let bins = self.train.feature_bins(feature);

            let mut histogram = vec![Sums::default(); num_bins];
            for &row in &leaf.rows {
                histogram[bins[row] as usize].add(gradients[row], hessians[row]);
            }

            let mut left = Sums::default();
            for (bin, entry) in histogram.iter().enumerate().take(num_bins - 1) {
                left.grad += entry.grad;
                left.hess += entry.hess;
                left.count += entry.count;

                let right = leaf.sums.minus(&left);
                if left.count < config.min_data_in_leaf || left.hess < config.min_sum_hessian_in_leaf
                {
                    continue;
                }
                if right.count < config.min_data_in_leaf
                    || right.hess < config.min_sum_hessian_in_leaf
                {
                    break;
                }

                let gain = self.leaf_gain(&left) + self.leaf_gain(&right);
                if gain <= min_gain_shift {
                    continue;
                }
                let gain = gain - min_gain_shift;

                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold_bin: bin as Bin,
                        gain,
                        left,
                        right,
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(data: &[f64], nrows: usize, ncols: usize) -> Dataset {
        Dataset::from_mat(data, nrows, ncols, "min_data_in_bin=1", None).unwrap()
    }

    fn config(params: &str) -> Config {
        Config::parse(params).unwrap()
    }

    #[test]
    fn test_threshold_l1() {
        assert_eq!(threshold_l1(2.0, 0.5), 1.5);
        assert_eq!(threshold_l1(-2.0, 0.5), -1.5);
        assert_eq!(threshold_l1(0.2, 0.5), 0.0);
    }

    #[test]
    fn test_separating_split() {
        let ds = dataset(&[1.0, 2.0, 3.0, 4.0], 4, 1);
        let cfg = config("min_data_in_leaf=1 num_leaves=2");
        let mut learner = TreeLearner::new(cfg.clone(), &ds);

        let gradients = [1.0, 1.0, -1.0, -1.0];
        let hessians = [1.0; 4];
        let (tree, row_leaf) = learner.train(&gradients, &hessians);

        assert_eq!(tree.num_leaves, 2);
        assert_eq!(tree.split_feature, vec![0]);
        assert_eq!(tree.threshold, vec![2.5]);
        assert_eq!(tree.leaf_value, vec![-1.0, 1.0]);
        assert_eq!(row_leaf, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_min_data_in_leaf_blocks_split() {
        let ds = dataset(&[1.0, 2.0, 3.0, 4.0], 4, 1);
        let cfg = config("min_data_in_leaf=3");
        let mut learner = TreeLearner::new(cfg.clone(), &ds);
        let (tree, _) = learner.train(&[1.0, 1.0, -1.0, -1.0], &[1.0; 4]);
        assert_eq!(tree.num_leaves, 1);
    }

    #[test]
    fn test_constant_feature_yields_single_leaf() {
        let ds = dataset(&[5.0, 5.0, 5.0], 3, 1);
        let cfg = config("min_data_in_leaf=1");
        let mut learner = TreeLearner::new(cfg.clone(), &ds);
        let (tree, row_leaf) = learner.train(&[1.0, -1.0, 0.5], &[1.0; 3]);
        assert_eq!(tree.num_leaves, 1);
        assert_eq!(row_leaf, vec![0, 0, 0]);
        assert!((tree.leaf_value[0] + 0.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_num_leaves_and_max_depth_limits() {
        let data: Vec<f64> = (0..16).map(f64::from).collect();
        let ds = dataset(&data, 16, 1);
        let gradients: Vec<f64> = (0..16).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let hessians = vec![1.0; 16];

        let cfg = config("min_data_in_leaf=1 num_leaves=5");
        let (tree, _) = TreeLearner::new(cfg.clone(), &ds).train(&gradients, &hessians);
        assert!(tree.num_leaves <= 5);

        let cfg = config("min_data_in_leaf=1 num_leaves=31 max_depth=2");
        let (tree, _) = TreeLearner::new(cfg.clone(), &ds).train(&gradients, &hessians);
        assert!(tree.num_leaves <= 4);
        assert!((0..tree.num_leaves).all(|leaf| tree.leaf_depth(leaf) <= 2));
    }

    #[test]
    fn test_feature_fraction_is_deterministic() {
        let data: Vec<f64> = (0..40).map(|i| f64::from(i * 7 % 13)).collect();
        let ds = dataset(&data, 10, 4);
        let gradients: Vec<f64> = (0..10).map(|i| f64::from(i) - 4.5).collect();
        let hessians = vec![1.0; 10];
        let cfg = config("min_data_in_leaf=1 feature_fraction=0.5 seed=42");

        let (a, _) = TreeLearner::new(cfg.clone(), &ds).train(&gradients, &hessians);
        let (b, _) = TreeLearner::new(cfg.clone(), &ds).train(&gradients, &hessians);
        assert_eq!(a, b);
    }
}
