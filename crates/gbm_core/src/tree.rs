//! Regression trees grown leaf by leaf
//!
//! Internal nodes and leaves live in separate arrays. A child reference
//! `>= 0` is an internal node index; a negative reference `c` points at leaf
//! `!c`. A tree with a single leaf has no internal nodes.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::dataset::{Bin, Dataset};
use crate::errors::{BoostError, Result};

/// Decision type written for numerical splits that send defaults left
const DECISION_TYPE_NUMERICAL: u8 = 2;

/// Split bookkeeping handed to [`Tree::split`]
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRecord {
    pub feature: usize,
    pub threshold_bin: Bin,
    pub threshold: f64,
    pub gain: f64,
    pub left_output: f64,
    pub right_output: f64,
    pub left_count: usize,
    pub right_count: usize,
    pub left_weight: f64,
    pub right_weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub num_leaves: usize,
    pub split_feature: Vec<usize>,
    pub split_gain: Vec<f64>,
    pub threshold: Vec<f64>,
    /// Bin thresholds; empty for trees parsed from text
    threshold_bin: Vec<Bin>,
    pub left_child: Vec<i32>,
    pub right_child: Vec<i32>,
    pub leaf_value: Vec<f64>,
    pub leaf_weight: Vec<f64>,
    pub leaf_count: Vec<usize>,
    pub internal_value: Vec<f64>,
    pub internal_weight: Vec<f64>,
    pub internal_count: Vec<usize>,
    leaf_parent: Vec<i32>,
    leaf_depth: Vec<usize>,
    pub shrinkage: f64,
}

impl Tree {
    /// A tree with one leaf holding `value`
    pub fn single_leaf(value: f64, count: usize, weight: f64) -> Self {
        Self {
            num_leaves: 1,
            split_feature: Vec::new(),
            split_gain: Vec::new(),
            threshold: Vec::new(),
            threshold_bin: Vec::new(),
            left_child: Vec::new(),
            right_child: Vec::new(),
            leaf_value: vec![value],
            leaf_weight: vec![weight],
            leaf_count: vec![count],
            internal_value: Vec::new(),
            internal_weight: Vec::new(),
            internal_count: Vec::new(),
            leaf_parent: vec![-1],
            leaf_depth: vec![0],
            shrinkage: 1.0,
        }
    }

    pub fn num_internal(&self) -> usize {
        self.split_feature.len()
    }

    pub fn leaf_depth(&self, leaf: usize) -> usize {
        self.leaf_depth[leaf]
    }

    /// Split `leaf` in two. The left half keeps the leaf index, the right
    /// half becomes a new leaf whose index is returned.
    pub fn split(&mut self, leaf: usize, record: &SplitRecord) -> usize {
        let node = self.num_internal();
        let new_leaf = self.num_leaves;

        let parent = self.leaf_parent[leaf];
        if parent >= 0 {
            let parent = parent as usize;
            let leaf_ref = !(leaf as i32);
            if self.left_child[parent] == leaf_ref {
                self.left_child[parent] = node as i32;
            } else {
                self.right_child[parent] = node as i32;
            }
        }

        self.split_feature.push(record.feature);
        self.split_gain.push(record.gain);
        self.threshold.push(record.threshold);
        self.threshold_bin.push(record.threshold_bin);
        self.left_child.push(!(leaf as i32));
        self.right_child.push(!(new_leaf as i32));
        self.internal_value.push(self.leaf_value[leaf]);
        self.internal_weight.push(record.left_weight + record.right_weight);
        self.internal_count.push(record.left_count + record.right_count);

        let depth = self.leaf_depth[leaf] + 1;

        self.leaf_value[leaf] = record.left_output;
        self.leaf_weight[leaf] = record.left_weight;
        self.leaf_count[leaf] = record.left_count;
        self.leaf_parent[leaf] = node as i32;
        self.leaf_depth[leaf] = depth;

        self.leaf_value.push(record.right_output);
        self.leaf_weight.push(record.right_weight);
        self.leaf_count.push(record.right_count);
        self.leaf_parent.push(node as i32);
        self.leaf_depth.push(depth);

        self.num_leaves += 1;
        new_leaf
    }

    /// Multiply all outputs by `rate`.
    pub fn apply_shrinkage(&mut self, rate: f64) {
        for value in self.leaf_value.iter_mut().chain(self.internal_value.iter_mut()) {
            *value *= rate;
        }
        self.shrinkage *= rate;
    }

    /// Add `bias` to all outputs.
    pub fn add_bias(&mut self, bias: f64) {
        for value in self.leaf_value.iter_mut().chain(self.internal_value.iter_mut()) {
            *value += bias;
        }
    }

    fn leaf_index<F>(&self, goes_left: F) -> usize
    where
        F: Fn(usize) -> bool,
    {
        if self.num_leaves <= 1 {
            return 0;
        }
        let mut node = 0i32;
        while node >= 0 {
            let idx = node as usize;
            node = if goes_left(idx) {
                self.left_child[idx]
            } else {
                self.right_child[idx]
            };
        }
        (!node) as usize
    }

    /// Predict from raw feature values; missing features read as zero.
    pub fn predict(&self, features: &[f64]) -> f64 {
        let leaf = self.leaf_index(|node| {
            let value = features
                .get(self.split_feature[node])
                .copied()
                .filter(|v| !v.is_nan())
                .unwrap_or(0.0);
            value <= self.threshold[node]
        });
        self.leaf_value[leaf]
    }

    /// Predict row `row` of a dataset binned with the training mappers.
    pub(crate) fn predict_binned(&self, dataset: &Dataset, row: usize) -> f64 {
        let leaf = self.leaf_index(|node| {
            dataset.bin(self.split_feature[node], row) <= self.threshold_bin[node]
        });
        self.leaf_value[leaf]
    }

    /// Text block for the model file, without the `Tree=` header.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = writeln!(out, "num_leaves={}", self.num_leaves);
        let _ = writeln!(out, "num_cat=0");
        if self.num_leaves > 1 {
            let _ = writeln!(out, "split_feature={}", join(&self.split_feature));
            let _ = writeln!(out, "split_gain={}", join(&self.split_gain));
            let _ = writeln!(out, "threshold={}", join(&self.threshold));
            let decision_types = vec![DECISION_TYPE_NUMERICAL; self.num_internal()];
            let _ = writeln!(out, "decision_type={}", join(&decision_types));
            let _ = writeln!(out, "left_child={}", join(&self.left_child));
            let _ = writeln!(out, "right_child={}", join(&self.right_child));
            let _ = writeln!(out, "leaf_value={}", join(&self.leaf_value));
            let _ = writeln!(out, "leaf_weight={}", join(&self.leaf_weight));
            let _ = writeln!(out, "leaf_count={}", join(&self.leaf_count));
            let _ = writeln!(out, "internal_value={}", join(&self.internal_value));
            let _ = writeln!(out, "internal_weight={}", join(&self.internal_weight));
            let _ = writeln!(out, "internal_count={}", join(&self.internal_count));
        } else {
            let _ = writeln!(out, "leaf_value={}", join(&self.leaf_value));
        }
        let _ = writeln!(out, "shrinkage={}", self.shrinkage);
        out
    }

    /// Rebuild a tree from the `key=value` fields of a text block.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let num_leaves: usize = parse_scalar(fields, "num_leaves")?;
        let shrinkage: f64 = match fields.get("shrinkage") {
            Some(_) => parse_scalar(fields, "shrinkage")?,
            None => 1.0,
        };

        if num_leaves == 0 {
            return Err(BoostError::ModelFormat("tree has zero leaves".to_string()));
        }

        let leaf_value: Vec<f64> = parse_list(fields, "leaf_value")?;
        if leaf_value.len() != num_leaves {
            return Err(BoostError::ModelFormat(format!(
                "leaf_value has {} entries, expected {}",
                leaf_value.len(),
                num_leaves
            )));
        }

        if num_leaves == 1 {
            let mut tree = Self::single_leaf(leaf_value[0], 0, 0.0);
            tree.shrinkage = shrinkage;
            return Ok(tree);
        }

        let internal = num_leaves - 1;
        let split_feature: Vec<usize> = parse_list(fields, "split_feature")?;
        let threshold: Vec<f64> = parse_list(fields, "threshold")?;
        let left_child: Vec<i32> = parse_list(fields, "left_child")?;
        let right_child: Vec<i32> = parse_list(fields, "right_child")?;
        for (name, len) in [
            ("split_feature", split_feature.len()),
            ("threshold", threshold.len()),
            ("left_child", left_child.len()),
            ("right_child", right_child.len()),
        ] {
            if len != internal {
                return Err(BoostError::ModelFormat(format!(
                    "{name} has {len} entries, expected {internal}"
                )));
            }
        }

        let in_range = |child: i32| {
            if child >= 0 {
                (child as usize) < internal
            } else {
                ((!child) as usize) < num_leaves
            }
        };
        if let Some(bad) = left_child.iter().chain(&right_child).find(|&&c| !in_range(c)) {
            return Err(BoostError::ModelFormat(format!("child reference {bad} out of range")));
        }

        let optional_f64 = |key: &str, len: usize| -> Result<Vec<f64>> {
            match fields.get(key) {
                Some(_) => parse_list(fields, key),
                None => Ok(vec![0.0; len]),
            }
        };
        let optional_usize = |key: &str, len: usize| -> Result<Vec<usize>> {
            match fields.get(key) {
                Some(_) => parse_list(fields, key),
                None => Ok(vec![0; len]),
            }
        };

        // Children sit after their parent; every non-root node and every
        // leaf is referenced exactly once
        let mut node_refs = vec![0usize; internal];
        let mut leaf_refs = vec![0usize; num_leaves];
        let mut leaf_parent = vec![-1i32; num_leaves];
        for (node, (&left, &right)) in left_child.iter().zip(&right_child).enumerate() {
            for child in [left, right] {
                if child >= 0 {
                    let child = child as usize;
                    if child <= node {
                        return Err(BoostError::ModelFormat(format!(
                            "node {node} references earlier node {child}"
                        )));
                    }
                    node_refs[child] += 1;
                } else {
                    let leaf = (!child) as usize;
                    leaf_refs[leaf] += 1;
                    leaf_parent[leaf] = node as i32;
                }
            }
        }
        if let Some(node) = (1..internal).find(|&node| node_refs[node] != 1) {
            return Err(BoostError::ModelFormat(format!(
                "node {node} is referenced {} times",
                node_refs[node]
            )));
        }
        if let Some(leaf) = (0..num_leaves).find(|&leaf| leaf_refs[leaf] != 1) {
            return Err(BoostError::ModelFormat(format!(
                "leaf {leaf} is referenced {} times",
                leaf_refs[leaf]
            )));
        }

        Ok(Self {
            num_leaves,
            split_gain: optional_f64("split_gain", internal)?,
            split_feature,
            threshold,
            threshold_bin: Vec::new(),
            left_child,
            right_child,
            leaf_value,
            leaf_weight: optional_f64("leaf_weight", num_leaves)?,
            leaf_count: optional_usize("leaf_count", num_leaves)?,
            internal_value: optional_f64("internal_value", internal)?,
            internal_weight: optional_f64("internal_weight", internal)?,
            internal_count: optional_usize("internal_count", internal)?,
            leaf_parent,
            leaf_depth: vec![0; num_leaves],
            shrinkage,
        })
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_scalar<T: FromStr>(fields: &HashMap<String, String>, key: &str) -> Result<T> {
    let raw = fields
        .get(key)
        .ok_or_else(|| BoostError::ModelFormat(format!("tree is missing {key}")))?;
    raw.trim()
        .parse()
        .map_err(|_| BoostError::ModelFormat(format!("invalid {key}: {raw}")))
}

fn parse_list<T: FromStr>(fields: &HashMap<String, String>, key: &str) -> Result<Vec<T>> {
    let raw = fields
        .get(key)
        .ok_or_else(|| BoostError::ModelFormat(format!("tree is missing {key}")))?;
    raw.split_whitespace()
        .map(|token| {
            token
                .parse()
                .map_err(|_| BoostError::ModelFormat(format!("invalid {key} entry: {token}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(feature: usize, threshold: f64, left: f64, right: f64) -> SplitRecord {
        SplitRecord {
            feature,
            threshold_bin: 0,
            threshold,
            gain: 1.0,
            left_output: left,
            right_output: right,
            left_count: 1,
            right_count: 1,
            left_weight: 1.0,
            right_weight: 1.0,
        }
    }

    /// feature0 <= 50 ? (feature1 <= 5 ? 1 : 2) : 3
    fn two_level_tree() -> Tree {
        let mut tree = Tree::single_leaf(0.0, 2, 2.0);
        let right = tree.split(0, &record(0, 50.0, 1.5, 3.0));
        assert_eq!(right, 1);
        let right = tree.split(0, &record(1, 5.0, 1.0, 2.0));
        assert_eq!(right, 2);
        tree
    }

    #[test]
    fn test_single_leaf_predicts_constant() {
        let tree = Tree::single_leaf(0.7, 3, 1.0);
        assert_eq!(tree.predict(&[1.0, 2.0]), 0.7);
        assert_eq!(tree.predict(&[]), 0.7);
    }

    #[test]
    fn test_split_rewires_parent() {
        let tree = two_level_tree();
        assert_eq!(tree.num_leaves, 3);
        assert_eq!(tree.left_child, vec![1, !0]);
        assert_eq!(tree.right_child, vec![!1, !2]);
        assert_eq!(tree.leaf_depth(0), 2);
        assert_eq!(tree.leaf_depth(1), 1);
        assert_eq!(tree.internal_value, vec![0.0, 1.5]);
    }

    #[test]
    fn test_predict_goes_left_on_equal() {
        let tree = two_level_tree();
        assert_eq!(tree.predict(&[50.0, 5.0]), 1.0);
        assert_eq!(tree.predict(&[50.0, 6.0]), 2.0);
        assert_eq!(tree.predict(&[51.0, 0.0]), 3.0);
        assert_eq!(tree.predict(&[f64::NAN, f64::NAN]), 1.0);
    }

    #[test]
    fn test_shrinkage_and_bias() {
        let mut tree = two_level_tree();
        tree.apply_shrinkage(0.5);
        tree.add_bias(1.0);
        assert_eq!(tree.leaf_value, vec![1.5, 2.5, 2.0]);
        assert_eq!(tree.shrinkage, 0.5);
    }

    #[test]
    fn test_text_round_trip() {
        let tree = two_level_tree();
        let fields: HashMap<String, String> = tree
            .to_text()
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let parsed = Tree::from_fields(&fields).unwrap();

        assert_eq!(parsed.num_leaves, tree.num_leaves);
        assert_eq!(parsed.left_child, tree.left_child);
        assert_eq!(parsed.threshold, tree.threshold);
        assert_eq!(parsed.leaf_value, tree.leaf_value);
        for features in [[10.0, 1.0], [10.0, 9.0], [70.0, 0.0]] {
            assert_eq!(parsed.predict(&features), tree.predict(&features));
        }
    }

    #[test]
    fn test_from_fields_rejects_bad_children() {
        let mut fields = HashMap::new();
        fields.insert("num_leaves".to_string(), "2".to_string());
        fields.insert("split_feature".to_string(), "0".to_string());
        fields.insert("threshold".to_string(), "1.5".to_string());
        fields.insert("left_child".to_string(), "-1".to_string());
        fields.insert("right_child".to_string(), "-5".to_string());
        fields.insert("leaf_value".to_string(), "0.1 0.2".to_string());
        assert!(Tree::from_fields(&fields).is_err());

        fields.insert("right_child".to_string(), "-2".to_string());
        assert!(Tree::from_fields(&fields).is_ok());
    }

    fn two_leaf_fields(left: &str, right: &str) -> HashMap<String, String> {
        [
            ("num_leaves", "2"),
            ("split_feature", "0"),
            ("threshold", "1.5"),
            ("left_child", left),
            ("right_child", right),
            ("leaf_value", "0.1 0.2"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_from_fields_rejects_cycles() {
        // node 0 pointing at itself would never reach a leaf
        assert!(Tree::from_fields(&two_leaf_fields("0", "-1")).is_err());
        assert!(Tree::from_fields(&two_leaf_fields("-1", "0")).is_err());
    }

    #[test]
    fn test_from_fields_rejects_shared_children() {
        // both sides point at leaf 0, leaf 1 is unreachable
        assert!(Tree::from_fields(&two_leaf_fields("-1", "-1")).is_err());

        let mut fields = two_leaf_fields("-1", "-2");
        fields.insert("num_leaves".to_string(), "3".to_string());
        fields.insert("split_feature".to_string(), "0 0".to_string());
        fields.insert("threshold".to_string(), "2.5 1.5".to_string());
        fields.insert("leaf_value".to_string(), "0.1 0.2 0.3".to_string());
        // node 1 is referenced twice and leaf 2 never
        fields.insert("left_child".to_string(), "1 -1".to_string());
        fields.insert("right_child".to_string(), "1 -2".to_string());
        assert!(Tree::from_fields(&fields).is_err());

        fields.insert("left_child".to_string(), "1 -1".to_string());
        fields.insert("right_child".to_string(), "-3 -2".to_string());
        let tree = Tree::from_fields(&fields).unwrap();
        assert_eq!(tree.predict(&[1.0]), 0.1);
        assert_eq!(tree.predict(&[2.0]), 0.2);
        assert_eq!(tree.predict(&[3.0]), 0.3);
    }
}
