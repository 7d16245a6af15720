//! Tree ensemble and its text model format
//!
//! # Model Format
//!
//! ```text
//! tree
//! version=v4
//! num_class=1
//! num_tree_per_iteration=1
//! label_index=0
//! max_feature_idx=2
//! objective=binary sigmoid:1
//! feature_names=Column_0 Column_1 Column_2
//! feature_infos=[0:1] none [-3:8]
//! tree_sizes=212 260
//!
//! Tree=0
//! num_leaves=2
//! ...
//! shrinkage=0.1
//!
//!
//! end of trees
//!
//! feature_importances:
//! Column_0=2
//!
//! parameters:
//! [objective: binary]
//! ...
//! end of parameters
//! ```
//!
//! Only the header fields and tree blocks are needed to load a model; the
//! importance and parameter sections are informational.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::errors::{BoostError, Result};
use crate::objective::sigmoid;
use crate::tree::Tree;

const MODEL_VERSION: &str = "v4";

/// Trained ensemble
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub trees: Vec<Tree>,
    pub feature_names: Vec<String>,
    pub feature_infos: Vec<String>,
    /// Sigmoid scale of the binary objective
    pub sigmoid: f64,
    /// Lines for the `parameters:` section
    pub parameters: Vec<String>,
}

impl Model {
    pub fn new(feature_infos: Vec<String>, sigmoid: f64, parameters: Vec<String>) -> Self {
        let feature_names = (0..feature_infos.len())
            .map(|i| format!("Column_{i}"))
            .collect();
        Self {
            trees: Vec::new(),
            feature_names,
            feature_infos,
            sigmoid,
            parameters,
        }
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Sum of tree outputs
    pub fn predict_raw(&self, features: &[f64]) -> f64 {
        self.trees.iter().map(|tree| tree.predict(features)).sum()
    }

    /// Probability of the positive class
    pub fn predict(&self, features: &[f64]) -> f64 {
        sigmoid(self.predict_raw(features), self.sigmoid)
    }

    /// Number of splits per feature, most used first; unused features are
    /// left out.
    pub fn feature_importances(&self) -> Vec<(String, usize)> {
        let mut counts = vec![0usize; self.num_features()];
        for tree in &self.trees {
            for &feature in &tree.split_feature {
                if let Some(count) = counts.get_mut(feature) {
                    *count += 1;
                }
            }
        }
        let mut importances: Vec<(String, usize)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(counts)
            .filter(|(_, count)| *count > 0)
            .collect();
        // Stable sort keeps feature order among equal counts
        importances.sort_by(|a, b| b.1.cmp(&a.1));
        importances
    }

    /// Render the model; `num_iteration <= 0` keeps every tree.
    pub fn to_model_string(&self, num_iteration: i32) -> String {
        let keep = if num_iteration > 0 {
            (num_iteration as usize).min(self.trees.len())
        } else {
            self.trees.len()
        };

        let blocks: Vec<String> = self.trees[..keep]
            .iter()
            .enumerate()
            .map(|(i, tree)| format!("Tree={i}\n{}\n", tree.to_text()))
            .collect();
        let sizes: Vec<String> = blocks.iter().map(|b| b.len().to_string()).collect();

        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = writeln!(out, "tree");
        let _ = writeln!(out, "version={MODEL_VERSION}");
        let _ = writeln!(out, "num_class=1");
        let _ = writeln!(out, "num_tree_per_iteration=1");
        let _ = writeln!(out, "label_index=0");
        let _ = writeln!(out, "max_feature_idx={}", self.num_features() as i64 - 1);
        let _ = writeln!(out, "objective=binary sigmoid:{}", self.sigmoid);
        let _ = writeln!(out, "feature_names={}", self.feature_names.join(" "));
        let _ = writeln!(out, "feature_infos={}", self.feature_infos.join(" "));
        let _ = writeln!(out, "tree_sizes={}", sizes.join(" "));
        out.push('\n');
        for block in &blocks {
            out.push_str(block);
        }
        out.push_str("\nend of trees\n\nfeature_importances:\n");
        for (name, count) in self.feature_importances() {
            let _ = writeln!(out, "{name}={count}");
        }
        out.push_str("\nparameters:\n");
        for line in &self.parameters {
            let _ = writeln!(out, "{line}");
        }
        out.push_str("end of parameters\n");
        out
    }

    pub fn save(&self, path: &Path, num_iteration: i32) -> Result<()> {
        fs::write(path, self.to_model_string(num_iteration))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse a model rendered by [`Model::to_model_string`].
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().map(str::trim);

        match lines.by_ref().find(|line| !line.is_empty()) {
            Some("tree") => {}
            other => {
                return Err(BoostError::ModelFormat(format!(
                    "expected 'tree' header, found {:?}",
                    other.unwrap_or("end of input")
                )))
            }
        }

        let mut header: HashMap<String, String> = HashMap::new();
        let mut trees = Vec::new();
        let mut current: Option<HashMap<String, String>> = None;
        let mut parameters = Vec::new();
        let mut in_parameters = false;

        for line in lines {
            if in_parameters {
                if line == "end of parameters" {
                    in_parameters = false;
                } else if !line.is_empty() {
                    parameters.push(line.to_string());
                }
                continue;
            }
            if line.starts_with("Tree=") {
                if let Some(fields) = current.take() {
                    trees.push(Tree::from_fields(&fields)?);
                }
                current = Some(HashMap::new());
                continue;
            }
            if line == "end of trees" {
                if let Some(fields) = current.take() {
                    trees.push(Tree::from_fields(&fields)?);
                }
                continue;
            }
            if line == "parameters:" {
                in_parameters = true;
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match current.as_mut() {
                Some(fields) => {
                    fields.insert(key.to_string(), value.to_string());
                }
                None if trees.is_empty() => {
                    header.insert(key.to_string(), value.to_string());
                }
                // feature importances after the trees
                None => {}
            }
        }
        if let Some(fields) = current.take() {
            trees.push(Tree::from_fields(&fields)?);
        }

        let num_class = header.get("num_class").map(String::as_str).unwrap_or("1");
        if num_class != "1" {
            return Err(BoostError::ModelFormat(format!(
                "only single-class models are supported, got num_class={num_class}"
            )));
        }

        let objective = header
            .get("objective")
            .ok_or_else(|| BoostError::ModelFormat("missing objective".to_string()))?;
        let sigmoid = parse_sigmoid(objective)?;

        let max_feature_idx: i64 = header
            .get("max_feature_idx")
            .ok_or_else(|| BoostError::ModelFormat("missing max_feature_idx".to_string()))?
            .parse()
            .map_err(|_| BoostError::ModelFormat("invalid max_feature_idx".to_string()))?;
        let num_features = (max_feature_idx + 1).max(0) as usize;

        let split_names = |key: &str| -> Vec<String> {
            header
                .get(key)
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default()
        };
        let mut feature_names = split_names("feature_names");
        if feature_names.len() != num_features {
            feature_names = (0..num_features).map(|i| format!("Column_{i}")).collect();
        }
        let mut feature_infos = split_names("feature_infos");
        feature_infos.resize(num_features, "none".to_string());

        if let Some(tree) = trees
            .iter()
            .find(|tree| tree.split_feature.iter().any(|&f| f >= num_features))
        {
            return Err(BoostError::ModelFormat(format!(
                "tree splits on feature outside max_feature_idx={max_feature_idx}: {:?}",
                tree.split_feature
            )));
        }

        Ok(Self {
            trees,
            feature_names,
            feature_infos,
            sigmoid,
            parameters,
        })
    }
}

fn parse_sigmoid(objective: &str) -> Result<f64> {
    let mut parts = objective.split_whitespace();
    match parts.next() {
        Some("binary") => {}
        other => {
            return Err(BoostError::ModelFormat(format!(
                "unsupported objective in model: {}",
                other.unwrap_or("")
            )))
        }
    }
    for part in parts {
        if let Some(value) = part.strip_prefix("sigmoid:") {
            return value
                .parse()
                .map_err(|_| BoostError::ModelFormat(format!("invalid sigmoid: {value}")));
        }
    }
    Ok(1.0)
}
