//! Binary log-loss objective

use crate::config::Config;
use crate::errors::{BoostError, Result};

/// Positive rates are clamped to `[EPSILON, 1 - EPSILON]` for the initial score.
const INIT_EPSILON: f64 = 1e-15;

/// Gradients and hessians of the logistic loss with a sigmoid link
#[derive(Debug, Clone)]
pub struct BinaryLogloss {
    sigmoid: f64,
    scale_pos_weight: f64,
}

impl BinaryLogloss {
    pub fn new(config: &Config) -> Self {
        Self {
            sigmoid: 1.0,
            scale_pos_weight: config.scale_pos_weight,
        }
    }

    pub fn sigmoid(&self) -> f64 {
        self.sigmoid
    }

    /// Labels must be exactly 0 or 1.
    pub fn check_labels(labels: &[f32]) -> Result<()> {
        if let Some((row, label)) = labels
            .iter()
            .enumerate()
            .find(|(_, label)| **label != 0.0 && **label != 1.0)
        {
            return Err(BoostError::Booster(format!(
                "binary objective requires labels 0 or 1, row {row} has {label}"
            )));
        }
        Ok(())
    }

    /// Initial raw score: the log-odds of the positive rate.
    pub fn boost_from_score(&self, labels: &[f32]) -> f64 {
        if labels.is_empty() {
            return 0.0;
        }
        let positives = labels.iter().filter(|&&label| label > 0.0).count();
        let rate = (positives as f64 / labels.len() as f64).clamp(INIT_EPSILON, 1.0 - INIT_EPSILON);
        (rate / (1.0 - rate)).ln() / self.sigmoid
    }

    /// Fill `gradients` and `hessians` for the current raw `scores`.
    pub fn get_gradients(
        &self,
        labels: &[f32],
        scores: &[f64],
        gradients: &mut [f64],
        hessians: &mut [f64],
    ) {
        for (i, (&label, &score)) in labels.iter().zip(scores).enumerate() {
            let (sign, weight) = if label > 0.0 {
                (1.0, self.scale_pos_weight)
            } else {
                (-1.0, 1.0)
            };
            let response = -sign * self.sigmoid / (1.0 + (sign * self.sigmoid * score).exp());
            let abs_response = response.abs();
            gradients[i] = response * weight;
            hessians[i] = abs_response * (self.sigmoid - abs_response) * weight;
        }
    }

    /// Convert a raw score to the probability of the positive class.
    pub fn convert_output(&self, raw: f64) -> f64 {
        sigmoid(raw, self.sigmoid)
    }
}

pub(crate) fn sigmoid(raw: f64, scale: f64) -> f64 {
    1.0 / (1.0 + (-scale * raw).exp())
}
