//! Train/validation split
//!
//! The first `floor(n * train_ratio)` rows become the training partition and
//! the rest the validation partition. Row order is preserved; there is no
//! shuffling.

use crate::dataset::{Row, Table};
use crate::errors::{Result, TrainerError};

/// Default share of rows used for training
pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;

/// Row-major feature matrix plus labels for one side of the split
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    /// `num_rows * num_features` values, row-major
    pub features: Vec<f64>,
    pub labels: Vec<f32>,
    pub num_rows: usize,
    pub num_features: usize,
}

impl Partition {
    /// Flatten `rows`: column 0 goes to the labels, the rest to the
    /// feature matrix. Every row must have `num_features + 1` columns;
    /// `first_row` is used to report the offending row's table index.
    fn from_rows(rows: &[Row], num_features: usize, first_row: usize) -> Result<Self> {
        let mut features = Vec::with_capacity(rows.len() * num_features);
        let mut labels = Vec::with_capacity(rows.len());

        for (offset, row) in rows.iter().enumerate() {
            if row.len() != num_features + 1 {
                return Err(TrainerError::ShapeMismatch {
                    row: first_row + offset,
                    expected: num_features + 1,
                    found: row.len(),
                });
            }
            labels.push(row[0] as f32);
            features.extend_from_slice(&row[1..]);
        }

        Ok(Self {
            features,
            labels,
            num_rows: rows.len(),
            num_features,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }
}

/// Number of training rows for `n` rows, truncating toward zero.
pub fn train_size(n: usize, train_ratio: f64) -> usize {
    ((n as f64 * train_ratio) as usize).min(n)
}

/// Split `table` into `(train, valid)` partitions.
///
/// The feature count is taken from the first row.
pub fn split_table(table: Table, train_ratio: f64) -> Result<(Partition, Partition)> {
    if !(0.0..=1.0).contains(&train_ratio) {
        return Err(TrainerError::Config(format!(
            "train_ratio must be within [0, 1], got {train_ratio}"
        )));
    }
    let first = table.rows.first().ok_or(TrainerError::EmptyDataset)?;
    if first.is_empty() {
        return Err(TrainerError::ShapeMismatch {
            row: 0,
            expected: 1,
            found: 0,
        });
    }
    let num_features = first.len() - 1;

    let cut = train_size(table.len(), train_ratio);
    let (train_rows, valid_rows) = table.rows.split_at(cut);
    let train = Partition::from_rows(train_rows, num_features, 0)?;
    let valid = Partition::from_rows(valid_rows, num_features, cut)?;

    Ok((train, valid))
}
