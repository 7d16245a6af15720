//! Binned training and validation datasets
//!
//! A dataset is built from a row-major `f64` matrix. Each feature is
//! discretized through a [`BinMapper`]; a dataset created with a reference
//! reuses the reference's mappers so that both bin values identically.

use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::errors::{BoostError, Result};

/// Bin index type; `max_bin` is bounded well below `u16::MAX`
pub type Bin = u16;

/// Per-feature mapping from raw values to histogram bins
///
/// Bin `b` holds values `v` with `upper_bounds[b - 1] < v <= upper_bounds[b]`.
/// The last upper bound is `+inf`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinMapper {
    upper_bounds: Vec<f64>,
    min_value: f64,
    max_value: f64,
}

impl BinMapper {
    /// Build a mapper from one feature column.
    ///
    /// Distinct values are grouped greedily in ascending order so that each
    /// bin holds at least `max(min_data_in_bin, ceil(n / max_bin))` rows
    /// where possible, with at most `max_bin` bins. Bin boundaries sit at the
    /// midpoint between adjacent distinct values.
    pub fn from_values(values: &[f64], max_bin: usize, min_data_in_bin: usize) -> Self {
        let mut sorted: Vec<f64> = values.iter().map(|&v| sanitize(v)).collect();
        sorted.sort_by(f64::total_cmp);

        let mut distinct: Vec<(f64, usize)> = Vec::new();
        for v in sorted {
            match distinct.last_mut() {
                Some((last, count)) if *last == v => *count += 1,
                _ => distinct.push((v, 1)),
            }
        }

        let (min_value, max_value) = match (distinct.first(), distinct.last()) {
            (Some(first), Some(last)) => (first.0, last.0),
            _ => (0.0, 0.0),
        };

        let total = values.len();
        let max_bin = max_bin.max(2);
        let per_bin = min_data_in_bin.max(1).max(total.div_ceil(max_bin));

        let mut upper_bounds = Vec::new();
        let mut in_bin = 0usize;
        for (i, &(value, count)) in distinct.iter().enumerate() {
            in_bin += count;
            let Some(&(next, _)) = distinct.get(i + 1) else {
                break;
            };
            if in_bin >= per_bin && upper_bounds.len() + 1 < max_bin {
                upper_bounds.push(bin_boundary(value, next));
                in_bin = 0;
            }
        }
        upper_bounds.push(f64::INFINITY);

        Self {
            upper_bounds,
            min_value,
            max_value,
        }
    }

    pub fn num_bins(&self) -> usize {
        self.upper_bounds.len()
    }

    /// A feature with a single bin can never be split on
    pub fn is_trivial(&self) -> bool {
        self.num_bins() <= 1
    }

    pub fn value_to_bin(&self, value: f64) -> Bin {
        let value = sanitize(value);
        self.upper_bounds.partition_point(|&ub| ub < value) as Bin
    }

    /// Raw threshold for a split that sends bins `<= bin` left
    pub fn bin_to_threshold(&self, bin: Bin) -> f64 {
        self.upper_bounds[bin as usize]
    }

    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    /// Range description used in the model header
    pub fn feature_info(&self) -> String {
        if self.is_trivial() {
            "none".to_string()
        } else {
            format!("[{}:{}]", self.min_value, self.max_value)
        }
    }
}

/// Upper bound separating adjacent distinct values `lo < hi`.
///
/// The midpoint when it is finite and lies in `[lo, hi)`. Infinite
/// endpoints fall back to the nearest finite extreme, and `lo` itself is
/// used when nothing in between is representable.
fn bin_boundary(lo: f64, hi: f64) -> f64 {
    let mid = if lo.is_finite() && hi.is_finite() {
        let mid = lo + (hi - lo) / 2.0;
        if mid.is_finite() {
            mid
        } else {
            lo / 2.0 + hi / 2.0
        }
    } else if lo == f64::NEG_INFINITY {
        f64::MIN
    } else {
        f64::MAX
    };

    if mid >= lo && mid < hi {
        mid
    } else {
        lo
    }
}

/// Missing values are treated as zero
fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

/// Binned dataset handle
#[derive(Debug, Clone)]
pub struct Dataset {
    num_data: usize,
    num_features: usize,
    bin_mappers: Arc<Vec<BinMapper>>,
    /// Column-major bins, `bins[feature][row]`
    bins: Vec<Vec<Bin>>,
    labels: Option<Vec<f32>>,
}

impl Dataset {
    /// Create a dataset from a row-major matrix.
    ///
    /// With `reference`, the reference's bin mappers are reused and the
    /// feature count must match.
    pub fn from_mat(
        data: &[f64],
        nrows: usize,
        ncols: usize,
        params: &str,
        reference: Option<&Dataset>,
    ) -> Result<Self> {
        let config = Config::parse(params)?;

        if nrows == 0 {
            return Err(BoostError::Dataset(
                "cannot construct a dataset from zero rows".to_string(),
            ));
        }
        if ncols == 0 {
            return Err(BoostError::Dataset(
                "cannot construct a dataset with zero features".to_string(),
            ));
        }
        if data.len() != nrows * ncols {
            return Err(BoostError::Dataset(format!(
                "matrix buffer holds {} values, expected {} ({} rows x {} columns)",
                data.len(),
                nrows * ncols,
                nrows,
                ncols
            )));
        }

        let bin_mappers = match reference {
            Some(reference) => {
                if reference.num_features != ncols {
                    return Err(BoostError::Dataset(format!(
                        "reference dataset has {} features, got {}",
                        reference.num_features, ncols
                    )));
                }
                Arc::clone(&reference.bin_mappers)
            }
            None => {
                let mappers = (0..ncols)
                    .map(|feature| {
                        let column: Vec<f64> =
                            (0..nrows).map(|row| data[row * ncols + feature]).collect();
                        BinMapper::from_values(&column, config.max_bin, config.min_data_in_bin)
                    })
                    .collect();
                Arc::new(mappers)
            }
        };

        let bins = (0..ncols)
            .map(|feature| {
                let mapper = &bin_mappers[feature];
                (0..nrows)
                    .map(|row| mapper.value_to_bin(data[row * ncols + feature]))
                    .collect()
            })
            .collect();

        debug!(
            "Constructed dataset: {} rows, {} features, {} usable",
            nrows,
            ncols,
            bin_mappers.iter().filter(|m| !m.is_trivial()).count()
        );

        Ok(Self {
            num_data: nrows,
            num_features: ncols,
            bin_mappers,
            bins,
            labels: None,
        })
    }

    /// Attach labels, one per row.
    pub fn set_label(&mut self, labels: &[f32]) -> Result<()> {
        if labels.len() != self.num_data {
            return Err(BoostError::Dataset(format!(
                "label length {} does not match {} rows",
                labels.len(),
                self.num_data
            )));
        }
        self.labels = Some(labels.to_vec());
        Ok(())
    }

    pub fn labels(&self) -> Option<&[f32]> {
        self.labels.as_deref()
    }

    pub fn num_data(&self) -> usize {
        self.num_data
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn bin_mapper(&self, feature: usize) -> &BinMapper {
        &self.bin_mappers[feature]
    }

    pub fn bin_mappers(&self) -> &[BinMapper] {
        &self.bin_mappers
    }

    /// Whether both datasets bin through the same mappers
    pub fn shares_bins_with(&self, other: &Dataset) -> bool {
        Arc::ptr_eq(&self.bin_mappers, &other.bin_mappers)
    }

    pub fn bin(&self, feature: usize, row: usize) -> Bin {
        self.bins[feature][row]
    }

    pub(crate) fn feature_bins(&self, feature: usize) -> &[Bin] {
        &self.bins[feature]
    }
}
