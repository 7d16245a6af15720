//! Histogram gradient boosting engine
//!
//! Exposes a handle-style API modelled on the usual boosting library calls:
//! build a [`Dataset`] from a row-major matrix, attach labels, build a
//! validation dataset against it as reference, then drive a [`Booster`] one
//! round at a time and save its [`Model`] as text.
//!
//! Parameters are passed as whitespace-separated `key=value` strings and
//! parsed by [`Config::parse`]. Only the binary log-loss objective is
//! supported.

pub mod booster;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod learner;
pub mod metrics;
pub mod model;
pub mod objective;
pub mod random;
pub mod tree;

pub use booster::{Booster, FinishReason};
pub use config::{Config, ObjectiveKind};
pub use dataset::{BinMapper, Dataset};
pub use errors::{BoostError, Result};
pub use metrics::MetricKind;
pub use model::Model;
pub use tree::Tree;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
