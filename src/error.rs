//! Error types for model construction and configuration loading.
//!
//! Every error here is raised before training starts. Numerical trouble during
//! an iteration is absorbed by the leaf-fitting step and never surfaces as a
//! `CoxError`.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoxError>;

#[derive(Debug, Error)]
pub enum CoxError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigurationError),
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CoxError {
    /// True when the error is a configuration problem rather than an I/O or parse failure.
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, CoxError::InvalidConfiguration(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("unknown tie-handling method {0:?}, expected \"efron\" or \"breslow\"")]
    UnknownTieMethod(String),
    #[error("no tie-handling method given")]
    MissingTieMethod,
    #[error("response table has {0} columns, expected (end, status) or (start, end, status)")]
    ResponseColumns(usize),
    #[error("sort table has {found} columns, the {layout} layout needs {expected}")]
    SortColumns {
        layout: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{what} has {found} rows, expected {expected}")]
    RowCount {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{column} sort order is not a permutation of 0..{n_rows}")]
    NotAPermutation { column: &'static str, n_rows: usize },
    #[error("{column} sort order breaks (stratum, time) ordering at position {position}")]
    UnsortedOrder {
        column: &'static str,
        position: usize,
    },
    #[error("start and end sort orders disagree on the stratum sequence")]
    StrataMismatch,
    #[error("row {row} starts at {start} after it ends at {end}")]
    StartAfterEnd { row: usize, start: f64, end: f64 },
    #[error("row {row} has non-finite time {value}")]
    NonFiniteTime { row: usize, value: f64 },
    #[error("row {row} has status {value}, expected 0 or 1")]
    InvalidStatus { row: usize, value: f64 },
    #[error("row {row} has invalid weight {value}")]
    InvalidWeight { row: usize, value: f64 },
    #[error("prior coefficient of variation must be finite and non-negative, got {0}")]
    InvalidPrior(f64),
    #[error("training set size {train_rows} exceeds the {n_rows} available rows")]
    TrainSize { train_rows: usize, n_rows: usize },
    #[error("{name} = {value} is out of range: {reason}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}
