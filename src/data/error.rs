//! Error types for the data layer

use thiserror::Error;

/// Errors raised while constructing or configuring datasets, data modules,
/// and image views. Lifecycle misuse (setup before prepare, loaders before
/// setup) is a programmer error and panics instead.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("length mismatch: {name} has {got} entries, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid split proportions: val={val}, test={test} (must be non-negative and sum to <= 1)")]
    InvalidProportions { val: f64, test: f64 },

    #[error("image data length {got} does not match {channels}x{height}x{width}")]
    ImageShape {
        channels: usize,
        height: usize,
        width: usize,
        got: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("dataset is empty")]
    EmptyDataset,
}

/// Result type for data-layer operations.
pub type Result<T> = std::result::Result<T, DataError>;
