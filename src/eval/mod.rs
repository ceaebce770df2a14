//! Evaluation metrics
//!
//! Classification metrics for the downstream probe plus fairness gaps over
//! sensitive-attribute groups.

mod classification;
mod fairness;

pub use classification::ConfusionMatrix;
pub use fairness::{fairness_report, FairnessReport};
