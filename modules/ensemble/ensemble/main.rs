//! Weighted-average ensembling of pre-trained classifiers.

/// The ensemble adapter.
pub mod adapter;
/// Aggregation helpers.
pub mod func;
/// Member compatibility checks.
pub mod reviewer;

#[cfg(test)]
mod fixtures;

pub use adapter::{EnsembleClassifier, EnsembleMember};
pub use reviewer::MemberReviewer;
