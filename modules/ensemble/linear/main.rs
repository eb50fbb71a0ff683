//! Reference member: a dense softmax classifier with analytic gradients.

/// Softmax, flattening and loss helpers.
pub mod func;
/// The classifier itself.
pub mod model;

pub use model::LinearSoftmaxClassifier;
