use thiserror::Error;

/// Errors raised by classifiers and the ensemble adapter.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Invalid construction parameters or incompatible members.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A member does not satisfy the classifier contract.
    #[error("member does not conform to the classifier contract: {0}")]
    NonConforming(String),
    /// Operation not available on this classifier.
    #[error("operation `{operation}` is not supported by this classifier")]
    Unsupported {
        /// Name of the rejected operation.
        operation: &'static str,
    },
    /// Input or label array has the wrong shape.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// Expected dimensions.
        expected: Vec<usize>,
        /// Dimensions received.
        found: Vec<usize>,
    },
    /// Class index outside `0..num_classes`.
    #[error("label {label} out of range for {num_classes} classes")]
    InvalidLabel {
        /// Requested label.
        label: usize,
        /// Number of classes of the model.
        num_classes: usize,
    },
    /// Layer lookup failed.
    #[error("unknown layer: {0}")]
    UnknownLayer(String),
    /// Array construction failure.
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T, E = ClassifierError> = std::result::Result<T, E>;

impl ClassifierError {
    /// Shorthand for [`ClassifierError::Unsupported`].
    #[must_use]
    pub const fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    /// Returns `true` for [`ClassifierError::Unsupported`].
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}
