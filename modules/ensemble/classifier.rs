use std::{
    fmt,
    path::{Path, PathBuf},
};

use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ClassifierError, Result},
    generator::DataGenerator,
};

/// Inclusive `(min, max)` range of valid feature values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipValues {
    /// Smallest admissible feature value.
    pub min: f32,
    /// Largest admissible feature value.
    pub max: f32,
}

impl ClipValues {
    /// Creates a range.
    #[must_use]
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Returns `true` when both bounds are finite and ordered.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    /// Clamps every element of `x` into the range.
    #[must_use]
    pub fn clip(&self, x: &ArrayD<f32>) -> ArrayD<f32> {
        x.mapv(|value| value.clamp(self.min, self.max))
    }
}

impl Default for ClipValues {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl From<(f32, f32)> for ClipValues {
    fn from((min, max): (f32, f32)) -> Self {
        Self::new(min, max)
    }
}

impl fmt::Display for ClipValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.min, self.max)
    }
}

/// Affine input normalization `(x - subtrahend) / divisor`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Preprocessing {
    /// Value subtracted from every feature.
    pub subtrahend: f32,
    /// Value every shifted feature is divided by.
    pub divisor: f32,
}

impl Preprocessing {
    /// Creates a preprocessing step.
    #[must_use]
    pub const fn new(subtrahend: f32, divisor: f32) -> Self {
        Self {
            subtrahend,
            divisor,
        }
    }

    /// Rejects non-finite parameters and a zero divisor.
    pub fn validate(&self) -> Result<()> {
        if !self.subtrahend.is_finite() || !self.divisor.is_finite() || self.divisor == 0.0 {
            return Err(ClassifierError::Configuration(format!(
                "invalid preprocessing ({}, {})",
                self.subtrahend, self.divisor
            )));
        }
        Ok(())
    }

    /// Applies the normalization elementwise.
    #[must_use]
    pub fn apply(&self, x: &ArrayD<f32>) -> ArrayD<f32> {
        x.mapv(|value| (value - self.subtrahend) / self.divisor)
    }
}

impl Default for Preprocessing {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

/// Layer selector for [`Classifier::get_activations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerRef {
    /// Position in [`Classifier::layer_names`].
    Index(usize),
    /// Layer name as reported by [`Classifier::layer_names`].
    Name(String),
}

impl fmt::Display for LayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "#{index}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Capability contract shared by ensemble members and the ensemble itself.
///
/// Inputs are batches shaped `(batch, *input_shape)`; labels are one-hot
/// matrices shaped `(batch, num_classes)`. Training and introspection
/// operations default to [`ClassifierError::Unsupported`].
pub trait Classifier: Send + Sync {
    /// Shape of a single sample.
    fn input_shape(&self) -> &[usize];

    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Range of valid feature values.
    fn clip_values(&self) -> ClipValues;

    /// Class scores shaped `(batch, num_classes)`: probabilities, or logits when `logits` is set.
    fn predict(&self, x: &ArrayD<f32>, logits: bool) -> Result<Array2<f32>>;

    /// Input gradients of the class outputs, shaped `(batch, k, *input_shape)`.
    ///
    /// `k` is `num_classes` when `label` is `None` and `1` otherwise.
    fn class_gradient(
        &self,
        x: &ArrayD<f32>,
        label: Option<usize>,
        logits: bool,
    ) -> Result<ArrayD<f32>>;

    /// Gradient of the loss w.r.t. `x`, shaped like `x`.
    fn loss_gradient(&self, x: &ArrayD<f32>, y: &Array2<f32>) -> Result<ArrayD<f32>>;

    /// Switches between training (`true`) and inference (`false`) behaviour.
    fn set_learning_phase(&self, train: bool);

    /// Last learning phase set, if any.
    fn learning_phase(&self) -> Option<bool>;

    /// Trains on `(x, y)`.
    fn fit(
        &mut self,
        _x: &ArrayD<f32>,
        _y: &Array2<f32>,
        _batch_size: usize,
        _nb_epochs: usize,
    ) -> Result<()> {
        Err(ClassifierError::unsupported("fit"))
    }

    /// Trains on batches drawn from `generator`, one `fit` call per batch.
    fn fit_generator(&mut self, generator: &mut dyn DataGenerator, nb_epochs: usize) -> Result<()> {
        let batch_size = generator.batch_size().max(1);
        let batches = generator.size().div_ceil(batch_size);
        for _ in 0..nb_epochs {
            for _ in 0..batches {
                let (x, y) = generator.next_batch()?;
                self.fit(&x, &y, batch_size, 1)?;
            }
        }
        Ok(())
    }

    /// Persists the model as `filename` under `dir` (or the default data path).
    fn save(&self, _filename: &str, _dir: Option<&Path>) -> Result<PathBuf> {
        Err(ClassifierError::unsupported("save"))
    }

    /// Hidden layer names, input and output layers excluded.
    fn layer_names(&self) -> Result<Vec<String>> {
        Err(ClassifierError::unsupported("layer_names"))
    }

    /// Output of `layer` for `x`; the first axis is the batch.
    fn get_activations(&self, _x: &ArrayD<f32>, _layer: LayerRef) -> Result<ArrayD<f32>> {
        Err(ClassifierError::unsupported("get_activations"))
    }
}

/// Checks that `x` is shaped `(batch, *input_shape)` and returns the batch size.
pub fn check_input(x: &ArrayD<f32>, input_shape: &[usize]) -> Result<usize> {
    let shape = x.shape();
    if shape.len() != input_shape.len() + 1 || &shape[1..] != input_shape {
        let mut expected = Vec::with_capacity(input_shape.len() + 1);
        expected.push(shape.first().copied().unwrap_or(0));
        expected.extend_from_slice(input_shape);
        return Err(ClassifierError::ShapeMismatch {
            expected,
            found: shape.to_vec(),
        });
    }
    Ok(shape[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn clip_values_validity_and_clamping() {
        assert!(ClipValues::new(0.0, 1.0).is_valid());
        assert!(!ClipValues::new(1.0, 0.0).is_valid());
        assert!(!ClipValues::new(f32::NAN, 1.0).is_valid());
        assert_eq!(ClipValues::from((0.0, 255.0)), ClipValues::new(0.0, 255.0));
        let x = ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![-1.0, 0.5, 2.0]).unwrap();
        let clipped = ClipValues::default().clip(&x);
        assert_eq!(clipped.iter().copied().collect::<Vec<_>>(), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn preprocessing_rejects_zero_divisor() {
        assert!(Preprocessing::default().validate().is_ok());
        assert!(matches!(
            Preprocessing::new(0.5, 0.0).validate(),
            Err(ClassifierError::Configuration(_))
        ));
        let x = ArrayD::from_elem(IxDyn(&[1, 2]), 3.0);
        let y = Preprocessing::new(1.0, 2.0).apply(&x);
        assert!(y.iter().all(|value| (*value - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn check_input_reports_batch_and_mismatch() {
        let x = ArrayD::<f32>::zeros(IxDyn(&[4, 2, 3]));
        assert_eq!(check_input(&x, &[2, 3]).unwrap(), 4);
        match check_input(&x, &[6]) {
            Err(ClassifierError::ShapeMismatch { expected, found }) => {
                assert_eq!(expected, vec![4, 6]);
                assert_eq!(found, vec![4, 2, 3]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
