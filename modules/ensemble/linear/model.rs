use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use ndarray::{s, Array1, Array2, Array3, ArrayD, Axis};
use parking_lot::Mutex;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::func::{flatten, softmax};
use crate::{
    classifier::{check_input, Classifier, ClipValues, LayerRef, Preprocessing},
    config::{resolve_data_path, LinearConfig},
    error::{ClassifierError, Result},
};

const DENSE_LAYER: &str = "dense";

/// On-disk format written by `save` and read by `from_weights_file`.
#[derive(Debug, Serialize, Deserialize)]
struct LinearWeights {
    input_shape: Vec<usize>,
    num_classes: usize,
    /// Row-major `(features, num_classes)`.
    weights: Vec<f32>,
    bias: Vec<f32>,
    clip_values: ClipValues,
    #[serde(default)]
    preprocessing: Preprocessing,
    #[serde(default)]
    config: LinearConfig,
}

/// Dense layer followed by softmax over flattened, preprocessed inputs.
#[derive(Debug)]
pub struct LinearSoftmaxClassifier {
    input_shape: Vec<usize>,
    weights: Array2<f32>,
    bias: Array1<f32>,
    clip_values: ClipValues,
    preprocessing: Preprocessing,
    config: LinearConfig,
    learning_phase: Mutex<Option<bool>>,
}

impl LinearSoftmaxClassifier {
    /// Creates a model with small random weights.
    pub fn new(input_shape: &[usize], num_classes: usize, clip_values: ClipValues) -> Result<Self> {
        Self::with_rng(
            input_shape,
            num_classes,
            clip_values,
            &mut SmallRng::from_entropy(),
        )
    }

    /// Creates a model with reproducible random weights.
    pub fn seeded(
        input_shape: &[usize],
        num_classes: usize,
        clip_values: ClipValues,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(
            input_shape,
            num_classes,
            clip_values,
            &mut SmallRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        input_shape: &[usize],
        num_classes: usize,
        clip_values: ClipValues,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        let features: usize = input_shape.iter().product();
        let weights = Array2::from_shape_fn((features, num_classes), |_| rng.gen_range(-0.05..0.05));
        let bias = Array1::from_shape_fn(num_classes, |_| rng.gen_range(-0.05..0.05));
        Self::from_parts(input_shape, weights, bias, clip_values)
    }

    /// Builds a model from explicit parameters.
    ///
    /// `weights` is `(features, num_classes)` where `features` is the product of `input_shape`.
    pub fn from_parts(
        input_shape: &[usize],
        weights: Array2<f32>,
        bias: Array1<f32>,
        clip_values: ClipValues,
    ) -> Result<Self> {
        let features: usize = input_shape.iter().product();
        if input_shape.is_empty() || features == 0 {
            return Err(ClassifierError::Configuration(format!(
                "input shape {input_shape:?} has no features"
            )));
        }
        let (rows, num_classes) = weights.dim();
        if num_classes == 0 {
            return Err(ClassifierError::Configuration(
                "model needs at least one class".into(),
            ));
        }
        if rows != features || bias.len() != num_classes {
            return Err(ClassifierError::ShapeMismatch {
                expected: vec![features, num_classes],
                found: vec![rows, bias.len()],
            });
        }
        if !clip_values.is_valid() {
            return Err(ClassifierError::Configuration(format!(
                "invalid clip values {clip_values}"
            )));
        }
        Ok(Self {
            input_shape: input_shape.to_vec(),
            weights,
            bias,
            clip_values,
            preprocessing: Preprocessing::default(),
            config: LinearConfig::default(),
            learning_phase: Mutex::new(None),
        })
    }

    /// Replaces the input normalization.
    pub fn with_preprocessing(mut self, preprocessing: Preprocessing) -> Result<Self> {
        preprocessing.validate()?;
        self.preprocessing = preprocessing;
        Ok(self)
    }

    /// Replaces the training hyperparameters.
    #[must_use]
    pub fn with_config(mut self, config: LinearConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads a model written by [`Classifier::save`].
    pub fn from_weights_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents =
            fs::read_to_string(&path).with_context(|| format!("reading {:?}", path.as_ref()))?;
        let stored: LinearWeights =
            serde_json::from_str(&contents).context("parsing linear softmax weights file")?;
        let features: usize = stored.input_shape.iter().product();
        let weights = Array2::from_shape_vec((features, stored.num_classes), stored.weights)
            .context("building weight matrix")?;
        let model = Self::from_parts(
            &stored.input_shape,
            weights,
            Array1::from(stored.bias),
            stored.clip_values,
        )?
        .with_preprocessing(stored.preprocessing)?
        .with_config(stored.config);
        Ok(model)
    }

    /// Weight matrix `(features, num_classes)`.
    #[must_use]
    pub const fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    /// Bias vector.
    #[must_use]
    pub const fn bias(&self) -> &Array1<f32> {
        &self.bias
    }

    /// Input normalization.
    #[must_use]
    pub const fn preprocessing(&self) -> Preprocessing {
        self.preprocessing
    }

    fn features(&self) -> usize {
        self.weights.nrows()
    }

    /// Returns batch size and pre-softmax activations.
    fn forward(&self, x: &ArrayD<f32>) -> Result<(usize, Array2<f32>)> {
        let batch = check_input(x, &self.input_shape)?;
        let flat = flatten(&self.preprocessing.apply(x), batch, self.features())?;
        Ok((batch, flat.dot(&self.weights) + &self.bias))
    }

    fn check_labels(&self, y: &Array2<f32>, batch: usize) -> Result<()> {
        if y.dim() != (batch, self.num_classes()) {
            return Err(ClassifierError::ShapeMismatch {
                expected: vec![batch, self.num_classes()],
                found: y.shape().to_vec(),
            });
        }
        Ok(())
    }

    fn output_shape(&self, leading: &[usize]) -> Vec<usize> {
        leading
            .iter()
            .chain(self.input_shape.iter())
            .copied()
            .collect()
    }
}

impl Classifier for LinearSoftmaxClassifier {
    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn num_classes(&self) -> usize {
        self.weights.ncols()
    }

    fn clip_values(&self) -> ClipValues {
        self.clip_values
    }

    fn predict(&self, x: &ArrayD<f32>, logits: bool) -> Result<Array2<f32>> {
        let (_, activations) = self.forward(x)?;
        if logits {
            Ok(activations)
        } else {
            Ok(softmax(&activations))
        }
    }

    fn class_gradient(
        &self,
        x: &ArrayD<f32>,
        label: Option<usize>,
        logits: bool,
    ) -> Result<ArrayD<f32>> {
        let num_classes = self.num_classes();
        let classes: Vec<usize> = match label {
            Some(label) if label >= num_classes => {
                return Err(ClassifierError::InvalidLabel { label, num_classes })
            }
            Some(label) => vec![label],
            None => (0..num_classes).collect(),
        };
        let (batch, activations) = self.forward(x)?;
        let scale = 1.0 / self.preprocessing.divisor;
        let mut grads = Array3::<f32>::zeros((batch, classes.len(), self.features()));

        if logits {
            for (slot, &class) in classes.iter().enumerate() {
                let column = self.weights.column(class).mapv(|w| w * scale);
                for sample in 0..batch {
                    grads.slice_mut(s![sample, slot, ..]).assign(&column);
                }
            }
        } else {
            // d p_k / d x = p_k * (W_k - sum_j p_j W_j)
            let probs = softmax(&activations);
            let expected = probs.dot(&self.weights.t());
            for (slot, &class) in classes.iter().enumerate() {
                let column = self.weights.column(class);
                for sample in 0..batch {
                    let factor = probs[[sample, class]] * scale;
                    let grad = (&column - &expected.row(sample)).mapv(|value| value * factor);
                    grads.slice_mut(s![sample, slot, ..]).assign(&grad);
                }
            }
        }

        let shape = self.output_shape(&[batch, classes.len()]);
        Ok(grads.into_shape(shape)?)
    }

    fn loss_gradient(&self, x: &ArrayD<f32>, y: &Array2<f32>) -> Result<ArrayD<f32>> {
        let (batch, activations) = self.forward(x)?;
        self.check_labels(y, batch)?;
        let scale = 1.0 / self.preprocessing.divisor;
        let delta = softmax(&activations) - y;
        let grads = delta.dot(&self.weights.t()).mapv(|value| value * scale);
        Ok(grads.into_shape(x.shape().to_vec())?)
    }

    fn set_learning_phase(&self, train: bool) {
        *self.learning_phase.lock() = Some(train);
    }

    fn learning_phase(&self) -> Option<bool> {
        *self.learning_phase.lock()
    }

    fn fit(
        &mut self,
        x: &ArrayD<f32>,
        y: &Array2<f32>,
        batch_size: usize,
        nb_epochs: usize,
    ) -> Result<()> {
        let batch = check_input(x, &self.input_shape)?;
        self.check_labels(y, batch)?;
        if batch == 0 {
            return Ok(());
        }
        let clipped = self.clip_values.clip(x);
        let flat = flatten(&self.preprocessing.apply(&clipped), batch, self.features())?;
        let lr = self.config.learning_rate;
        let step = batch_size.clamp(1, batch);

        for _ in 0..nb_epochs {
            for start in (0..batch).step_by(step) {
                let end = (start + step).min(batch);
                let inputs = flat.slice(s![start..end, ..]);
                let targets = y.slice(s![start..end, ..]);
                let probs = softmax(&(inputs.dot(&self.weights) + &self.bias));
                let delta = (probs - &targets) / (end - start) as f32;
                let weight_grad = inputs.t().dot(&delta);
                let bias_grad = delta.sum_axis(Axis(0));
                self.weights.scaled_add(-lr, &weight_grad);
                self.bias.scaled_add(-lr, &bias_grad);
            }
        }
        Ok(())
    }

    fn save(&self, filename: &str, dir: Option<&Path>) -> Result<PathBuf> {
        let dir = resolve_data_path(dir);
        fs::create_dir_all(&dir)?;
        let path = dir.join(filename);
        let stored = LinearWeights {
            input_shape: self.input_shape.clone(),
            num_classes: self.num_classes(),
            weights: self.weights.iter().copied().collect(),
            bias: self.bias.to_vec(),
            clip_values: self.clip_values,
            preprocessing: self.preprocessing,
            config: self.config,
        };
        fs::write(&path, serde_json::to_vec_pretty(&stored)?)?;
        Ok(path)
    }

    fn layer_names(&self) -> Result<Vec<String>> {
        Ok(vec![DENSE_LAYER.to_string()])
    }

    fn get_activations(&self, x: &ArrayD<f32>, layer: LayerRef) -> Result<ArrayD<f32>> {
        match &layer {
            LayerRef::Index(0) => {}
            LayerRef::Name(name) if name == DENSE_LAYER => {}
            _ => return Err(ClassifierError::UnknownLayer(layer.to_string())),
        }
        let (_, activations) = self.forward(x)?;
        Ok(activations.into_dyn())
    }
}
