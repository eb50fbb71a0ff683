//! Deterministic members for ensemble tests.

use ndarray::{Array2, ArrayD, IxDyn};
use parking_lot::Mutex;

use crate::{
    classifier::{check_input, Classifier, ClipValues},
    error::Result,
};

/// Added to `ln(p)` when logits are requested, so logit and probability space differ.
pub const LOGIT_OFFSET: f32 = 10.0;

/// Member answering every sample with the same probability row.
#[derive(Debug)]
pub struct FixedClassifier {
    input_shape: Vec<usize>,
    probs: Vec<f32>,
    clip_values: ClipValues,
    gradient: f32,
    learning_phase: Mutex<Option<bool>>,
}

impl FixedClassifier {
    pub fn new(input_shape: &[usize], probs: Vec<f32>) -> Self {
        Self {
            input_shape: input_shape.to_vec(),
            probs,
            clip_values: ClipValues::default(),
            gradient: 1.0,
            learning_phase: Mutex::new(None),
        }
    }

    pub fn uniform(input_shape: &[usize], classes: usize) -> Self {
        Self::new(input_shape, vec![1.0 / classes.max(1) as f32; classes])
    }

    pub fn with_clip_values(mut self, clip_values: ClipValues) -> Self {
        self.clip_values = clip_values;
        self
    }

    pub fn with_gradient(mut self, gradient: f32) -> Self {
        self.gradient = gradient;
        self
    }
}

impl Classifier for FixedClassifier {
    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn num_classes(&self) -> usize {
        self.probs.len()
    }

    fn clip_values(&self) -> ClipValues {
        self.clip_values
    }

    fn predict(&self, x: &ArrayD<f32>, logits: bool) -> Result<Array2<f32>> {
        let batch = check_input(x, &self.input_shape)?;
        Ok(Array2::from_shape_fn((batch, self.probs.len()), |(_, class)| {
            let p = self.probs[class];
            if logits {
                p.ln() + LOGIT_OFFSET
            } else {
                p
            }
        }))
    }

    fn class_gradient(
        &self,
        x: &ArrayD<f32>,
        label: Option<usize>,
        logits: bool,
    ) -> Result<ArrayD<f32>> {
        let batch = check_input(x, &self.input_shape)?;
        let classes = if label.is_some() { 1 } else { self.probs.len() };
        let mut shape = vec![batch, classes];
        shape.extend_from_slice(&self.input_shape);
        let value = if logits {
            self.gradient * 2.0
        } else {
            self.gradient
        };
        Ok(ArrayD::from_elem(IxDyn(&shape), value))
    }

    fn loss_gradient(&self, x: &ArrayD<f32>, _y: &Array2<f32>) -> Result<ArrayD<f32>> {
        check_input(x, &self.input_shape)?;
        Ok(x.mapv(|value| value * self.gradient))
    }

    fn set_learning_phase(&self, train: bool) {
        *self.learning_phase.lock() = Some(train);
    }

    fn learning_phase(&self) -> Option<bool> {
        *self.learning_phase.lock()
    }
}
