use ndarray::{Array2, ArrayD, ArrayViewD, Axis};

use crate::error::{ClassifierError, Result};

/// Lower/upper clamp applied before taking the log of aggregated probabilities.
pub const LOGIT_EPS: f32 = 1e-7;

/// Equal weights summing to one.
#[must_use]
pub fn uniform_weights(count: usize) -> Vec<f32> {
    vec![1.0 / count as f32; count]
}

/// Maps probabilities back to logit space as `ln(clamp(p, eps, 1 - eps))`.
#[must_use]
pub fn probabilities_to_logits(probs: &Array2<f32>) -> Array2<f32> {
    probs.mapv(|p| p.clamp(LOGIT_EPS, 1.0 - LOGIT_EPS).ln())
}

/// Stacks per-member outputs along a new leading member axis.
pub fn stack_members(outputs: &[ArrayD<f32>]) -> Result<ArrayD<f32>> {
    let views: Vec<ArrayViewD<'_, f32>> = outputs.iter().map(ArrayD::view).collect();
    Ok(ndarray::stack(Axis(0), &views)?)
}

/// Elementwise sum of per-member outputs, which must share one shape.
pub fn sum_members(outputs: Vec<ArrayD<f32>>) -> Result<ArrayD<f32>> {
    let mut outputs = outputs.into_iter();
    let Some(mut total) = outputs.next() else {
        return Err(ClassifierError::Configuration(
            "cannot aggregate zero member outputs".into(),
        ));
    };
    for output in outputs {
        if output.shape() != total.shape() {
            return Err(ClassifierError::ShapeMismatch {
                expected: total.shape().to_vec(),
                found: output.shape().to_vec(),
            });
        }
        total += &output;
    }
    Ok(total)
}
