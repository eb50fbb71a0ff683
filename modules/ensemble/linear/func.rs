use ndarray::{Array2, ArrayD, Axis};

use crate::error::Result;

/// Collapses `(batch, *input_shape)` into a `(batch, features)` matrix in logical order.
pub fn flatten(x: &ArrayD<f32>, batch: usize, features: usize) -> Result<Array2<f32>> {
    Ok(Array2::from_shape_vec(
        (batch, features),
        x.iter().copied().collect(),
    )?)
}

/// Row-wise softmax, shifted by the row maximum.
#[must_use]
pub fn softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut probs = logits.clone();
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |acc, value| acc.max(*value));
        row.mapv_inplace(|value| (value - max).exp());
        let total = row.sum();
        row.mapv_inplace(|value| value / total);
    }
    probs
}

/// Mean categorical cross-entropy of `probs` against one-hot `labels`.
#[must_use]
pub fn cross_entropy(probs: &Array2<f32>, labels: &Array2<f32>) -> f32 {
    if probs.nrows() == 0 {
        return 0.0;
    }
    let total: f32 = probs
        .iter()
        .zip(labels.iter())
        .map(|(prob, label)| -label * prob.max(1e-12).ln())
        .sum();
    total / probs.nrows() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    #[test]
    fn softmax_rows_sum_to_one() {
        let probs = softmax(&array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]]);
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert!((probs[[1, 0]] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn flatten_keeps_sample_order() {
        let x = ArrayD::from_shape_vec(IxDyn(&[2, 2, 2]), (0..8).map(|v| v as f32).collect())
            .unwrap();
        let flat = flatten(&x, 2, 4).unwrap();
        assert_eq!(flat.row(1).to_vec(), vec![4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn cross_entropy_is_zero_for_confident_hits() {
        let labels = array![[1.0, 0.0]];
        assert!(cross_entropy(&array![[1.0, 0.0]], &labels) < 1e-6);
        assert!(cross_entropy(&array![[0.5, 0.5]], &labels) > 0.6);
    }
}
