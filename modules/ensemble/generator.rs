use ndarray::{Array2, ArrayD, Axis, Slice};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

use crate::error::{ClassifierError, Result};

/// Source of training batches for [`crate::Classifier::fit_generator`].
pub trait DataGenerator {
    /// Total number of samples.
    fn size(&self) -> usize;

    /// Samples per batch.
    fn batch_size(&self) -> usize;

    /// Next `(x, y)` batch; the last batch of a pass may be shorter.
    fn next_batch(&mut self) -> Result<(ArrayD<f32>, Array2<f32>)>;
}

/// Generator over arrays held in memory.
#[derive(Debug)]
pub struct ArrayGenerator {
    x: ArrayD<f32>,
    y: Array2<f32>,
    batch_size: usize,
    starts: Vec<usize>,
    cursor: usize,
    rng: Option<SmallRng>,
}

impl ArrayGenerator {
    /// Creates a generator yielding batches in order.
    pub fn new(x: ArrayD<f32>, y: Array2<f32>, batch_size: usize) -> Result<Self> {
        let samples = x.shape().first().copied().unwrap_or(0);
        if samples == 0 {
            return Err(ClassifierError::Configuration(
                "generator needs at least one sample".into(),
            ));
        }
        if y.nrows() != samples {
            return Err(ClassifierError::ShapeMismatch {
                expected: vec![samples, y.ncols()],
                found: y.shape().to_vec(),
            });
        }
        if batch_size == 0 {
            return Err(ClassifierError::Configuration(
                "batch size must be positive".into(),
            ));
        }
        let starts = (0..samples).step_by(batch_size).collect();
        Ok(Self {
            x,
            y,
            batch_size,
            starts,
            cursor: 0,
            rng: None,
        })
    }

    /// Shuffles the batch order on every pass using a seeded RNG.
    #[must_use]
    pub fn shuffled(mut self, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        self.starts.shuffle(&mut rng);
        self.rng = Some(rng);
        self
    }

    fn advance(&mut self) -> usize {
        if self.cursor == self.starts.len() {
            self.cursor = 0;
            if let Some(rng) = self.rng.as_mut() {
                self.starts.shuffle(rng);
            }
        }
        let start = self.starts[self.cursor];
        self.cursor += 1;
        start
    }
}

impl DataGenerator for ArrayGenerator {
    fn size(&self) -> usize {
        self.y.nrows()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn next_batch(&mut self) -> Result<(ArrayD<f32>, Array2<f32>)> {
        let start = self.advance();
        let end = (start + self.batch_size).min(self.size());
        let x = self
            .x
            .slice_axis(Axis(0), Slice::from(start..end))
            .to_owned();
        let y = self
            .y
            .slice_axis(Axis(0), Slice::from(start..end))
            .to_owned();
        Ok((x, y))
    }
}
