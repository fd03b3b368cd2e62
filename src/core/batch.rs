//! Batch partitioning for the extraction stage.
//!
//! Batches exist purely to bound peak memory and accelerator usage.
//! Boundaries carry no semantic meaning: every embedding is associated
//! with its source sample, never with its position in a batch.

/// A 2-dimensional tensor represented as a 2D array of f32 values.
pub type Tensor2D = ndarray::Array2<f32>;

/// A 4-dimensional tensor represented as a 4D array of f32 values.
pub type Tensor4D = ndarray::Array4<f32>;

/// Partitions a slice of samples into fixed-size batches.
#[derive(Debug, Clone)]
pub struct BatchSampler {
    batch_size: usize,
}

impl BatchSampler {
    /// Creates a sampler with the given batch size.
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    /// Returns the batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Iterates over consecutive batches of at most `batch_size` items.
    ///
    /// A batch size of zero yields no batches; callers validate the size
    /// before reaching this point.
    pub fn batches<'a, T>(&self, data: &'a [T]) -> impl Iterator<Item = &'a [T]> {
        let step = self.batch_size.max(1);
        let take = if self.batch_size == 0 { 0 } else { usize::MAX };
        data.chunks(step).take(take)
    }

    /// Iterates over batches together with the offset of their first item.
    pub fn batches_with_offsets<'a, T>(
        &self,
        data: &'a [T],
    ) -> impl Iterator<Item = (usize, &'a [T])> {
        let step = self.batch_size.max(1);
        self.batches(data)
            .enumerate()
            .map(move |(i, chunk)| (i * step, chunk))
    }
}
