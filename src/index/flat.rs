//! Flat (exhaustive) float vector storage.

use serde::{Deserialize, Serialize};

use crate::error::{FalcataError, Result};
use crate::index::VectorIndex;
use crate::metric::DistanceMetric;

/// A flat index storing raw float vectors contiguously.
///
/// Flat indexes require no training phase and are also used as the default
/// storage layer and coarse quantizer for composed index types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    metric: DistanceMetric,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty flat index.
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            data: Vec::new(),
        }
    }

    /// The distance metric this index was created with.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Raw contiguous vector storage.
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

impl VectorIndex for FlatIndex {
    type Elem = f32;

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn code_size(&self) -> usize {
        self.dimension
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn ntotal(&self) -> u64 {
        (self.data.len() / self.dimension) as u64
    }

    fn train(&mut self, _vectors: &[f32]) -> Result<()> {
        Ok(())
    }

    fn add(&mut self, count: usize, vectors: &[f32]) -> Result<()> {
        if vectors.len() != count * self.dimension {
            return Err(FalcataError::index(format!(
                "expected {} elements for {} vectors of dimension {}, got {}",
                count * self.dimension,
                count,
                self.dimension,
                vectors.len()
            )));
        }

        self.data.extend_from_slice(vectors);
        Ok(())
    }

    fn reconstruct(&self, position: u64) -> Result<Vec<f32>> {
        if position >= self.ntotal() {
            return Err(FalcataError::index(format!(
                "vector position {position} out of range (ntotal = {})",
                self.ntotal()
            )));
        }

        let start = position as usize * self.dimension;
        Ok(self.data[start..start + self.dimension].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_reconstruct() {
        let mut index = FlatIndex::new(2, DistanceMetric::L2);
        index.add(2, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        assert_eq!(index.ntotal(), 2);
        assert_eq!(index.reconstruct(0).unwrap(), vec![1.0, 2.0]);
        assert_eq!(index.reconstruct(1).unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_add_rejects_ragged_buffer() {
        let mut index = FlatIndex::new(3, DistanceMetric::L2);
        assert!(index.add(1, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_reconstruct_out_of_range() {
        let index = FlatIndex::new(2, DistanceMetric::L2);
        assert!(index.reconstruct(0).is_err());
    }

    #[test]
    fn test_always_trained() {
        let index = FlatIndex::new(4, DistanceMetric::Cosine);
        assert!(index.is_trained());
    }
}
