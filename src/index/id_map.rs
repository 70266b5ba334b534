//! ID-mapping wrapper attaching external identifiers to inserted vectors.

use serde::{Deserialize, Serialize};

use crate::error::{FalcataError, Result};
use crate::index::VectorIndex;

/// Wraps an index so that externally-supplied 64-bit IDs are attached to
/// each inserted vector.
///
/// The inner index assigns dense sequential positions; this wrapper records
/// the external ID for every position. It takes exclusive ownership of the
/// inner index for the duration of insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdMap<I> {
    index: I,
    ids: Vec<i64>,
}

impl<I: VectorIndex> IdMap<I> {
    /// Take ownership of an index and wrap it for ID-mapped insertion.
    pub fn new(index: I) -> Self {
        Self {
            index,
            ids: Vec::new(),
        }
    }

    /// Add `count` vectors with position-aligned external IDs.
    ///
    /// May be called repeatedly; vectors accumulate across calls.
    pub fn add_with_ids(&mut self, count: usize, vectors: &[I::Elem], ids: &[i64]) -> Result<()> {
        if ids.len() != count {
            return Err(FalcataError::invalid_argument(format!(
                "expected {} IDs for {} vectors, got {}",
                count,
                count,
                ids.len()
            )));
        }

        self.index.add(count, vectors)?;
        self.ids.extend_from_slice(ids);
        Ok(())
    }

    /// Total number of ID-mapped vectors.
    pub fn ntotal(&self) -> u64 {
        self.ids.len() as u64
    }

    /// The external IDs in insertion order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// The wrapped index.
    pub fn index(&self) -> &I {
        &self.index
    }

    /// Reconstruct the vector stored under an external ID, if present.
    pub fn lookup(&self, id: i64) -> Result<Option<Vec<I::Elem>>> {
        match self.ids.iter().position(|&stored| stored == id) {
            Some(position) => Ok(Some(self.index.reconstruct(position as u64)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::index::flat::FlatIndex;
    use crate::metric::DistanceMetric;

    #[test]
    fn test_add_with_ids_and_lookup() {
        let mut id_map = IdMap::new(FlatIndex::new(2, DistanceMetric::L2));
        id_map
            .add_with_ids(2, &[1.0, 2.0, 3.0, 4.0], &[100, 200])
            .unwrap();

        assert_eq!(id_map.ntotal(), 2);
        assert_eq!(id_map.lookup(100).unwrap(), Some(vec![1.0, 2.0]));
        assert_eq!(id_map.lookup(200).unwrap(), Some(vec![3.0, 4.0]));
        assert_eq!(id_map.lookup(300).unwrap(), None);
    }

    #[test]
    fn test_ids_accumulate_across_calls() {
        let mut id_map = IdMap::new(FlatIndex::new(1, DistanceMetric::L2));
        id_map.add_with_ids(2, &[1.0, 2.0], &[10, 11]).unwrap();
        id_map.add_with_ids(1, &[3.0], &[12]).unwrap();

        assert_eq!(id_map.ids(), &[10, 11, 12]);
        assert_eq!(id_map.lookup(12).unwrap(), Some(vec![3.0]));
    }

    #[test]
    fn test_misaligned_ids_rejected() {
        let mut id_map = IdMap::new(FlatIndex::new(2, DistanceMetric::L2));
        let result = id_map.add_with_ids(2, &[1.0, 2.0, 3.0, 4.0], &[100]);
        assert!(matches!(result, Err(FalcataError::InvalidArgument(_))));
        assert_eq!(id_map.ntotal(), 0);
    }
}
