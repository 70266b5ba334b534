//! Packed-bit binary index variants.
//!
//! Binary vectors are stored as `dimension / 8` bytes per vector and
//! compared with Hamming distance. The variants mirror the float side: flat
//! storage, an inverted-file layer with a k-majority trained quantizer, and
//! an HNSW graph.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{FalcataError, Result};
use crate::index::hnsw::HnswGraph;
use crate::index::{
    BinaryIndex, GraphControls, IndexParameters, InvertedFileControls, VectorIndex,
};
use crate::threading;

const MAX_KMAJORITY_ROUNDS: usize = 10;

/// Hamming distance between two equal-length bit-packed codes.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}

fn check_code_buffer(count: usize, code_size: usize, codes: &[u8]) -> Result<()> {
    if codes.len() != count * code_size {
        return Err(FalcataError::index(format!(
            "expected {} bytes for {} binary vectors of {} bytes each, got {}",
            count * code_size,
            count,
            code_size,
            codes.len()
        )));
    }
    Ok(())
}

/// Flat binary storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryFlatIndex {
    dimension: usize,
    data: Vec<u8>,
}

impl BinaryFlatIndex {
    /// Create an empty flat binary index; `dimension` is in bits.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Raw contiguous code storage.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl VectorIndex for BinaryFlatIndex {
    type Elem = u8;

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn code_size(&self) -> usize {
        self.dimension / 8
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn ntotal(&self) -> u64 {
        (self.data.len() / self.code_size()) as u64
    }

    fn train(&mut self, _vectors: &[u8]) -> Result<()> {
        Ok(())
    }

    fn add(&mut self, count: usize, vectors: &[u8]) -> Result<()> {
        check_code_buffer(count, self.code_size(), vectors)?;
        self.data.extend_from_slice(vectors);
        Ok(())
    }

    fn reconstruct(&self, position: u64) -> Result<Vec<u8>> {
        if position >= self.ntotal() {
            return Err(FalcataError::index(format!(
                "vector position {position} out of range (ntotal = {})",
                self.ntotal()
            )));
        }

        let code_size = self.code_size();
        let start = position as usize * code_size;
        Ok(self.data[start..start + code_size].to_vec())
    }
}

/// An inverted-file binary index with k-majority trained centroids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryIvfIndex {
    dimension: usize,
    nlist: usize,
    nprobe: usize,
    trained: bool,
    centroids: Vec<u8>,
    quantizer: Box<BinaryIndex>,
    lists: Vec<Vec<u8>>,
    direct_map: Vec<(u32, u32)>,
}

impl BinaryIvfIndex {
    /// Create an untrained binary IVF index over the given quantizer.
    pub fn new(dimension: usize, nlist: usize, quantizer: BinaryIndex) -> Self {
        Self {
            dimension,
            nlist,
            nprobe: 1,
            trained: false,
            centroids: Vec::new(),
            quantizer: Box::new(quantizer),
            lists: Vec::new(),
            direct_map: Vec::new(),
        }
    }

    /// Number of partition cells.
    pub fn nlist(&self) -> usize {
        self.nlist
    }

    /// Search-time candidate-list fan-out.
    pub fn nprobe(&self) -> usize {
        self.nprobe
    }

    /// The coarse quantizer sub-index.
    pub fn quantizer(&self) -> &BinaryIndex {
        &self.quantizer
    }

    /// Train centroids by iterative k-majority: assign codes to the nearest
    /// centroid by Hamming distance, then rebuild each centroid as the
    /// bitwise majority of its members.
    fn train_centroids(&mut self, codes: &[u8]) -> Result<()> {
        let code_size = self.dimension / 8;
        let count = codes.len() / code_size;
        if count < self.nlist {
            return Err(FalcataError::index(format!(
                "Cannot create {} clusters from {} vectors",
                self.nlist, count
            )));
        }

        let mut rng = rand::rng();
        let picks = rand::seq::index::sample(&mut rng, count, self.nlist);
        self.centroids = Vec::with_capacity(self.nlist * code_size);
        for pick in picks {
            self.centroids
                .extend_from_slice(&codes[pick * code_size..(pick + 1) * code_size]);
        }

        for _ in 0..MAX_KMAJORITY_ROUNDS {
            let assignments =
                assign_to_binary_centroids(code_size, &self.centroids, codes);

            let mut ones = vec![0u32; self.nlist * self.dimension];
            let mut counts = vec![0u32; self.nlist];

            for (code, &cluster) in codes.chunks(code_size).zip(&assignments) {
                counts[cluster] += 1;
                let bits = &mut ones[cluster * self.dimension..(cluster + 1) * self.dimension];
                for (byte_index, &byte) in code.iter().enumerate() {
                    for bit in 0..8 {
                        bits[byte_index * 8 + bit] += u32::from((byte >> bit) & 1);
                    }
                }
            }

            let mut updated = self.centroids.clone();
            for cluster in 0..self.nlist {
                if counts[cluster] == 0 {
                    continue;
                }

                let bits = &ones[cluster * self.dimension..(cluster + 1) * self.dimension];
                let centroid = &mut updated[cluster * code_size..(cluster + 1) * code_size];
                for (byte_index, byte) in centroid.iter_mut().enumerate() {
                    let mut value = 0u8;
                    for bit in 0..8 {
                        if bits[byte_index * 8 + bit] * 2 >= counts[cluster] {
                            value |= 1 << bit;
                        }
                    }
                    *byte = value;
                }
            }

            let converged = updated == self.centroids;
            self.centroids = updated;
            if converged {
                break;
            }
        }

        self.quantizer.add(self.nlist, &self.centroids)?;
        self.lists = vec![Vec::new(); self.nlist];
        self.trained = true;
        Ok(())
    }
}

impl VectorIndex for BinaryIvfIndex {
    type Elem = u8;

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn code_size(&self) -> usize {
        self.dimension / 8
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn ntotal(&self) -> u64 {
        self.direct_map.len() as u64
    }

    fn train(&mut self, vectors: &[u8]) -> Result<()> {
        if self.trained {
            return Ok(());
        }
        if vectors.is_empty() || vectors.len() % self.code_size() != 0 {
            return Err(FalcataError::index(
                "training buffer length must be a positive multiple of the code size",
            ));
        }

        self.train_centroids(vectors)
    }

    fn add(&mut self, count: usize, vectors: &[u8]) -> Result<()> {
        if !self.trained {
            return Err(FalcataError::not_trained(
                "binary IVF index must be trained before vectors can be added",
            ));
        }
        let code_size = self.code_size();
        check_code_buffer(count, code_size, vectors)?;

        let assignments = assign_to_binary_centroids(code_size, &self.centroids, vectors);

        for (code, &cluster) in vectors.chunks(code_size).zip(&assignments) {
            let slot = (self.lists[cluster].len() / code_size) as u32;
            self.lists[cluster].extend_from_slice(code);
            self.direct_map.push((cluster as u32, slot));
        }

        Ok(())
    }

    fn reconstruct(&self, position: u64) -> Result<Vec<u8>> {
        let (list, slot) = *self.direct_map.get(position as usize).ok_or_else(|| {
            FalcataError::index(format!(
                "vector position {position} out of range (ntotal = {})",
                self.ntotal()
            ))
        })?;

        let code_size = self.code_size();
        let start = slot as usize * code_size;
        Ok(self.lists[list as usize][start..start + code_size].to_vec())
    }
}

impl InvertedFileControls for BinaryIvfIndex {
    fn set_nprobe(&mut self, nprobe: usize) {
        self.nprobe = nprobe;
    }

    fn coarse_quantizer_mut(&mut self) -> Option<&mut dyn IndexParameters> {
        Some(self.quantizer.as_mut())
    }
}

/// A binary vector index backed by an HNSW proximity graph over Hamming
/// distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryHnswIndex {
    dimension: usize,
    graph: HnswGraph,
    data: Vec<u8>,
}

impl BinaryHnswIndex {
    /// Create an empty binary HNSW index; `dimension` is in bits.
    pub fn new(dimension: usize, m: usize) -> Self {
        Self {
            dimension,
            graph: HnswGraph::new(m),
            data: Vec::new(),
        }
    }

    /// The underlying proximity graph.
    pub fn graph(&self) -> &HnswGraph {
        &self.graph
    }
}

impl VectorIndex for BinaryHnswIndex {
    type Elem = u8;

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn code_size(&self) -> usize {
        self.dimension / 8
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn ntotal(&self) -> u64 {
        (self.data.len() / self.code_size()) as u64
    }

    fn train(&mut self, _vectors: &[u8]) -> Result<()> {
        Ok(())
    }

    fn add(&mut self, count: usize, vectors: &[u8]) -> Result<()> {
        let code_size = self.code_size();
        check_code_buffer(count, code_size, vectors)?;

        for code in vectors.chunks(code_size) {
            self.data.extend_from_slice(code);

            let data = &self.data;
            self.graph.insert(|a, b| {
                let a = &data[a as usize * code_size..(a as usize + 1) * code_size];
                let b = &data[b as usize * code_size..(b as usize + 1) * code_size];
                hamming_distance(a, b) as f32
            });
        }

        Ok(())
    }

    fn reconstruct(&self, position: u64) -> Result<Vec<u8>> {
        if position >= self.ntotal() {
            return Err(FalcataError::index(format!(
                "vector position {position} out of range (ntotal = {})",
                self.ntotal()
            )));
        }

        let code_size = self.code_size();
        let start = position as usize * code_size;
        Ok(self.data[start..start + code_size].to_vec())
    }
}

impl GraphControls for BinaryHnswIndex {
    fn set_ef_construction(&mut self, ef_construction: usize) {
        self.graph.set_ef_construction(ef_construction);
    }

    fn set_ef_search(&mut self, ef_search: usize) {
        self.graph.set_ef_search(ef_search);
    }
}

/// Assign each code to its nearest centroid by Hamming distance.
fn assign_to_binary_centroids(code_size: usize, centroids: &[u8], codes: &[u8]) -> Vec<usize> {
    let nearest = |code: &[u8]| -> usize {
        let mut best_cluster = 0;
        let mut best_distance = u32::MAX;

        for (cluster, centroid) in centroids.chunks(code_size).enumerate() {
            let distance = hamming_distance(code, centroid);
            if distance < best_distance {
                best_distance = distance;
                best_cluster = cluster;
            }
        }

        best_cluster
    };

    let count = codes.len() / code_size;
    threading::install(|| {
        if count > 1000 {
            codes.par_chunks(code_size).map(nearest).collect()
        } else {
            codes.chunks(code_size).map(nearest).collect()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(&[0b1010], &[0b0101]), 4);
        assert_eq!(hamming_distance(&[0xff, 0x00], &[0xff, 0x0f]), 4);
        assert_eq!(hamming_distance(&[0x42], &[0x42]), 0);
    }

    #[test]
    fn test_flat_add_and_reconstruct() {
        let mut index = BinaryFlatIndex::new(16);
        index.add(2, &[0xaa, 0xbb, 0xcc, 0xdd]).unwrap();

        assert_eq!(index.ntotal(), 2);
        assert_eq!(index.reconstruct(0).unwrap(), vec![0xaa, 0xbb]);
        assert_eq!(index.reconstruct(1).unwrap(), vec![0xcc, 0xdd]);
    }

    #[test]
    fn test_ivf_train_and_add() {
        let quantizer = BinaryIndex::Flat(BinaryFlatIndex::new(8));
        let mut index = BinaryIvfIndex::new(8, 2, quantizer);
        assert!(!index.is_trained());

        // Two obvious Hamming clusters: near 0x00 and near 0xff.
        let training: Vec<u8> = vec![0x00, 0x01, 0x02, 0xff, 0xfe, 0xfd];
        index.train(&training).unwrap();
        assert!(index.is_trained());
        assert_eq!(index.quantizer().ntotal(), 2);

        index.add(2, &[0x03, 0xfb]).unwrap();
        assert_eq!(index.ntotal(), 2);
        assert_eq!(index.reconstruct(0).unwrap(), vec![0x03]);
        assert_eq!(index.reconstruct(1).unwrap(), vec![0xfb]);
    }

    #[test]
    fn test_ivf_add_before_train_fails() {
        let quantizer = BinaryIndex::Flat(BinaryFlatIndex::new(8));
        let mut index = BinaryIvfIndex::new(8, 2, quantizer);
        assert!(matches!(
            index.add(1, &[0x01]),
            Err(FalcataError::NotTrained(_))
        ));
    }

    #[test]
    fn test_hnsw_add_and_reconstruct() {
        let mut index = BinaryHnswIndex::new(16, 4);
        let codes: Vec<u8> = (0..32u8).collect();
        index.add(16, &codes).unwrap();

        assert_eq!(index.ntotal(), 16);
        assert_eq!(index.reconstruct(3).unwrap(), vec![6, 7]);
        assert!(index.graph().entry_point().is_some());
    }
}
