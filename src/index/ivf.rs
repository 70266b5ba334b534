//! IVF (Inverted File) float index with a k-means trained coarse quantizer.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{FalcataError, Result};
use crate::index::{FloatIndex, IndexParameters, InvertedFileControls, VectorIndex};
use crate::metric::DistanceMetric;
use crate::threading;

const MAX_KMEANS_ITERATIONS: usize = 100;
const KMEANS_CONVERGENCE_THRESHOLD: f32 = 1e-6;

/// An inverted-file index partitioning vectors into `nlist` cells.
///
/// The cell centroids are learned by k-means during the training phase and
/// mirrored into the coarse quantizer sub-index, which may itself be any
/// float index (flat or graph-backed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfIndex {
    dimension: usize,
    metric: DistanceMetric,
    nlist: usize,
    nprobe: usize,
    trained: bool,
    centroids: Vec<f32>,
    quantizer: Box<FloatIndex>,
    lists: Vec<Vec<f32>>,
    // Sequential vector position -> (list, slot within list).
    direct_map: Vec<(u32, u32)>,
}

impl IvfIndex {
    /// Create an untrained IVF index over the given coarse quantizer.
    pub fn new(
        dimension: usize,
        nlist: usize,
        metric: DistanceMetric,
        quantizer: FloatIndex,
    ) -> Self {
        Self {
            dimension,
            metric,
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
    pub fn quantizer(&self) -> &FloatIndex {
        &self.quantizer
    }

    /// The learned cell centroids, `nlist * dimension` elements once trained.
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    /// Train cell centroids with k-means and mirror them into the quantizer.
    fn train_centroids(&mut self, vectors: &[f32]) -> Result<()> {
        let count = vectors.len() / self.dimension;
        if count < self.nlist {
            return Err(FalcataError::index(format!(
                "Cannot create {} clusters from {} vectors",
                self.nlist, count
            )));
        }

        self.init_centroids_kmeans_plus_plus(vectors, count);

        for _ in 0..MAX_KMEANS_ITERATIONS {
            let assignments =
                assign_to_centroids(self.metric, self.dimension, &self.centroids, vectors);
            let movement = self.update_centroids(vectors, &assignments);
            if movement < KMEANS_CONVERGENCE_THRESHOLD {
                break;
            }
        }

        self.quantizer.add(self.nlist, &self.centroids)?;
        self.lists = vec![Vec::new(); self.nlist];
        self.trained = true;
        Ok(())
    }

    /// Initialize centroids with k-means++: the first is drawn uniformly,
    /// the rest with probability proportional to squared distance from the
    /// closest centroid chosen so far.
    fn init_centroids_kmeans_plus_plus(&mut self, vectors: &[f32], count: usize) {
        use rand::prelude::*;
        let mut rng = rand::rng();

        self.centroids.clear();

        let first = rng.random_range(0..count);
        self.centroids
            .extend_from_slice(vector_at(vectors, self.dimension, first));

        for _ in 1..self.nlist {
            let mut weights = Vec::with_capacity(count);
            let mut total_weight = 0.0f32;

            for vector in vectors.chunks(self.dimension) {
                let min_dist = self
                    .centroids
                    .chunks(self.dimension)
                    .map(|centroid| {
                        self.metric
                            .distance(vector, centroid)
                            .unwrap_or(f32::INFINITY)
                    })
                    .fold(f32::INFINITY, f32::min);

                let weight = min_dist * min_dist;
                weights.push(weight);
                total_weight += weight;
            }

            if total_weight == 0.0 || !total_weight.is_finite() {
                // Fallback to uniform selection
                let pick = rng.random_range(0..count);
                self.centroids
                    .extend_from_slice(vector_at(vectors, self.dimension, pick));
                continue;
            }

            let target = rng.random::<f32>() * total_weight;
            let mut cumsum = 0.0f32;
            let mut picked = count - 1;

            for (i, &weight) in weights.iter().enumerate() {
                cumsum += weight;
                if cumsum >= target {
                    picked = i;
                    break;
                }
            }

            self.centroids
                .extend_from_slice(vector_at(vectors, self.dimension, picked));
        }
    }

    /// Recompute centroids as cluster means; returns the mean centroid
    /// movement used for the convergence check.
    fn update_centroids(&mut self, vectors: &[f32], assignments: &[usize]) -> f32 {
        let mut sums = vec![0.0f64; self.nlist * self.dimension];
        let mut counts = vec![0usize; self.nlist];

        for (vector, &cluster) in vectors.chunks(self.dimension).zip(assignments) {
            counts[cluster] += 1;
            let sum = &mut sums[cluster * self.dimension..(cluster + 1) * self.dimension];
            for (slot, &value) in sum.iter_mut().zip(vector) {
                *slot += value as f64;
            }
        }

        let mut total_movement = 0.0f32;

        for cluster in 0..self.nlist {
            if counts[cluster] == 0 {
                // Keep the old centroid if no vectors were assigned.
                continue;
            }

            let old = self.centroids
                [cluster * self.dimension..(cluster + 1) * self.dimension]
                .to_vec();
            let updated: Vec<f32> = sums[cluster * self.dimension..(cluster + 1) * self.dimension]
                .iter()
                .map(|&sum| (sum / counts[cluster] as f64) as f32)
                .collect();

            total_movement += self.metric.distance(&old, &updated).unwrap_or(0.0);
            self.centroids[cluster * self.dimension..(cluster + 1) * self.dimension]
                .copy_from_slice(&updated);
        }

        total_movement / self.nlist as f32
    }
}

impl VectorIndex for IvfIndex {
    type Elem = f32;

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn code_size(&self) -> usize {
        self.dimension
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn ntotal(&self) -> u64 {
        self.direct_map.len() as u64
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        if self.trained {
            return Ok(());
        }
        if vectors.is_empty() || vectors.len() % self.dimension != 0 {
            return Err(FalcataError::index(
                "training buffer length must be a positive multiple of the dimension",
            ));
        }

        self.train_centroids(vectors)
    }

    fn add(&mut self, count: usize, vectors: &[f32]) -> Result<()> {
        if !self.trained {
            return Err(FalcataError::not_trained(
                "IVF index must be trained before vectors can be added",
            ));
        }
        if vectors.len() != count * self.dimension {
            return Err(FalcataError::index(format!(
                "expected {} elements for {} vectors of dimension {}, got {}",
                count * self.dimension,
                count,
                self.dimension,
                vectors.len()
            )));
        }

        let assignments = assign_to_centroids(self.metric, self.dimension, &self.centroids, vectors);

        for (vector, &cluster) in vectors.chunks(self.dimension).zip(&assignments) {
            let slot = (self.lists[cluster].len() / self.dimension) as u32;
            self.lists[cluster].extend_from_slice(vector);
            self.direct_map.push((cluster as u32, slot));
        }

        Ok(())
    }

    fn reconstruct(&self, position: u64) -> Result<Vec<f32>> {
        let (list, slot) = *self.direct_map.get(position as usize).ok_or_else(|| {
            FalcataError::index(format!(
                "vector position {position} out of range (ntotal = {})",
                self.ntotal()
            ))
        })?;

        let start = slot as usize * self.dimension;
        Ok(self.lists[list as usize][start..start + self.dimension].to_vec())
    }
}

impl InvertedFileControls for IvfIndex {
    fn set_nprobe(&mut self, nprobe: usize) {
        self.nprobe = nprobe;
    }

    fn coarse_quantizer_mut(&mut self) -> Option<&mut dyn IndexParameters> {
        Some(self.quantizer.as_mut())
    }
}

fn vector_at(vectors: &[f32], dimension: usize, position: usize) -> &[f32] {
    &vectors[position * dimension..(position + 1) * dimension]
}

/// Assign each vector to its nearest centroid.
fn assign_to_centroids(
    metric: DistanceMetric,
    dimension: usize,
    centroids: &[f32],
    vectors: &[f32],
) -> Vec<usize> {
    let nearest = |vector: &[f32]| -> usize {
        let mut best_cluster = 0;
        let mut best_distance = f32::INFINITY;

        for (cluster, centroid) in centroids.chunks(dimension).enumerate() {
            if let Ok(distance) = metric.distance(vector, centroid) {
                if distance < best_distance {
                    best_distance = distance;
                    best_cluster = cluster;
                }
            }
        }

        best_cluster
    };

    let count = vectors.len() / dimension;
    threading::install(|| {
        if count > 1000 {
            vectors.par_chunks(dimension).map(nearest).collect()
        } else {
            vectors.chunks(dimension).map(nearest).collect()
        }
    })
}
