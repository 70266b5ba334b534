//! The index build service.
//!
//! A build call turns a descriptor, a metric, and a runtime parameter map
//! into a configured index graph, populates it with externally-identified
//! vectors, and persists it to a caller-given path. One service exists per
//! vector element representation:
//!
//! - [`IndexBuildService`] — float32 batches
//! - [`BinaryIndexBuildService`] — packed-bit batches
//! - [`ByteIndexBuildService`] — int8 batches, widened to float32 in
//!   bounded conversion batches
//!
//! Builds execute synchronously on the calling thread, borrow the vector
//! batch for the duration of the call only, and abort entirely on the first
//! failure; no partial artifact is left behind.

use std::path::Path;

use crate::error::{FalcataError, Result};
use crate::index::{
    apply_parameters, index_binary_factory, index_factory, BinaryIndex, FloatIndex, IdMap,
    VectorIndex,
};
use crate::metric::DistanceMetric;
use crate::params::ParamMap;
use crate::persist;
use crate::threading;

/// Number of int8 vectors widened to float32 per conversion batch.
///
/// Bounds the transient conversion memory to `O(batch × dimension)`
/// regardless of the total vector count.
pub const BYTE_CONVERSION_BATCH_SIZE: usize = 1000;

/// Configuration for one index build.
#[derive(Debug, Clone)]
pub struct IndexBuildConfig {
    /// Vector dimensionality (in bits for binary batches).
    pub dimension: usize,
    /// Index composition descriptor, resolved by the factory.
    pub descriptor: String,
    /// Distance metric, honored by float index types.
    pub metric: DistanceMetric,
    /// Runtime parameter overrides applied after resolution.
    pub parameters: ParamMap,
    /// When nonzero, pins the process-wide build parallelism degree before
    /// the build proceeds. Global and last-writer-wins across concurrent
    /// builds; see [`crate::threading`].
    pub thread_count: usize,
}

impl IndexBuildConfig {
    /// Create a config with the default metric, no parameter overrides, and
    /// the ambient thread count.
    pub fn new(dimension: usize, descriptor: impl Into<String>) -> Self {
        Self {
            dimension,
            descriptor: descriptor.into(),
            metric: DistanceMetric::default(),
            parameters: ParamMap::new(),
            thread_count: 0,
        }
    }
}

/// Build service for float32 vector batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexBuildService;

impl IndexBuildService {
    /// Create a new build service.
    pub fn new() -> Self {
        Self
    }

    /// Build an index from a float batch and persist it to `output_path`.
    pub fn build(
        &self,
        vectors: &[f32],
        ids: &[i64],
        output_path: &Path,
        config: &IndexBuildConfig,
    ) -> Result<()> {
        let num_vectors = validate_batch(vectors.len(), config.dimension, ids.len())?;
        apply_thread_count(config.thread_count)?;

        let index = resolve_float_index(config)?;
        ensure_trained(&index)?;

        let mut id_map = IdMap::new(index);
        id_map.add_with_ids(num_vectors, vectors, ids)?;

        persist::write_float_index(&id_map, output_path)
    }

    /// Build an index from a pre-trained template instead of a descriptor.
    ///
    /// The template carries its own configuration, so the config's
    /// descriptor, metric, and parameter map are not consulted on this
    /// path; dimension and thread count still apply.
    pub fn build_from_template(
        &self,
        template: &[u8],
        vectors: &[f32],
        ids: &[i64],
        output_path: &Path,
        config: &IndexBuildConfig,
    ) -> Result<()> {
        let num_vectors = validate_batch(vectors.len(), config.dimension, ids.len())?;
        apply_thread_count(config.thread_count)?;

        let index = persist::decode_float_template(template)?;
        check_template_dimension(index.dimension(), config.dimension)?;
        ensure_trained(&index)?;

        let mut id_map = IdMap::new(index);
        id_map.add_with_ids(num_vectors, vectors, ids)?;

        persist::write_float_index(&id_map, output_path)
    }

    /// Run the training phase on a sample batch and return the trained
    /// index as template bytes.
    pub fn train(&self, samples: &[f32], config: &IndexBuildConfig) -> Result<Vec<u8>> {
        validate_batch_shape(samples.len(), config.dimension)?;
        apply_thread_count(config.thread_count)?;

        let mut index = resolve_float_index(config)?;
        index.train(samples)?;
        persist::encode_float_template(&index)
    }
}

/// Build service for packed-bit vector batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryIndexBuildService;

impl BinaryIndexBuildService {
    /// Create a new build service.
    pub fn new() -> Self {
        Self
    }

    /// Build a binary index from a packed-bit batch and persist it.
    pub fn build(
        &self,
        vectors: &[u8],
        ids: &[i64],
        output_path: &Path,
        config: &IndexBuildConfig,
    ) -> Result<()> {
        ensure_binary_dimension(config.dimension)?;
        let num_vectors = validate_batch(vectors.len(), config.dimension / 8, ids.len())?;
        apply_thread_count(config.thread_count)?;

        let index = resolve_binary_index(config)?;
        ensure_trained(&index)?;

        let mut id_map = IdMap::new(index);
        id_map.add_with_ids(num_vectors, vectors, ids)?;

        persist::write_binary_index(&id_map, output_path)
    }

    /// Build a binary index from a pre-trained template.
    pub fn build_from_template(
        &self,
        template: &[u8],
        vectors: &[u8],
        ids: &[i64],
        output_path: &Path,
        config: &IndexBuildConfig,
    ) -> Result<()> {
        ensure_binary_dimension(config.dimension)?;
        let num_vectors = validate_batch(vectors.len(), config.dimension / 8, ids.len())?;
        apply_thread_count(config.thread_count)?;

        let index = persist::decode_binary_template(template)?;
        check_template_dimension(index.dimension(), config.dimension)?;
        ensure_trained(&index)?;

        let mut id_map = IdMap::new(index);
        id_map.add_with_ids(num_vectors, vectors, ids)?;

        persist::write_binary_index(&id_map, output_path)
    }

    /// Run the training phase on a packed-bit sample batch and return the
    /// trained index as template bytes.
    pub fn train(&self, samples: &[u8], config: &IndexBuildConfig) -> Result<Vec<u8>> {
        ensure_binary_dimension(config.dimension)?;
        validate_batch_shape(samples.len(), config.dimension / 8)?;
        apply_thread_count(config.thread_count)?;

        let mut index = resolve_binary_index(config)?;
        index.train(samples)?;
        persist::encode_binary_template(&index)
    }
}

/// Build service for int8 vector batches.
///
/// The underlying add-path only accepts float32, so batches are widened in
/// conversion batches of [`BYTE_CONVERSION_BATCH_SIZE`] vectors, with one
/// ID-mapped insertion per batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteIndexBuildService;

impl ByteIndexBuildService {
    /// Create a new build service.
    pub fn new() -> Self {
        Self
    }

    /// Build an index from an int8 batch and persist it.
    pub fn build(
        &self,
        vectors: &[i8],
        ids: &[i64],
        output_path: &Path,
        config: &IndexBuildConfig,
    ) -> Result<()> {
        validate_batch(vectors.len(), config.dimension, ids.len())?;
        apply_thread_count(config.thread_count)?;

        let index = resolve_float_index(config)?;
        ensure_trained(&index)?;

        let mut id_map = IdMap::new(index);
        add_widened_batches(&mut id_map, vectors, ids, config.dimension)?;

        persist::write_float_index(&id_map, output_path)
    }

    /// Build an index from a pre-trained template.
    pub fn build_from_template(
        &self,
        template: &[u8],
        vectors: &[i8],
        ids: &[i64],
        output_path: &Path,
        config: &IndexBuildConfig,
    ) -> Result<()> {
        validate_batch(vectors.len(), config.dimension, ids.len())?;
        apply_thread_count(config.thread_count)?;

        let index = persist::decode_float_template(template)?;
        check_template_dimension(index.dimension(), config.dimension)?;
        ensure_trained(&index)?;

        let mut id_map = IdMap::new(index);
        add_widened_batches(&mut id_map, vectors, ids, config.dimension)?;

        persist::write_float_index(&id_map, output_path)
    }

    /// Run the training phase on an int8 sample batch and return the
    /// trained index as template bytes. The sample is widened to float32 in
    /// one pass; training samples are bounded by the caller.
    pub fn train(&self, samples: &[i8], config: &IndexBuildConfig) -> Result<Vec<u8>> {
        validate_batch_shape(samples.len(), config.dimension)?;

        let widened: Vec<f32> = samples.iter().map(|&value| value as f32).collect();
        IndexBuildService::new().train(&widened, config)
    }
}

fn resolve_float_index(config: &IndexBuildConfig) -> Result<FloatIndex> {
    let mut index = index_factory(config.dimension, &config.descriptor, config.metric)?;
    apply_parameters(&mut index, &config.parameters)?;
    Ok(index)
}

fn resolve_binary_index(config: &IndexBuildConfig) -> Result<BinaryIndex> {
    let mut index = index_binary_factory(config.dimension, &config.descriptor)?;
    apply_parameters(&mut index, &config.parameters)?;
    Ok(index)
}

/// Validate the batch shape and derive the vector count.
fn validate_batch(
    buffer_len: usize,
    elements_per_vector: usize,
    num_ids: usize,
) -> Result<usize> {
    let num_vectors = validate_batch_shape(buffer_len, elements_per_vector)?;

    if num_ids != num_vectors {
        return Err(FalcataError::invalid_argument(
            "Number of IDs does not match number of vectors",
        ));
    }

    Ok(num_vectors)
}

fn validate_batch_shape(buffer_len: usize, elements_per_vector: usize) -> Result<usize> {
    if elements_per_vector == 0 {
        return Err(FalcataError::invalid_argument("dimension must be positive"));
    }
    if buffer_len == 0 {
        return Err(FalcataError::invalid_argument(
            "Number of vectors cannot be 0",
        ));
    }
    if buffer_len % elements_per_vector != 0 {
        return Err(FalcataError::invalid_argument(format!(
            "vector buffer length {buffer_len} is not a multiple of the per-vector width {elements_per_vector}"
        )));
    }

    Ok(buffer_len / elements_per_vector)
}

fn ensure_binary_dimension(dimension: usize) -> Result<()> {
    if dimension == 0 || dimension % 8 != 0 {
        return Err(FalcataError::invalid_argument(format!(
            "binary index dimension must be a positive multiple of 8, got {dimension}"
        )));
    }
    Ok(())
}

fn check_template_dimension(template_dimension: usize, requested: usize) -> Result<()> {
    if template_dimension != requested {
        return Err(FalcataError::invalid_argument(format!(
            "template dimension {template_dimension} does not match requested dimension {requested}"
        )));
    }
    Ok(())
}

fn ensure_trained<I: VectorIndex>(index: &I) -> Result<()> {
    if !index.is_trained() {
        return Err(FalcataError::not_trained(
            "index requires a training phase before vectors can be added",
        ));
    }
    Ok(())
}

fn apply_thread_count(thread_count: usize) -> Result<()> {
    if thread_count != 0 {
        threading::set_build_threads(thread_count)?;
    }
    Ok(())
}

fn add_widened_batches(
    id_map: &mut IdMap<FloatIndex>,
    vectors: &[i8],
    ids: &[i64],
    dimension: usize,
) -> Result<()> {
    for_each_widened_batch(vectors, ids, dimension, |count, batch, batch_ids| {
        id_map.add_with_ids(count, batch, batch_ids)
    })
}

/// Widen an int8 batch to float32 in conversion batches, invoking `add`
/// once per batch with position-aligned IDs. The widening buffer is reused
/// across batches and the last batch shrinks to the remaining count.
fn for_each_widened_batch<F>(
    vectors: &[i8],
    ids: &[i64],
    dimension: usize,
    mut add: F,
) -> Result<()>
where
    F: FnMut(usize, &[f32], &[i64]) -> Result<()>,
{
    let mut widened: Vec<f32> = Vec::with_capacity(BYTE_CONVERSION_BATCH_SIZE * dimension);

    for (batch, batch_ids) in vectors
        .chunks(BYTE_CONVERSION_BATCH_SIZE * dimension)
        .zip(ids.chunks(BYTE_CONVERSION_BATCH_SIZE))
    {
        widened.clear();
        widened.extend(batch.iter().map(|&value| value as f32));
        add(batch_ids.len(), &widened, batch_ids)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_batch_derives_count() {
        assert_eq!(validate_batch(8, 2, 4).unwrap(), 4);
    }

    #[test]
    fn test_validate_batch_rejects_empty_buffer() {
        let result = validate_batch(0, 4, 0);
        assert!(matches!(result, Err(FalcataError::InvalidArgument(_))));
    }

    #[test]
    fn test_validate_batch_rejects_ragged_buffer() {
        let result = validate_batch(7, 2, 3);
        assert!(matches!(result, Err(FalcataError::InvalidArgument(_))));
    }

    #[test]
    fn test_validate_batch_rejects_id_mismatch() {
        let result = validate_batch(8, 2, 3);
        assert!(matches!(result, Err(FalcataError::InvalidArgument(_))));
    }

    #[test]
    fn test_validate_batch_rejects_zero_dimension() {
        let result = validate_batch(8, 0, 8);
        assert!(matches!(result, Err(FalcataError::InvalidArgument(_))));
    }

    #[test]
    fn test_widened_batches_split_2500_into_three_calls() {
        let dimension = 4;
        let count = 2500;
        let vectors = vec![1i8; count * dimension];
        let ids: Vec<i64> = (0..count as i64).collect();

        let mut calls: Vec<(usize, i64, i64)> = Vec::new();
        for_each_widened_batch(&vectors, &ids, dimension, |batch_count, batch, batch_ids| {
            assert_eq!(batch.len(), batch_count * dimension);
            calls.push((
                batch_count,
                batch_ids[0],
                *batch_ids.last().unwrap(),
            ));
            Ok(())
        })
        .unwrap();

        assert_eq!(
            calls,
            vec![(1000, 0, 999), (1000, 1000, 1999), (500, 2000, 2499)]
        );
    }

    #[test]
    fn test_widening_is_direct_numeric_conversion() {
        let vectors: Vec<i8> = vec![-128, -1, 0, 1, 127, 42];
        let ids = vec![1, 2];

        let mut seen: Vec<f32> = Vec::new();
        for_each_widened_batch(&vectors, &ids, 3, |_, batch, _| {
            seen.extend_from_slice(batch);
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![-128.0, -1.0, 0.0, 1.0, 127.0, 42.0]);
    }

    #[test]
    fn test_exact_multiple_produces_full_batches_only() {
        let dimension = 2;
        let count = 2000;
        let vectors = vec![0i8; count * dimension];
        let ids: Vec<i64> = (0..count as i64).collect();

        let mut counts = Vec::new();
        for_each_widened_batch(&vectors, &ids, dimension, |batch_count, _, _| {
            counts.push(batch_count);
            Ok(())
        })
        .unwrap();

        assert_eq!(counts, vec![1000, 1000]);
    }
}
