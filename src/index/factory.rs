//! Factory resolving index descriptors into index object graphs.
//!
//! The descriptor grammar composes an index from a head component and an
//! optional storage suffix:
//!
//! - `Flat` — exhaustive float storage
//! - `HNSW<m>[,Flat]` — proximity graph with connectivity `m`
//! - `IVF<nlist>[_HNSW<m>],Flat` — inverted file with `nlist` cells; the
//!   `_HNSW<m>` infix places a graph-backed coarse quantizer inside it
//! - `BFlat` | `BHNSW<m>` | `BIVF<nlist>` — the packed-bit variants
//!
//! IVF-family descriptors resolve to untrained graphs; they must go through
//! a training phase before accepting vectors.

use crate::error::{FalcataError, Result};
use crate::index::binary::{BinaryFlatIndex, BinaryHnswIndex, BinaryIvfIndex};
use crate::index::flat::FlatIndex;
use crate::index::hnsw::HnswIndex;
use crate::index::ivf::IvfIndex;
use crate::index::{BinaryIndex, FloatIndex};
use crate::metric::DistanceMetric;

const DEFAULT_HNSW_M: usize = 32;

/// Resolve a float index descriptor into an untrained-or-partially-trained
/// index graph.
pub fn index_factory(
    dimension: usize,
    descriptor: &str,
    metric: DistanceMetric,
) -> Result<FloatIndex> {
    if dimension == 0 {
        return Err(FalcataError::invalid_argument("dimension must be positive"));
    }

    let (head, tail) = split_descriptor(descriptor);

    if head == "Flat" && tail.is_none() {
        return Ok(FloatIndex::Flat(FlatIndex::new(dimension, metric)));
    }

    if let Some(suffix) = head.strip_prefix("HNSW") {
        if matches!(tail, None | Some("Flat")) {
            let m = parse_hnsw_m(descriptor, suffix)?;
            return Ok(FloatIndex::Hnsw(HnswIndex::new(dimension, m, metric)));
        }
    }

    if let Some(rest) = head.strip_prefix("IVF") {
        if tail == Some("Flat") {
            let (nlist, quantizer_m) = parse_ivf_layout(descriptor, rest)?;
            let quantizer = match quantizer_m {
                Some(m) => FloatIndex::Hnsw(HnswIndex::new(dimension, m, metric)),
                None => FloatIndex::Flat(FlatIndex::new(dimension, metric)),
            };
            return Ok(FloatIndex::Ivf(IvfIndex::new(
                dimension, nlist, metric, quantizer,
            )));
        }
    }

    Err(unsupported(descriptor))
}

/// Resolve a binary index descriptor. The dimension is in bits and must be
/// a multiple of 8.
pub fn index_binary_factory(dimension: usize, descriptor: &str) -> Result<BinaryIndex> {
    if dimension == 0 {
        return Err(FalcataError::invalid_argument("dimension must be positive"));
    }
    if dimension % 8 != 0 {
        return Err(FalcataError::invalid_argument(format!(
            "binary index dimension must be a multiple of 8, got {dimension}"
        )));
    }

    let (head, tail) = split_descriptor(descriptor);
    if tail.is_some() {
        return Err(unsupported(descriptor));
    }

    if head == "BFlat" {
        return Ok(BinaryIndex::Flat(BinaryFlatIndex::new(dimension)));
    }

    if let Some(suffix) = head.strip_prefix("BHNSW") {
        let m = parse_hnsw_m(descriptor, suffix)?;
        return Ok(BinaryIndex::Hnsw(BinaryHnswIndex::new(dimension, m)));
    }

    if let Some(rest) = head.strip_prefix("BIVF") {
        let nlist = parse_count(descriptor, rest)?;
        let quantizer = BinaryIndex::Flat(BinaryFlatIndex::new(dimension));
        return Ok(BinaryIndex::Ivf(BinaryIvfIndex::new(
            dimension, nlist, quantizer,
        )));
    }

    Err(unsupported(descriptor))
}

fn split_descriptor(descriptor: &str) -> (&str, Option<&str>) {
    match descriptor.split_once(',') {
        Some((head, tail)) => (head, Some(tail)),
        None => (descriptor, None),
    }
}

fn parse_hnsw_m(descriptor: &str, suffix: &str) -> Result<usize> {
    if suffix.is_empty() {
        return Ok(DEFAULT_HNSW_M);
    }
    parse_count(descriptor, suffix)
}

fn parse_ivf_layout(descriptor: &str, rest: &str) -> Result<(usize, Option<usize>)> {
    match rest.split_once('_') {
        Some((nlist, quantizer)) => {
            let suffix = quantizer
                .strip_prefix("HNSW")
                .ok_or_else(|| unsupported(descriptor))?;
            Ok((
                parse_count(descriptor, nlist)?,
                Some(parse_hnsw_m(descriptor, suffix)?),
            ))
        }
        None => Ok((parse_count(descriptor, rest)?, None)),
    }
}

fn parse_count(descriptor: &str, digits: &str) -> Result<usize> {
    let value: usize = digits.parse().map_err(|_| unsupported(descriptor))?;
    if value == 0 {
        return Err(unsupported(descriptor));
    }
    Ok(value)
}

fn unsupported(descriptor: &str) -> FalcataError {
    FalcataError::invalid_argument(format!("unsupported index descriptor: {descriptor}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::index::VectorIndex;

    #[test]
    fn test_flat_descriptor() {
        let index = index_factory(16, "Flat", DistanceMetric::L2).unwrap();
        assert!(matches!(index, FloatIndex::Flat(_)));
        assert!(index.is_trained());
    }

    #[test]
    fn test_hnsw_descriptor() {
        let index = index_factory(16, "HNSW16,Flat", DistanceMetric::L2).unwrap();
        match index {
            FloatIndex::Hnsw(hnsw) => assert_eq!(hnsw.graph().m(), 16),
            other => panic!("expected HNSW index, got {other:?}"),
        }

        // The storage suffix is optional for graph descriptors.
        assert!(index_factory(16, "HNSW8", DistanceMetric::L2).is_ok());
    }

    #[test]
    fn test_ivf_descriptor_resolves_untrained() {
        let index = index_factory(16, "IVF64,Flat", DistanceMetric::L2).unwrap();
        assert!(!index.is_trained());
        match index {
            FloatIndex::Ivf(ivf) => {
                assert_eq!(ivf.nlist(), 64);
                assert!(matches!(ivf.quantizer(), FloatIndex::Flat(_)));
            }
            other => panic!("expected IVF index, got {other:?}"),
        }
    }

    #[test]
    fn test_ivf_with_graph_quantizer() {
        let index = index_factory(16, "IVF64_HNSW8,Flat", DistanceMetric::L2).unwrap();
        match index {
            FloatIndex::Ivf(ivf) => match ivf.quantizer() {
                FloatIndex::Hnsw(hnsw) => assert_eq!(hnsw.graph().m(), 8),
                other => panic!("expected HNSW quantizer, got {other:?}"),
            },
            other => panic!("expected IVF index, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_descriptors() {
        assert!(index_factory(16, "PQ8", DistanceMetric::L2).is_err());
        assert!(index_factory(16, "IVF64", DistanceMetric::L2).is_err());
        assert!(index_factory(16, "IVF0,Flat", DistanceMetric::L2).is_err());
        assert!(index_factory(16, "HNSWx,Flat", DistanceMetric::L2).is_err());
        assert!(index_factory(0, "Flat", DistanceMetric::L2).is_err());
    }

    #[test]
    fn test_binary_descriptors() {
        assert!(matches!(
            index_binary_factory(16, "BFlat").unwrap(),
            BinaryIndex::Flat(_)
        ));
        assert!(matches!(
            index_binary_factory(16, "BHNSW8").unwrap(),
            BinaryIndex::Hnsw(_)
        ));

        let index = index_binary_factory(16, "BIVF4").unwrap();
        assert!(!index.is_trained());
    }

    #[test]
    fn test_binary_dimension_must_be_multiple_of_8() {
        let result = index_binary_factory(12, "BFlat");
        assert!(matches!(result, Err(FalcataError::InvalidArgument(_))));
    }
}
