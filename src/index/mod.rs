//! Vector index implementations and capability interfaces.
//!
//! This module hosts the index object graphs the build service drives:
//! - Float indexes: flat storage, IVF with a trained coarse quantizer, HNSW
//! - Binary (packed-bit) indexes: the same three shapes over Hamming space
//! - The ID-mapping wrapper attaching external IDs at insertion
//! - The descriptor factory and the recursive parameter injector
//!
//! Hyperparameter overrides are dispatched through capability interfaces
//! ([`InvertedFileControls`], [`GraphControls`]) rather than concrete types:
//! a component may implement zero, one, or both.

pub mod binary;
pub mod factory;
pub mod flat;
pub mod hnsw;
pub mod id_map;
pub mod injector;
pub mod ivf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use binary::{BinaryFlatIndex, BinaryHnswIndex, BinaryIvfIndex};
pub use factory::{index_binary_factory, index_factory};
pub use flat::FlatIndex;
pub use hnsw::{HnswGraph, HnswIndex};
pub use id_map::IdMap;
pub use injector::apply_parameters;
pub use ivf::IvfIndex;

/// Core interface shared by all index components.
///
/// Positions are dense sequence numbers assigned in insertion order; the
/// [`IdMap`] wrapper maps them to external IDs.
pub trait VectorIndex {
    /// Element type of one vector component (`f32` or packed `u8`).
    type Elem: Copy;

    /// Vector dimensionality in elements (bits for binary indexes).
    fn dimension(&self) -> usize;

    /// Number of stored elements per vector.
    fn code_size(&self) -> usize;

    /// Whether the index can accept vectors without further training.
    fn is_trained(&self) -> bool;

    /// Total number of stored vectors.
    fn ntotal(&self) -> u64;

    /// Run the training phase on a sample of vectors. A no-op for index
    /// types that require no training.
    fn train(&mut self, vectors: &[Self::Elem]) -> Result<()>;

    /// Append `count` vectors stored contiguously in `vectors`.
    fn add(&mut self, count: usize, vectors: &[Self::Elem]) -> Result<()>;

    /// Return a copy of the vector at a sequential position.
    fn reconstruct(&self, position: u64) -> Result<Vec<Self::Elem>>;
}

/// Capability of components carrying an inverted-file structure.
pub trait InvertedFileControls {
    /// Set the search-time candidate-list fan-out.
    fn set_nprobe(&mut self, nprobe: usize);

    /// Access the coarse quantizer sub-component for recursive parameter
    /// application, when one is present.
    fn coarse_quantizer_mut(&mut self) -> Option<&mut dyn IndexParameters>;
}

/// Capability of components carrying graph construction/search breadth
/// controls.
pub trait GraphControls {
    /// Set the construction-time neighbor-exploration breadth.
    fn set_ef_construction(&mut self, ef_construction: usize);

    /// Set the search-time neighbor-exploration breadth.
    fn set_ef_search(&mut self, ef_search: usize);
}

/// Capability discovery on an index component.
pub trait IndexParameters {
    /// The component's inverted-file controls, if it has that capability.
    fn inverted_file_controls(&mut self) -> Option<&mut dyn InvertedFileControls>;

    /// The component's graph controls, if it has that capability.
    fn graph_controls(&mut self) -> Option<&mut dyn GraphControls>;
}

/// A float vector index object graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FloatIndex {
    /// Exhaustive flat storage.
    Flat(FlatIndex),
    /// Inverted file over a trained coarse quantizer.
    Ivf(IvfIndex),
    /// Navigable proximity graph.
    Hnsw(HnswIndex),
}

impl VectorIndex for FloatIndex {
    type Elem = f32;

    fn dimension(&self) -> usize {
        match self {
            FloatIndex::Flat(index) => index.dimension(),
            FloatIndex::Ivf(index) => index.dimension(),
            FloatIndex::Hnsw(index) => index.dimension(),
        }
    }

    fn code_size(&self) -> usize {
        match self {
            FloatIndex::Flat(index) => index.code_size(),
            FloatIndex::Ivf(index) => index.code_size(),
            FloatIndex::Hnsw(index) => index.code_size(),
        }
    }

    fn is_trained(&self) -> bool {
        match self {
            FloatIndex::Flat(index) => index.is_trained(),
            FloatIndex::Ivf(index) => index.is_trained(),
            FloatIndex::Hnsw(index) => index.is_trained(),
        }
    }

    fn ntotal(&self) -> u64 {
        match self {
            FloatIndex::Flat(index) => index.ntotal(),
            FloatIndex::Ivf(index) => index.ntotal(),
            FloatIndex::Hnsw(index) => index.ntotal(),
        }
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        match self {
            FloatIndex::Flat(index) => index.train(vectors),
            FloatIndex::Ivf(index) => index.train(vectors),
            FloatIndex::Hnsw(index) => index.train(vectors),
        }
    }

    fn add(&mut self, count: usize, vectors: &[f32]) -> Result<()> {
        match self {
            FloatIndex::Flat(index) => index.add(count, vectors),
            FloatIndex::Ivf(index) => index.add(count, vectors),
            FloatIndex::Hnsw(index) => index.add(count, vectors),
        }
    }

    fn reconstruct(&self, position: u64) -> Result<Vec<f32>> {
        match self {
            FloatIndex::Flat(index) => index.reconstruct(position),
            FloatIndex::Ivf(index) => index.reconstruct(position),
            FloatIndex::Hnsw(index) => index.reconstruct(position),
        }
    }
}

impl IndexParameters for FloatIndex {
    fn inverted_file_controls(&mut self) -> Option<&mut dyn InvertedFileControls> {
        match self {
            FloatIndex::Ivf(index) => Some(index),
            _ => None,
        }
    }

    fn graph_controls(&mut self) -> Option<&mut dyn GraphControls> {
        match self {
            FloatIndex::Hnsw(index) => Some(index),
            _ => None,
        }
    }
}

/// A binary (packed-bit) vector index object graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BinaryIndex {
    /// Exhaustive flat code storage.
    Flat(BinaryFlatIndex),
    /// Inverted file over k-majority centroids.
    Ivf(BinaryIvfIndex),
    /// Navigable proximity graph over Hamming space.
    Hnsw(BinaryHnswIndex),
}

impl VectorIndex for BinaryIndex {
    type Elem = u8;

    fn dimension(&self) -> usize {
        match self {
            BinaryIndex::Flat(index) => index.dimension(),
            BinaryIndex::Ivf(index) => index.dimension(),
            BinaryIndex::Hnsw(index) => index.dimension(),
        }
    }

    fn code_size(&self) -> usize {
        match self {
            BinaryIndex::Flat(index) => index.code_size(),
            BinaryIndex::Ivf(index) => index.code_size(),
            BinaryIndex::Hnsw(index) => index.code_size(),
        }
    }

    fn is_trained(&self) -> bool {
        match self {
            BinaryIndex::Flat(index) => index.is_trained(),
            BinaryIndex::Ivf(index) => index.is_trained(),
            BinaryIndex::Hnsw(index) => index.is_trained(),
        }
    }

    fn ntotal(&self) -> u64 {
        match self {
            BinaryIndex::Flat(index) => index.ntotal(),
            BinaryIndex::Ivf(index) => index.ntotal(),
            BinaryIndex::Hnsw(index) => index.ntotal(),
        }
    }

    fn train(&mut self, vectors: &[u8]) -> Result<()> {
        match self {
            BinaryIndex::Flat(index) => index.train(vectors),
            BinaryIndex::Ivf(index) => index.train(vectors),
            BinaryIndex::Hnsw(index) => index.train(vectors),
        }
    }

    fn add(&mut self, count: usize, vectors: &[u8]) -> Result<()> {
        match self {
            BinaryIndex::Flat(index) => index.add(count, vectors),
            BinaryIndex::Ivf(index) => index.add(count, vectors),
            BinaryIndex::Hnsw(index) => index.add(count, vectors),
        }
    }

    fn reconstruct(&self, position: u64) -> Result<Vec<u8>> {
        match self {
            BinaryIndex::Flat(index) => index.reconstruct(position),
            BinaryIndex::Ivf(index) => index.reconstruct(position),
            BinaryIndex::Hnsw(index) => index.reconstruct(position),
        }
    }
}

impl IndexParameters for BinaryIndex {
    fn inverted_file_controls(&mut self) -> Option<&mut dyn InvertedFileControls> {
        match self {
            BinaryIndex::Ivf(index) => Some(index),
            _ => None,
        }
    }

    fn graph_controls(&mut self) -> Option<&mut dyn GraphControls> {
        match self {
            BinaryIndex::Hnsw(index) => Some(index),
            _ => None,
        }
    }
}
