//! # Falcata
//!
//! A library for building, configuring, and persisting approximate-nearest-
//! neighbor (ANN) vector indexes from in-memory vector batches.
//!
//! ## Features
//!
//! - Pure Rust implementation
//! - Float32, packed-binary, and int8 vector batches
//! - Descriptor-driven index composition (flat, IVF, HNSW)
//! - Recursive runtime parameter injection via capability interfaces
//! - External 64-bit ID mapping
//! - Atomic on-disk persistence with integrity checking
//!
//! ## Example
//!
//! ```
//! use falcata::build::{IndexBuildConfig, IndexBuildService};
//! use falcata::persist;
//!
//! # fn main() -> falcata::error::Result<()> {
//! let dir = tempfile::TempDir::new().unwrap();
//! let path = dir.path().join("vectors.flct");
//!
//! let vectors = vec![1.0f32, 0.0, 0.0, 1.0];
//! let ids = vec![10i64, 20];
//!
//! let config = IndexBuildConfig::new(2, "Flat");
//! IndexBuildService::new().build(&vectors, &ids, &path, &config)?;
//!
//! let index = persist::read_float_index(&path)?;
//! assert_eq!(index.lookup(10)?, Some(vec![1.0, 0.0]));
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod error;
pub mod index;
pub mod metric;
pub mod params;
pub mod persist;
pub mod threading;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
