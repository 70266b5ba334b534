//! Error types for the Falcata library.
//!
//! All errors are represented by the [`FalcataError`] enum, which classifies
//! every failure a build can surface so callers can decide between retrying,
//! backing off, or reporting to an end user.
//!
//! # Examples
//!
//! ```
//! use falcata::error::{FalcataError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(FalcataError::invalid_argument("Number of vectors cannot be 0"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use anyhow;
use thiserror::Error;

/// The main error type for Falcata operations.
///
/// This enum represents all possible errors that can occur in the Falcata
/// library. It uses the `thiserror` crate for automatic `Error` trait
/// implementation and provides convenient constructor methods for creating
/// specific error types.
#[derive(Error, Debug)]
pub enum FalcataError {
    /// I/O errors (file operations, persistence, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A caller-supplied argument violated a build precondition.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The resolved index requires a training phase that never ran.
    #[error("Index is not trained: {0}")]
    NotTrained(String),

    /// Encoding or decoding a persisted index failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Index-related errors (internal invariant violations)
    #[error("Index error: {0}")]
    Index(String),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with FalcataError.
pub type Result<T> = std::result::Result<T, FalcataError>;

impl FalcataError {
    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        FalcataError::InvalidArgument(msg.into())
    }

    /// Create a new not-trained error.
    pub fn not_trained<S: Into<String>>(msg: S) -> Self {
        FalcataError::NotTrained(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        FalcataError::Serialization(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        FalcataError::Index(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        FalcataError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = FalcataError::invalid_argument("Number of IDs does not match number of vectors");
        assert_eq!(
            error.to_string(),
            "Invalid argument: Number of IDs does not match number of vectors"
        );

        let error = FalcataError::not_trained("descriptor IVF256,Flat requires training");
        assert_eq!(
            error.to_string(),
            "Index is not trained: descriptor IVF256,Flat requires training"
        );

        let error = FalcataError::index("dimension mismatch");
        assert_eq!(error.to_string(), "Index error: dimension mismatch");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let falcata_error = FalcataError::from(io_error);

        match falcata_error {
            FalcataError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
