//! Distance metrics for vector comparison during index construction.

use serde::{Deserialize, Serialize};

use crate::error::{FalcataError, Result};

/// Distance metrics accepted by the float index factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistanceMetric {
    /// Euclidean (L2) distance
    #[default]
    L2,
    /// Inner product similarity (negated, so lower is closer)
    InnerProduct,
    /// Cosine distance (1 - cosine similarity)
    Cosine,
}

impl DistanceMetric {
    /// Calculate the distance between two vectors using this metric.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(FalcataError::index(
                "Vector dimensions must match for distance calculation",
            ));
        }

        let result = match self {
            DistanceMetric::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::InnerProduct => {
                -a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>()
            }
            DistanceMetric::Cosine => {
                let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0 // Maximum distance for zero vectors
                } else {
                    1.0 - (dot_product / (norm_a * norm_b))
                }
            }
        };

        Ok(result)
    }

    /// Get the name of this distance metric.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "inner_product",
            DistanceMetric::Cosine => "cosine",
        }
    }

    /// Parse a distance metric from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "inner_product" | "ip" => Ok(DistanceMetric::InnerProduct),
            "cosine" => Ok(DistanceMetric::Cosine),
            _ => Err(FalcataError::invalid_argument(format!(
                "Unknown distance metric: {s}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_distance() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];

        let distance = DistanceMetric::L2.distance(&a, &b).unwrap();
        assert!((distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_inner_product_distance() {
        let a = vec![1.0, 2.0];
        let b = vec![3.0, 4.0];

        let distance = DistanceMetric::InnerProduct.distance(&a, &b).unwrap();
        assert!((distance + 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_identical_vectors() {
        let a = vec![1.0, 2.0, 3.0];

        let distance = DistanceMetric::Cosine.distance(&a, &a).unwrap();
        assert!(distance.abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];

        assert!(DistanceMetric::L2.distance(&a, &b).is_err());
    }

    #[test]
    fn test_parse_str() {
        assert_eq!(DistanceMetric::parse_str("l2").unwrap(), DistanceMetric::L2);
        assert_eq!(
            DistanceMetric::parse_str("ip").unwrap(),
            DistanceMetric::InnerProduct
        );
        assert_eq!(
            DistanceMetric::parse_str("cosine").unwrap(),
            DistanceMetric::Cosine
        );
        assert!(DistanceMetric::parse_str("hamming").is_err());
    }
}
