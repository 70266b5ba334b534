//! Recursive parameter injection over resolved index graphs.
//!
//! Descriptors cannot express every hyperparameter, so callers supply the
//! remainder as a recursive parameter map applied after resolution. Each
//! component is queried for its capabilities rather than its concrete type:
//! a component may expose inverted-file controls, graph controls, both, or
//! neither, and both capability branches are evaluated independently.

use crate::error::Result;
use crate::index::{IndexParameters, InvertedFileControls};
use crate::params::{self, ParamMap};

/// Apply a parameter map to an index component and, through the
/// `coarse_quantizer` key, to its nested sub-components.
///
/// Keys without a matching capability on the target component are ignored;
/// a recognized key carrying a value of the wrong shape is rejected.
pub fn apply_parameters(index: &mut dyn IndexParameters, parameters: &ParamMap) -> Result<()> {
    if parameters.is_empty() {
        return Ok(());
    }

    if let Some(controls) = index.inverted_file_controls() {
        apply_inverted_file_parameters(controls, parameters)?;
    }

    if let Some(controls) = index.graph_controls() {
        if let Some(value) = parameters.get(params::EF_CONSTRUCTION) {
            controls.set_ef_construction(value.as_count()?);
        }
        if let Some(value) = parameters.get(params::EF_SEARCH) {
            controls.set_ef_search(value.as_count()?);
        }
    }

    Ok(())
}

fn apply_inverted_file_parameters(
    controls: &mut dyn InvertedFileControls,
    parameters: &ParamMap,
) -> Result<()> {
    if let Some(value) = parameters.get(params::NPROBES) {
        controls.set_nprobe(value.as_count()?);
    }

    if let Some(value) = parameters.get(params::COARSE_QUANTIZER) {
        let nested = value.as_map()?;
        if let Some(quantizer) = controls.coarse_quantizer_mut() {
            apply_parameters(quantizer, nested)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::index::factory::index_factory;
    use crate::index::FloatIndex;
    use crate::metric::DistanceMetric;
    use crate::params::{ParamValue, COARSE_QUANTIZER, EF_CONSTRUCTION, EF_SEARCH, NPROBES};

    fn int_param(key: &str, value: i64) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert(key.to_string(), ParamValue::Int(value));
        map
    }

    #[test]
    fn test_nprobes_sets_ivf_fanout() {
        let mut index = index_factory(16, "IVF64,Flat", DistanceMetric::L2).unwrap();
        apply_parameters(&mut index, &int_param(NPROBES, 8)).unwrap();

        match index {
            FloatIndex::Ivf(ivf) => assert_eq!(ivf.nprobe(), 8),
            other => panic!("expected IVF index, got {other:?}"),
        }
    }

    #[test]
    fn test_graph_keys_are_noop_on_inverted_file_graph() {
        let mut index = index_factory(16, "IVF64,Flat", DistanceMetric::L2).unwrap();
        apply_parameters(&mut index, &int_param(EF_SEARCH, 99)).unwrap();

        match index {
            FloatIndex::Ivf(ivf) => {
                assert_eq!(ivf.nprobe(), 1);
                assert!(matches!(ivf.quantizer(), FloatIndex::Flat(_)));
            }
            other => panic!("expected IVF index, got {other:?}"),
        }
    }

    #[test]
    fn test_ef_keys_set_graph_breadth() {
        let mut index = index_factory(16, "HNSW16,Flat", DistanceMetric::L2).unwrap();
        let mut parameters = int_param(EF_CONSTRUCTION, 300);
        parameters.insert(EF_SEARCH.to_string(), ParamValue::Int(48));
        apply_parameters(&mut index, &parameters).unwrap();

        match index {
            FloatIndex::Hnsw(hnsw) => {
                assert_eq!(hnsw.graph().ef_construction(), 300);
                assert_eq!(hnsw.graph().ef_search(), 48);
            }
            other => panic!("expected HNSW index, got {other:?}"),
        }
    }

    #[test]
    fn test_coarse_quantizer_recursion_reaches_nested_graph() {
        let mut index = index_factory(16, "IVF64_HNSW8,Flat", DistanceMetric::L2).unwrap();

        let mut parameters = int_param(NPROBES, 4);
        parameters.insert(
            COARSE_QUANTIZER.to_string(),
            ParamValue::Map(int_param(EF_SEARCH, 55)),
        );
        apply_parameters(&mut index, &parameters).unwrap();

        match index {
            FloatIndex::Ivf(ivf) => {
                assert_eq!(ivf.nprobe(), 4);
                match ivf.quantizer() {
                    FloatIndex::Hnsw(hnsw) => assert_eq!(hnsw.graph().ef_search(), 55),
                    other => panic!("expected HNSW quantizer, got {other:?}"),
                }
            }
            other => panic!("expected IVF index, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let mut index = index_factory(16, "Flat", DistanceMetric::L2).unwrap();
        apply_parameters(&mut index, &int_param("pq_segments", 8)).unwrap();

        let mut index = index_factory(16, "IVF64,Flat", DistanceMetric::L2).unwrap();
        apply_parameters(&mut index, &int_param("pq_segments", 8)).unwrap();
    }

    #[test]
    fn test_wrong_value_shape_is_rejected() {
        let mut index = index_factory(16, "IVF64,Flat", DistanceMetric::L2).unwrap();

        let mut parameters = ParamMap::new();
        parameters.insert(NPROBES.to_string(), ParamValue::Map(ParamMap::new()));
        assert!(apply_parameters(&mut index, &parameters).is_err());

        let mut parameters = ParamMap::new();
        parameters.insert(COARSE_QUANTIZER.to_string(), ParamValue::Int(3));
        assert!(apply_parameters(&mut index, &parameters).is_err());
    }

    #[test]
    fn test_negative_counts_are_rejected() {
        let mut index = index_factory(16, "IVF64,Flat", DistanceMetric::L2).unwrap();
        assert!(apply_parameters(&mut index, &int_param(NPROBES, -1)).is_err());
    }
}
