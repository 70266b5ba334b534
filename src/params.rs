//! Runtime parameter maps for index configuration.
//!
//! Some hyperparameters cannot be expressed in the index descriptor grammar
//! and are supplied at build time as a recursive map: a value is either an
//! integer or a nested map carrying the parameters of a sub-component (for
//! example a coarse quantizer nested inside an inverted-file index).

use std::collections::HashMap;

use crate::error::{FalcataError, Result};

/// Search-time candidate-list fan-out for inverted-file indexes.
pub const NPROBES: &str = "nprobes";

/// Nested parameter map applied recursively to an inverted-file index's
/// coarse quantizer.
pub const COARSE_QUANTIZER: &str = "coarse_quantizer";

/// Construction-time neighbor-exploration breadth for graph indexes.
pub const EF_CONSTRUCTION: &str = "ef_construction";

/// Search-time neighbor-exploration breadth for graph indexes.
pub const EF_SEARCH: &str = "ef_search";

/// A parameter map from name to value.
pub type ParamMap = HashMap<String, ParamValue>;

/// A runtime parameter value: an integer or a nested map.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// An integer parameter.
    Int(i64),
    /// A nested parameter map for a sub-component.
    Map(ParamMap),
}

impl ParamValue {
    /// Interpret this value as an integer.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            ParamValue::Int(value) => Ok(*value),
            ParamValue::Map(_) => Err(FalcataError::invalid_argument(
                "expected an integer parameter value, got a nested map",
            )),
        }
    }

    /// Interpret this value as a non-negative count.
    pub fn as_count(&self) -> Result<usize> {
        let value = self.as_int()?;
        usize::try_from(value).map_err(|_| {
            FalcataError::invalid_argument(format!(
                "expected a non-negative parameter value, got {value}"
            ))
        })
    }

    /// Interpret this value as a nested parameter map.
    pub fn as_map(&self) -> Result<&ParamMap> {
        match self {
            ParamValue::Map(map) => Ok(map),
            ParamValue::Int(_) => Err(FalcataError::invalid_argument(
                "expected a nested parameter map, got an integer",
            )),
        }
    }

    /// Convert an untyped JSON value into a parameter value.
    ///
    /// Integers map to [`ParamValue::Int`], objects map recursively to
    /// [`ParamValue::Map`]; anything else is rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(ParamValue::Int)
                .ok_or_else(|| {
                    FalcataError::invalid_argument(format!(
                        "parameter value {number} is not an integer"
                    ))
                }),
            serde_json::Value::Object(object) => {
                let mut map = ParamMap::with_capacity(object.len());
                for (key, nested) in object {
                    map.insert(key.clone(), ParamValue::from_json(nested)?);
                }
                Ok(ParamValue::Map(map))
            }
            other => Err(FalcataError::invalid_argument(format!(
                "unsupported parameter value: {other}"
            ))),
        }
    }
}

/// Convert a JSON object into a parameter map.
pub fn param_map_from_json(value: &serde_json::Value) -> Result<ParamMap> {
    match ParamValue::from_json(value)? {
        ParamValue::Map(map) => Ok(map),
        ParamValue::Int(_) => Err(FalcataError::invalid_argument(
            "top-level parameters must be a JSON object",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_from_json_nested() {
        let value = json!({
            "nprobes": 64,
            "coarse_quantizer": { "ef_search": 128 }
        });

        let map = param_map_from_json(&value).unwrap();
        assert_eq!(map.get(NPROBES).unwrap().as_int().unwrap(), 64);

        let nested = map.get(COARSE_QUANTIZER).unwrap().as_map().unwrap();
        assert_eq!(nested.get(EF_SEARCH).unwrap().as_int().unwrap(), 128);
    }

    #[test]
    fn test_from_json_rejects_non_integers() {
        assert!(param_map_from_json(&json!({ "nprobes": 1.5 })).is_err());
        assert!(param_map_from_json(&json!({ "nprobes": "64" })).is_err());
        assert!(param_map_from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_value_shape_errors() {
        let value = ParamValue::Int(8);
        assert!(value.as_map().is_err());
        assert_eq!(value.as_count().unwrap(), 8);

        let nested = ParamValue::Map(ParamMap::new());
        assert!(nested.as_int().is_err());

        assert!(ParamValue::Int(-3).as_count().is_err());
    }
}
