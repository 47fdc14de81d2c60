//! Hyperparameter values and exhaustive search grids

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value
///
/// Serialized untagged so grids read naturally from JSON:
/// `{"n_estimators": [8, 16], "criterion": ["squared_error"], "max_depth": [null, 4]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    /// Get as float (integers widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParamValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => f.write_str("null"),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::String(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// One concrete assignment of hyperparameters, keyed by parameter name
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Render a parameter set as `name=value, ...` for logs and reports
pub fn format_params(params: &ParamSet) -> String {
    if params.is_empty() {
        return "defaults".to_string();
    }
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Exhaustive hyperparameter grid: parameter name to the ordered values to try
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid {
    params: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    /// Empty grid (no tuning)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter with its candidate values
    pub fn with<V, I>(mut self, name: &str, values: I) -> Self
    where
        V: Into<ParamValue>,
        I: IntoIterator<Item = V>,
    {
        self.params
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameter names in enumeration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn values(&self, name: &str) -> Option<&[ParamValue]> {
        self.params.get(name).map(Vec::as_slice)
    }

    /// Number of combinations the grid expands to
    pub fn n_combinations(&self) -> usize {
        self.params.values().map(Vec::len).product()
    }

    /// Expand to every combination.
    ///
    /// Parameter names are taken in sorted order, with the last name varying fastest.
    pub fn combinations(&self) -> Result<Vec<ParamSet>> {
        let mut combos = vec![ParamSet::new()];

        for (name, values) in &self.params {
            if values.is_empty() {
                return Err(PipelineError::invalid_param(
                    name.as_str(),
                    "[]",
                    "grid entry lists no values",
                ));
            }

            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for value in values {
                    let mut extended = combo.clone();
                    extended.insert(name.clone(), value.clone());
                    next.push(extended);
                }
            }
            combos = next;
        }

        Ok(combos)
    }
}

// Typed accessors used by the estimators' `set_params`

pub(crate) fn float_param(name: &str, value: &ParamValue) -> Result<f64> {
    value
        .as_float()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PipelineError::invalid_param(name, value, "expected a finite number"))
}

pub(crate) fn positive_float_param(name: &str, value: &ParamValue) -> Result<f64> {
    let v = float_param(name, value)?;
    if v <= 0.0 {
        return Err(PipelineError::invalid_param(name, value, "must be positive"));
    }
    Ok(v)
}

pub(crate) fn usize_param(name: &str, value: &ParamValue) -> Result<usize> {
    match value.as_int() {
        Some(v) if v >= 0 => Ok(v as usize),
        _ => Err(PipelineError::invalid_param(
            name,
            value,
            "expected a non-negative integer",
        )),
    }
}

pub(crate) fn optional_usize_param(name: &str, value: &ParamValue) -> Result<Option<usize>> {
    if value.is_null() {
        Ok(None)
    } else {
        usize_param(name, value).map(Some)
    }
}

pub(crate) fn bool_param(name: &str, value: &ParamValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| PipelineError::invalid_param(name, value, "expected a boolean"))
}

pub(crate) fn str_param<'a>(name: &str, value: &'a ParamValue) -> Result<&'a str> {
    value
        .as_string()
        .ok_or_else(|| PipelineError::invalid_param(name, value, "expected a string"))
}

pub(crate) fn unknown_param(model: &str, name: &str, value: &ParamValue) -> PipelineError {
    PipelineError::invalid_param(name, value, format!("not a parameter of {}", model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_grid_has_single_default_combination() {
        let grid = ParamGrid::new();
        assert!(grid.is_empty());
        assert_eq!(grid.combinations().unwrap(), vec![ParamSet::new()]);
    }

    #[test]
    fn test_combinations_last_name_fastest() {
        let grid = ParamGrid::new()
            .with("alpha", [0.1, 1.0])
            .with("fit_intercept", [true, false]);

        let combos = grid.combinations().unwrap();
        assert_eq!(combos.len(), 4);
        assert_eq!(grid.n_combinations(), 4);

        assert_eq!(combos[0]["alpha"], ParamValue::Float(0.1));
        assert_eq!(combos[0]["fit_intercept"], ParamValue::Bool(true));
        assert_eq!(combos[1]["alpha"], ParamValue::Float(0.1));
        assert_eq!(combos[1]["fit_intercept"], ParamValue::Bool(false));
        assert_eq!(combos[2]["alpha"], ParamValue::Float(1.0));
    }

    #[test]
    fn test_empty_value_list_is_malformed() {
        let grid = ParamGrid::new().with::<i64, _>("n_estimators", []);
        let err = grid.combinations().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { .. }));
    }

    #[test]
    fn test_grid_json_roundtrip_is_untagged() {
        let json = r#"{
            "criterion": ["squared_error", "absolute_error"],
            "max_depth": [null, 4],
            "alpha": [0.5]
        }"#;
        let grid: ParamGrid = serde_json::from_str(json).unwrap();

        assert_eq!(grid.values("max_depth").unwrap(), &[ParamValue::Null, ParamValue::Int(4)]);
        assert_eq!(grid.values("alpha").unwrap(), &[ParamValue::Float(0.5)]);
        assert_eq!(grid.n_combinations(), 4);
    }

    #[test]
    fn test_typed_accessors() {
        assert_eq!(usize_param("k", &ParamValue::Int(5)).unwrap(), 5);
        assert!(usize_param("k", &ParamValue::Int(-1)).is_err());
        assert!(usize_param("k", &ParamValue::Float(2.5)).is_err());
        assert_eq!(optional_usize_param("d", &ParamValue::Null).unwrap(), None);
        assert_eq!(float_param("a", &ParamValue::Int(2)).unwrap(), 2.0);
        assert!(positive_float_param("a", &ParamValue::Float(0.0)).is_err());
        assert_eq!(format_params(&ParamSet::new()), "defaults");
    }
}
