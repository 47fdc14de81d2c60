//! Feature preprocessing
//!
//! - Missing value imputation ([`Imputer`])
//! - One-hot encoding of categorical columns ([`OneHotEncoder`])
//! - Feature scaling ([`Scaler`])
//! - The fitted, serializable combination of the above ([`FeaturePreprocessor`]) and the
//!   pipeline stage that fits and persists it ([`DataTransformation`])

mod encoder;
mod imputer;
mod pipeline;
mod scaler;

pub use encoder::OneHotEncoder;
pub use imputer::{FillValue, ImputeStrategy, Imputer};
pub use pipeline::{target_vector, DataTransformation, FeaturePreprocessor, TransformedData};
pub use scaler::{Scaler, ScalerType};

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Role a column can play as a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Numeric,
    Categorical,
    Unsupported,
}

impl ColumnType {
    pub fn of(dtype: &DataType) -> Self {
        match dtype {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Boolean => ColumnType::Numeric,
            DataType::String => ColumnType::Categorical,
            _ => ColumnType::Unsupported,
        }
    }
}

/// Split the frame's columns into numeric and categorical names, skipping `exclude`
pub fn detect_column_types(df: &DataFrame, exclude: &[&str]) -> (Vec<String>, Vec<String>) {
    let mut numeric = Vec::new();
    let mut categorical = Vec::new();

    for column in df.get_columns() {
        let name = column.name().as_str();
        if exclude.contains(&name) {
            continue;
        }
        match ColumnType::of(column.dtype()) {
            ColumnType::Numeric => numeric.push(name.to_string()),
            ColumnType::Categorical => categorical.push(name.to_string()),
            ColumnType::Unsupported => {
                warn!(column = name, dtype = %column.dtype(), "unsupported column skipped")
            }
        }
    }

    (numeric, categorical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_column_types() {
        let df = df!(
            "gender" => ["female", "male"],
            "reading_score" => [72i64, 90],
            "passed" => [true, false],
            "math_score" => [70.0f64, 88.0]
        )
        .unwrap();

        let (numeric, categorical) = detect_column_types(&df, &["math_score"]);
        assert_eq!(numeric, vec!["reading_score", "passed"]);
        assert_eq!(categorical, vec!["gender"]);
    }

    #[test]
    fn test_column_type_serialize() {
        let json = serde_json::to_string(&ColumnType::Numeric).unwrap();
        assert_eq!(json, "\"Numeric\"");
    }
}
