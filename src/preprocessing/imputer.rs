//! Missing value imputation

use super::ColumnType;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Strategy for filling nulls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    Mean,
    Median,
    /// Most common value; ties go to the smallest
    MostFrequent,
    /// Fixed value, parsed as a number for numeric columns
    Constant(String),
}

/// Learned fill value for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FillValue {
    Number(f64),
    Text(String),
}

/// Column-wise imputer over DataFrames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Imputer {
    strategy: ImputeStrategy,
    fill_values: Vec<(String, FillValue)>,
    is_fitted: bool,
}

impl Imputer {
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self {
            strategy,
            fill_values: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn strategy(&self) -> &ImputeStrategy {
        &self.strategy
    }

    pub fn fill_value(&self, column: &str) -> Option<&FillValue> {
        self.fill_values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Learn one fill value per column
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        let mut fill_values = Vec::with_capacity(columns.len());

        for &name in columns {
            let column = df
                .column(name)
                .map_err(|_| PipelineError::FeatureNotFound(name.to_string()))?;

            let value = match ColumnType::of(column.dtype()) {
                ColumnType::Numeric => FillValue::Number(self.numeric_fill(name, column)?),
                ColumnType::Categorical => FillValue::Text(self.text_fill(name, column)?),
                ColumnType::Unsupported => {
                    return Err(PipelineError::PreprocessingError(format!(
                        "Column '{}' has unsupported dtype {}",
                        name,
                        column.dtype()
                    )))
                }
            };
            fill_values.push((name.to_string(), value));
        }

        self.fill_values = fill_values;
        self.is_fitted = true;
        Ok(self)
    }

    fn numeric_fill(&self, name: &str, column: &Column) -> Result<f64> {
        let cast = column.cast(&DataType::Float64)?;
        let ca = cast.f64()?;

        let value = match &self.strategy {
            ImputeStrategy::Mean => ca.mean(),
            ImputeStrategy::Median => ca.median(),
            ImputeStrategy::MostFrequent => {
                let mut counts: HashMap<u64, usize> = HashMap::new();
                for v in ca.into_iter().flatten() {
                    *counts.entry(v.to_bits()).or_insert(0) += 1;
                }
                counts
                    .into_iter()
                    .map(|(bits, count)| (f64::from_bits(bits), count))
                    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.total_cmp(&a.0)))
                    .map(|(v, _)| v)
            }
            ImputeStrategy::Constant(raw) => Some(raw.trim().parse::<f64>().map_err(|_| {
                PipelineError::PreprocessingError(format!(
                    "Constant fill '{}' for numeric column '{}' is not a number",
                    raw, name
                ))
            })?),
        };

        Ok(value.unwrap_or_else(|| {
            warn!(column = name, "column has no observed values, filling with 0");
            0.0
        }))
    }

    fn text_fill(&self, name: &str, column: &Column) -> Result<String> {
        let ca = column.str()?;

        let value = match &self.strategy {
            ImputeStrategy::MostFrequent => {
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for v in ca.into_iter().flatten() {
                    *counts.entry(v).or_insert(0) += 1;
                }
                counts
                    .into_iter()
                    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
                    .map(|(v, _)| v.to_string())
            }
            ImputeStrategy::Constant(raw) => Some(raw.clone()),
            ImputeStrategy::Mean | ImputeStrategy::Median => {
                return Err(PipelineError::PreprocessingError(format!(
                    "{:?} imputation cannot be applied to categorical column '{}'",
                    self.strategy, name
                )))
            }
        };

        Ok(value.unwrap_or_else(|| {
            warn!(column = name, "column has no observed values, filling with \"missing\"");
            "missing".to_string()
        }))
    }

    /// Fill nulls in every fitted column; numeric columns come back as Float64
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }

        let mut result = df.clone();
        for (name, fill) in &self.fill_values {
            let column = df
                .column(name)
                .map_err(|_| PipelineError::FeatureNotFound(name.clone()))?;

            let filled = match fill {
                FillValue::Number(value) => {
                    let cast = column.cast(&DataType::Float64)?;
                    let ca: Float64Chunked = cast
                        .f64()?
                        .into_iter()
                        .map(|v| Some(v.unwrap_or(*value)))
                        .collect();
                    ca.with_name(column.name().clone()).into_series()
                }
                FillValue::Text(value) => {
                    let cast = column.cast(&DataType::String)?;
                    let ca: StringChunked = cast
                        .str()?
                        .into_iter()
                        .map(|v| Some(v.unwrap_or(value.as_str())))
                        .collect();
                    ca.with_name(column.name().clone()).into_series()
                }
            };
            result.with_column(filled)?;
        }

        Ok(result)
    }

    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df!(
            "score" => [Some(1.0f64), None, Some(3.0), Some(10.0)],
            "lunch" => [Some("standard"), None, Some("free"), Some("standard")]
        )
        .unwrap()
    }

    #[test]
    fn test_median_fill() {
        let mut imputer = Imputer::new(ImputeStrategy::Median);
        let out = imputer.fit_transform(&frame(), &["score"]).unwrap();

        assert_eq!(imputer.fill_value("score"), Some(&FillValue::Number(3.0)));
        let col = out.column("score").unwrap().f64().unwrap();
        assert_eq!(col.null_count(), 0);
        assert_eq!(col.get(1), Some(3.0));
    }

    #[test]
    fn test_most_frequent_text() {
        let mut imputer = Imputer::new(ImputeStrategy::MostFrequent);
        let out = imputer.fit_transform(&frame(), &["lunch"]).unwrap();
        assert_eq!(out.column("lunch").unwrap().str().unwrap().get(1), Some("standard"));
    }

    #[test]
    fn test_most_frequent_numeric_tie_takes_smallest() {
        let df = df!("x" => [Some(4.0f64), Some(2.0), None]).unwrap();
        let mut imputer = Imputer::new(ImputeStrategy::MostFrequent);
        imputer.fit(&df, &["x"]).unwrap();
        assert_eq!(imputer.fill_value("x"), Some(&FillValue::Number(2.0)));
    }

    #[test]
    fn test_constant_and_errors() {
        let mut imputer = Imputer::new(ImputeStrategy::Constant("-1".to_string()));
        let out = imputer.fit_transform(&frame(), &["score", "lunch"]).unwrap();
        assert_eq!(out.column("score").unwrap().f64().unwrap().get(1), Some(-1.0));
        assert_eq!(out.column("lunch").unwrap().str().unwrap().get(1), Some("-1"));

        let mut mean = Imputer::new(ImputeStrategy::Mean);
        assert!(mean.fit(&frame(), &["lunch"]).is_err());
        assert!(matches!(
            mean.fit(&frame(), &["absent"]),
            Err(PipelineError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_transform_requires_fit() {
        let imputer = Imputer::new(ImputeStrategy::Mean);
        assert!(matches!(imputer.transform(&frame()), Err(PipelineError::ModelNotFitted)));
    }
}
