//! One-hot encoding of categorical columns

use crate::error::{PipelineError, Result};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// One-hot encoder; categories are sorted, unseen values encode as all zeros
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: Vec<(String, Vec<String>)>,
    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        let mut categories = Vec::with_capacity(columns.len());

        for &name in columns {
            let column = df
                .column(name)
                .map_err(|_| PipelineError::FeatureNotFound(name.to_string()))?;
            let cast = column.cast(&DataType::String)?;
            let seen: BTreeSet<&str> = cast.str()?.into_iter().flatten().collect();
            categories.push((
                name.to_string(),
                seen.into_iter().map(str::to_string).collect(),
            ));
        }

        self.categories = categories;
        self.is_fitted = true;
        Ok(self)
    }

    pub fn categories(&self, column: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, cats)| cats.as_slice())
    }

    /// Output width
    pub fn n_outputs(&self) -> usize {
        self.categories.iter().map(|(_, cats)| cats.len()).sum()
    }

    /// `column_category` for every output, in output order
    pub fn feature_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .flat_map(|(name, cats)| cats.iter().map(move |cat| format!("{}_{}", name, cat)))
            .collect()
    }

    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }

        let mut out = Array2::zeros((df.height(), self.n_outputs()));
        let mut offset = 0;

        for (name, cats) in &self.categories {
            let column = df
                .column(name)
                .map_err(|_| PipelineError::FeatureNotFound(name.clone()))?;
            let cast = column.cast(&DataType::String)?;

            let mut unknown = 0usize;
            for (row, value) in cast.str()?.into_iter().enumerate() {
                match value.and_then(|v| cats.binary_search_by(|c| c.as_str().cmp(v)).ok()) {
                    Some(idx) => out[[row, offset + idx]] = 1.0,
                    None => unknown += 1,
                }
            }
            if unknown > 0 {
                warn!(
                    column = %name,
                    rows = unknown,
                    "unseen or missing categories encoded as zeros"
                );
            }
            offset += cats.len();
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sorted_categories_and_names() {
        let df = df!("lunch" => ["standard", "free/reduced", "standard"]).unwrap();
        let mut encoder = OneHotEncoder::new();
        encoder.fit(&df, &["lunch"]).unwrap();

        assert_eq!(
            encoder.feature_names(),
            vec!["lunch_free/reduced".to_string(), "lunch_standard".to_string()]
        );
        assert_eq!(
            encoder.transform(&df).unwrap(),
            array![[0.0, 1.0], [1.0, 0.0], [0.0, 1.0]]
        );
    }

    #[test]
    fn test_unknown_category_is_all_zeros() {
        let train = df!("g" => ["a", "b"], "h" => ["x", "y"]).unwrap();
        let test = df!("g" => ["c", "a"], "h" => ["y", "x"]).unwrap();

        let mut encoder = OneHotEncoder::new();
        encoder.fit(&train, &["g", "h"]).unwrap();
        let out = encoder.transform(&test).unwrap();

        assert_eq!(out, array![[0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 1.0, 0.0]]);
    }
}
