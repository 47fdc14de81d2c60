//! Constant-prediction baseline

use super::models::{check_fit_input, check_n_features, Regressor};
use super::params::{unknown_param, ParamSet};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Predicts the training-target mean for every row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanRegressor {
    mean: Option<f64>,
    n_features: usize,
}

impl MeanRegressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(&self) -> Option<f64> {
        self.mean
    }
}

impl Regressor for MeanRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.mean = y.mean();
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mean = self.mean.ok_or(PipelineError::ModelNotFitted)?;
        check_n_features(self.n_features, x)?;
        Ok(Array1::from_elem(x.nrows(), mean))
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        match params.iter().next() {
            Some((name, value)) => Err(unknown_param("MeanRegressor", name, value)),
            None => Ok(()),
        }
    }

    fn get_params(&self) -> ParamSet {
        ParamSet::new()
    }

    fn is_fitted(&self) -> bool {
        self.mean.is_some()
    }
}
