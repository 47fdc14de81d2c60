//! Regressor capability and evaluation metrics

use super::params::ParamSet;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capability shared by every estimator the selector can tune
pub trait Regressor {
    /// Fit on a feature matrix and aligned targets, replacing any previous fit
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict one value per row
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Apply hyperparameters by name; unknown names or bad values are rejected
    fn set_params(&mut self, params: &ParamSet) -> Result<()>;

    /// Current hyperparameters
    fn get_params(&self) -> ParamSet;

    fn is_fitted(&self) -> bool;

    /// R² of the predictions on `x` against `y`
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let y_pred = self.predict(x)?;
        Ok(r2_score(y, &y_pred))
    }
}

/// Coefficient of determination
///
/// When the targets are constant the score is 1.0 for an exact prediction and 0.0 otherwise.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len();
    if n == 0 {
        return 0.0;
    }

    let y_mean = y_true.sum() / n as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Regression metrics for a set of predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// R-squared
    pub r2: f64,
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Compute regression metrics
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let n = y_true.len().max(1) as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae: f64 = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2: r2_score(y_true, y_pred),
            n_samples: y_true.len(),
        }
    }

    /// Flatten into a name to value map for artifact metadata
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("mse".to_string(), self.mse);
        map.insert("rmse".to_string(), self.rmse);
        map.insert("mae".to_string(), self.mae);
        map.insert("r2".to_string(), self.r2);
        map
    }
}

/// Reject empty inputs and targets that do not line up with the rows
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(PipelineError::TrainingError(
            "cannot fit on an empty dataset".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_n_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(PipelineError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_r2_perfect_and_mean() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        assert_eq!(r2_score(&y, &y), 1.0);

        let mean = Array1::from_elem(4, 2.5);
        assert!(r2_score(&y, &mean).abs() < 1e-12);
    }

    #[test]
    fn test_r2_negative_for_worse_than_mean() {
        let y = array![1.0, 2.0, 3.0];
        let bad = array![3.0, 2.0, 1.0];
        assert!(r2_score(&y, &bad) < 0.0);
    }

    #[test]
    fn test_r2_constant_target() {
        let y = array![5.0, 5.0, 5.0];
        assert_eq!(r2_score(&y, &y), 1.0);
        assert_eq!(r2_score(&y, &array![5.0, 5.0, 4.0]), 0.0);
    }

    #[test]
    fn test_compute_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0];
        let y_pred = array![1.5, 2.0, 2.5, 4.0];
        let metrics = ModelMetrics::compute(&y_true, &y_pred);

        assert!((metrics.mse - 0.125).abs() < 1e-12);
        assert!((metrics.mae - 0.25).abs() < 1e-12);
        assert!((metrics.rmse - 0.125f64.sqrt()).abs() < 1e-12);
        assert!(metrics.r2 > 0.8);
        assert_eq!(metrics.to_map().len(), 4);
    }

    #[test]
    fn test_fit_input_checks() {
        let x = Array2::<f64>::zeros((3, 2));
        assert!(check_fit_input(&x, &array![1.0, 2.0]).is_err());
        assert!(check_fit_input(&x, &array![1.0, 2.0, 3.0]).is_ok());
        assert!(check_n_features(3, &x).is_err());
    }
}
