//! Exhaustive cross-validated hyperparameter search

use super::catalog::Estimator;
use super::cross_validation::{CVResults, CVSplit, CrossValidator};
use super::models::{r2_score, Regressor};
use super::params::{format_params, ParamGrid, ParamSet};
use crate::error::Result;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of a grid search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSearchResult {
    /// Parameters of the best combination; empty when the grid was empty
    pub best_params: ParamSet,
    /// Mean CV R² of the best combination; `None` when nothing was searched
    pub best_score: Option<f64>,
    /// Every combination with its fold scores, in enumeration order
    pub results: Vec<(ParamSet, CVResults)>,
}

impl GridSearchResult {
    fn skipped() -> Self {
        Self {
            best_params: ParamSet::new(),
            best_score: None,
            results: Vec::new(),
        }
    }
}

/// Grid search over one estimator, ranking combinations by mean fold R²
#[derive(Debug, Clone)]
pub struct GridSearchCV {
    cv: CrossValidator,
    parallel: bool,
}

impl Default for GridSearchCV {
    fn default() -> Self {
        Self::new(CrossValidator::default())
    }
}

impl GridSearchCV {
    pub fn new(cv: CrossValidator) -> Self {
        Self { cv, parallel: true }
    }

    /// Evaluate combinations on the rayon pool (default) or one at a time
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Search `grid` for `estimator` on `(x, y)`; the estimator itself is left untouched.
    ///
    /// The best combination is the first, in enumeration order, with the highest mean score.
    pub fn fit(
        &self,
        estimator: &Estimator,
        grid: &ParamGrid,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<GridSearchResult> {
        if grid.is_empty() {
            return Ok(GridSearchResult::skipped());
        }

        let combinations = grid.combinations()?;
        let splits = self.cv.split(x.nrows())?;

        debug!(
            n_combinations = combinations.len(),
            n_folds = splits.len(),
            "grid search started"
        );

        let evaluate = |params: &ParamSet| -> Result<CVResults> {
            evaluate_combination(estimator, params, &splits, x, y)
        };

        let scored: Vec<Result<CVResults>> = if self.parallel {
            combinations.par_iter().map(evaluate).collect()
        } else {
            combinations.iter().map(evaluate).collect()
        };

        let mut results = Vec::with_capacity(combinations.len());
        for (params, cv_result) in combinations.into_iter().zip(scored) {
            results.push((params, cv_result?));
        }

        let mut best: Option<(usize, f64)> = None;
        for (idx, (_, cv_result)) in results.iter().enumerate() {
            let score = cv_result.mean_score;
            if score.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((idx, score));
            }
        }

        let Some((best_idx, best_score)) = best else {
            // Every combination scored NaN; fall back to the first one
            return Ok(GridSearchResult {
                best_params: results[0].0.clone(),
                best_score: Some(f64::NAN),
                results,
            });
        };

        debug!(
            best_params = %format_params(&results[best_idx].0),
            best_score,
            "grid search finished"
        );

        Ok(GridSearchResult {
            best_params: results[best_idx].0.clone(),
            best_score: Some(best_score),
            results,
        })
    }
}

fn evaluate_combination(
    estimator: &Estimator,
    params: &ParamSet,
    splits: &[CVSplit],
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<CVResults> {
    let mut scores = Vec::with_capacity(splits.len());

    for split in splits {
        let mut model = estimator.clone();
        model.set_params(params)?;

        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_val = x.select(Axis(0), &split.test_indices);
        let y_val = y.select(Axis(0), &split.test_indices);

        model.fit(&x_train, &y_train)?;
        let y_pred = model.predict(&x_val)?;
        scores.push(r2_score(&y_val, &y_pred));
    }

    Ok(CVResults::from_scores(scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::training::catalog::ModelKind;
    use crate::training::params::ParamValue;

    fn linear_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| ((i * 3 + j * 5) % 11) as f64 + i as f64);
        let y = x.column(0).mapv(|v| 2.0 * v) + &x.column(1).mapv(|v| -v + 1.0);
        (x, y)
    }

    #[test]
    fn test_empty_grid_is_noop() {
        let (x, y) = linear_data();
        let estimator = Estimator::new(ModelKind::LinearRegression, None);
        let result = GridSearchCV::default().fit(&estimator, &ParamGrid::new(), &x, &y).unwrap();

        assert!(result.best_params.is_empty());
        assert!(result.best_score.is_none());
        assert!(result.results.is_empty());
        assert!(!estimator.is_fitted());
    }

    #[test]
    fn test_prefers_small_ridge_penalty_on_clean_data() {
        let (x, y) = linear_data();
        let estimator = Estimator::new(ModelKind::Ridge, None);
        let grid = ParamGrid::new().with("alpha", [1000.0, 0.001]);

        let result = GridSearchCV::default().fit(&estimator, &grid, &x, &y).unwrap();
        assert_eq!(result.best_params["alpha"], ParamValue::Float(0.001));
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].1.n_folds, 3);
    }

    #[test]
    fn test_ties_resolve_to_first_combination() {
        let (x, y) = linear_data();
        let estimator = Estimator::new(ModelKind::LinearRegression, None);
        // Both combinations fit identically
        let grid = ParamGrid::new().with("fit_intercept", [true, true]);

        let result = GridSearchCV::default().fit(&estimator, &grid, &x, &y).unwrap();
        assert_eq!(result.results[0].1.mean_score, result.results[1].1.mean_score);
        assert_eq!(result.best_score, Some(result.results[0].1.mean_score));
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let (x, y) = linear_data();
        let estimator = Estimator::new(ModelKind::KNeighbors, None);
        let grid = ParamGrid::new().with("n_neighbors", [1, 3, 5]);

        let par = GridSearchCV::default().fit(&estimator, &grid, &x, &y).unwrap();
        let seq = GridSearchCV::default()
            .with_parallel(false)
            .fit(&estimator, &grid, &x, &y)
            .unwrap();
        assert_eq!(par, seq);
    }

    #[test]
    fn test_bad_parameter_propagates() {
        let (x, y) = linear_data();
        let estimator = Estimator::new(ModelKind::Ridge, None);
        let grid = ParamGrid::new().with("n_neighbors", [3]);

        let err = GridSearchCV::default().fit(&estimator, &grid, &x, &y).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { .. }));
    }
}
