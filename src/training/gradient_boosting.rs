//! Gradient boosted regression trees (least-squares loss)

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTreeRegressor;
use super::models::{check_fit_input, check_n_features, Regressor};
use super::params::{
    optional_usize_param, positive_float_param, unknown_param, usize_param, ParamSet, ParamValue,
};
use crate::error::{PipelineError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Row subsample ratio for each tree
    pub subsample: f64,
    /// Column subsample ratio for each tree
    pub colsample_bytree: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: None,
        }
    }
}

/// Gradient Boosting Regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    pub config: GradientBoostingConfig,
    trees: Vec<DecisionTreeRegressor>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_prediction: f64,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_prediction: 0.0,
            n_features: 0,
            feature_importances: Vec::new(),
        }
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn sample_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        if ratio >= 1.0 {
            return indices;
        }
        let sample_size = ((n as f64) * ratio).ceil().max(1.0) as usize;
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
        indices
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let lr = self.config.learning_rate;

        self.trees.clear();
        self.col_indices_per_tree.clear();
        self.n_features = n_features;
        self.initial_prediction = y.mean().unwrap_or(0.0);
        self.feature_importances = vec![0.0; n_features];

        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        for _ in 0..self.config.n_estimators {
            // Negative gradient of squared loss
            let residuals = y - &predictions;

            let row_indices = Self::sample_indices(n_samples, self.config.subsample, &mut rng);
            let col_indices =
                Self::sample_indices(n_features, self.config.colsample_bytree, &mut rng);
            let x_cols = if col_indices.len() < n_features {
                Some(x.select(Axis(1), &col_indices))
            } else {
                None
            };
            let x_tree = x_cols.as_ref().unwrap_or(x);

            let mut tree = DecisionTreeRegressor::new()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf)
                .with_random_state(rng.gen());
            tree.fit_indices(x_tree, &residuals, &row_indices)?;

            let update = tree.predict(x_tree)?;
            predictions.scaled_add(lr, &update);

            if let Some(importance) = tree.feature_importances() {
                for (j, &col_idx) in col_indices.iter().enumerate() {
                    self.feature_importances[col_idx] += importance[j];
                }
            }

            self.trees.push(tree);
            self.col_indices_per_tree.push(col_indices);
        }

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            self.feature_importances.iter_mut().for_each(|imp| *imp /= total);
        }

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() && self.n_features == 0 {
            return Err(PipelineError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for (tree, col_indices) in self.trees.iter().zip(self.col_indices_per_tree.iter()) {
            let tree_pred = if col_indices.len() < self.n_features {
                tree.predict(&x.select(Axis(1), col_indices))?
            } else {
                tree.predict(x)?
            };
            predictions.scaled_add(self.config.learning_rate, &tree_pred);
        }

        Ok(predictions)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => self.config.n_estimators = usize_param(name, value)?,
                "learning_rate" => self.config.learning_rate = positive_float_param(name, value)?,
                "max_depth" => self.config.max_depth = usize_param(name, value)?.max(1),
                "min_samples_leaf" => {
                    self.config.min_samples_leaf = usize_param(name, value)?.max(1)
                }
                "subsample" | "colsample_bytree" => {
                    let ratio = positive_float_param(name, value)?;
                    if ratio > 1.0 {
                        return Err(PipelineError::invalid_param(
                            name.as_str(),
                            value,
                            "must be in (0, 1]",
                        ));
                    }
                    if name == "subsample" {
                        self.config.subsample = ratio;
                    } else {
                        self.config.colsample_bytree = ratio;
                    }
                }
                "random_state" => {
                    self.config.random_state = optional_usize_param(name, value)?.map(|s| s as u64)
                }
                _ => return Err(unknown_param("GradientBoostingRegressor", name, value)),
            }
        }
        Ok(())
    }

    fn get_params(&self) -> ParamSet {
        let c = &self.config;
        let mut params = ParamSet::new();
        params.insert("n_estimators".to_string(), ParamValue::from(c.n_estimators));
        params.insert("learning_rate".to_string(), ParamValue::Float(c.learning_rate));
        params.insert("max_depth".to_string(), ParamValue::from(c.max_depth));
        params.insert("min_samples_leaf".to_string(), ParamValue::from(c.min_samples_leaf));
        params.insert("subsample".to_string(), ParamValue::Float(c.subsample));
        params.insert("colsample_bytree".to_string(), ParamValue::Float(c.colsample_bytree));
        params.insert(
            "random_state".to_string(),
            ParamValue::from(c.random_state.map(|s| s as i64)),
        );
        params
    }

    fn is_fitted(&self) -> bool {
        self.n_features > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((80, 3), |(i, j)| ((i * 7 + j * 13) % 23) as f64);
        let y = x.column(0).mapv(|v| v * v * 0.1) + &x.column(1).mapv(|v| 2.0 * v);
        (x, y)
    }

    #[test]
    fn test_gradient_boosting_fits() {
        let (x, y) = make_data();
        let mut gb = GradientBoostingRegressor::new(GradientBoostingConfig {
            n_estimators: 50,
            random_state: Some(42),
            ..Default::default()
        });
        gb.fit(&x, &y).unwrap();

        assert_eq!(gb.n_trees(), 50);
        let r2 = gb.score(&x, &y).unwrap();
        assert!(r2 > 0.9, "R² = {}", r2);
    }

    #[test]
    fn test_subsampled_fit_is_seeded() {
        let (x, y) = make_data();
        let config = GradientBoostingConfig {
            n_estimators: 20,
            subsample: 0.7,
            colsample_bytree: 0.67,
            random_state: Some(5),
            ..Default::default()
        };
        let mut a = GradientBoostingRegressor::new(config.clone());
        let mut b = GradientBoostingRegressor::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_zero_rounds_predicts_mean() {
        let (x, y) = make_data();
        let mut gb = GradientBoostingRegressor::new(GradientBoostingConfig {
            n_estimators: 0,
            ..Default::default()
        });
        gb.fit(&x, &y).unwrap();
        let mean = y.mean().unwrap();
        assert!(gb.predict(&x).unwrap().iter().all(|p| *p == mean));
    }

    #[test]
    fn test_set_params() {
        let mut gb = GradientBoostingRegressor::default();
        let mut params = ParamSet::new();
        params.insert("learning_rate".to_string(), ParamValue::Float(0.05));
        params.insert("subsample".to_string(), ParamValue::Float(0.8));
        gb.set_params(&params).unwrap();
        assert_eq!(gb.config.learning_rate, 0.05);
        assert_eq!(gb.config.subsample, 0.8);

        params.insert("subsample".to_string(), ParamValue::Float(1.5));
        assert!(gb.set_params(&params).is_err());
    }
}
