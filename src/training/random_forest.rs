//! Random forest regressor

use super::decision_tree::{DecisionTreeRegressor, MaxFeatures};
use super::models::{check_fit_input, check_n_features, Regressor};
use super::params::{
    bool_param, optional_usize_param, unknown_param, usize_param, ParamSet, ParamValue,
};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Bagged ensemble of regression trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<DecisionTreeRegressor>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,
    pub random_state: Option<u64>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            random_state: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Get feature importances averaged over trees
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn compute_feature_importances(&mut self) {
        let mut total = Array1::<f64>::zeros(self.n_features);
        for imp in self.trees.iter().filter_map(|t| t.feature_importances()) {
            total += imp;
        }
        let sum = total.sum();
        if sum > 0.0 {
            total /= sum;
        }
        self.feature_importances = Some(total);
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.n_estimators == 0 {
            return Err(PipelineError::invalid_param("n_estimators", 0, "must be positive"));
        }

        let n_samples = x.nrows();
        self.n_features = x.ncols();

        let base_seed = match self.random_state {
            Some(seed) => seed,
            None => rand::thread_rng().gen(),
        };

        let mut template = DecisionTreeRegressor::new();
        template.max_depth = self.max_depth;
        template.min_samples_split = self.min_samples_split;
        template.min_samples_leaf = self.min_samples_leaf;
        template.max_features = self.max_features;
        let bootstrap = self.bootstrap;

        let trees: Result<Vec<DecisionTreeRegressor>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let mut tree = template.clone().with_random_state(rng.gen());
                tree.fit_indices(x, y, &sample_indices)?;
                Ok(tree)
            })
            .collect();

        self.trees = trees?;
        self.compute_feature_importances();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let per_tree: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<_>>()?;

        let mut sum = Array1::<f64>::zeros(x.nrows());
        for preds in &per_tree {
            sum += preds;
        }
        Ok(sum / self.trees.len() as f64)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => {
                    let n = usize_param(name, value)?;
                    if n == 0 {
                        return Err(PipelineError::invalid_param(
                            name.as_str(),
                            value,
                            "must be positive",
                        ));
                    }
                    self.n_estimators = n;
                }
                "max_depth" => self.max_depth = optional_usize_param(name, value)?,
                "min_samples_split" => self.min_samples_split = usize_param(name, value)?.max(2),
                "min_samples_leaf" => self.min_samples_leaf = usize_param(name, value)?.max(1),
                "max_features" => self.max_features = MaxFeatures::from_param(name, value)?,
                "bootstrap" => self.bootstrap = bool_param(name, value)?,
                "random_state" => {
                    self.random_state = optional_usize_param(name, value)?.map(|s| s as u64)
                }
                _ => return Err(unknown_param("RandomForestRegressor", name, value)),
            }
        }
        Ok(())
    }

    fn get_params(&self) -> ParamSet {
        let mut params = ParamSet::new();
        params.insert("n_estimators".to_string(), ParamValue::from(self.n_estimators));
        params.insert("max_depth".to_string(), ParamValue::from(self.max_depth));
        params.insert("min_samples_split".to_string(), ParamValue::from(self.min_samples_split));
        params.insert("min_samples_leaf".to_string(), ParamValue::from(self.min_samples_leaf));
        params.insert("max_features".to_string(), self.max_features.to_param());
        params.insert("bootstrap".to_string(), ParamValue::Bool(self.bootstrap));
        params.insert(
            "random_state".to_string(),
            ParamValue::from(self.random_state.map(|s| s as i64)),
        );
        params
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}
