//! CART regression tree

use super::models::{check_fit_input, check_n_features, Regressor};
use super::params::{
    optional_usize_param, str_param, unknown_param, usize_param, ParamSet, ParamValue,
};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Below this many (sample, feature) pairs a node is scanned sequentially.
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// Decision tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// Split quality criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    /// Variance reduction, leaves predict the mean
    SquaredError,
    /// Friedman's improvement score, leaves predict the mean
    FriedmanMse,
    /// Leaves predict the median; splits are ranked by variance reduction
    AbsoluteError,
}

impl Criterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::SquaredError => "squared_error",
            Criterion::FriedmanMse => "friedman_mse",
            Criterion::AbsoluteError => "absolute_error",
        }
    }

    fn from_param(name: &str, value: &ParamValue) -> Result<Self> {
        match str_param(name, value)? {
            "squared_error" => Ok(Criterion::SquaredError),
            "friedman_mse" => Ok(Criterion::FriedmanMse),
            "absolute_error" => Ok(Criterion::AbsoluteError),
            _ => Err(PipelineError::invalid_param(
                name,
                value,
                "expected squared_error, friedman_mse or absolute_error",
            )),
        }
    }
}

/// Number of features considered at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    All,
    Sqrt,
    Log2,
    Fraction(f64),
    Count(usize),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).floor() as usize,
            MaxFeatures::Count(c) => *c,
        };
        k.clamp(1, n_features.max(1))
    }

    pub(crate) fn from_param(name: &str, value: &ParamValue) -> Result<Self> {
        match value {
            ParamValue::Null => Ok(MaxFeatures::All),
            ParamValue::String(s) => match s.as_str() {
                "all" => Ok(MaxFeatures::All),
                "sqrt" => Ok(MaxFeatures::Sqrt),
                "log2" => Ok(MaxFeatures::Log2),
                _ => Err(PipelineError::invalid_param(name, value, "expected sqrt, log2 or all")),
            },
            ParamValue::Int(_) => usize_param(name, value).map(MaxFeatures::Count),
            ParamValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
            _ => Err(PipelineError::invalid_param(
                name,
                value,
                "expected a name, a count or a fraction in (0, 1]",
            )),
        }
    }

    pub(crate) fn to_param(self) -> ParamValue {
        match self {
            MaxFeatures::All => ParamValue::from("all"),
            MaxFeatures::Sqrt => ParamValue::from("sqrt"),
            MaxFeatures::Log2 => ParamValue::from("log2"),
            MaxFeatures::Fraction(f) => ParamValue::Float(f),
            MaxFeatures::Count(c) => ParamValue::from(c),
        }
    }
}

/// Best split found on one feature: (feature, threshold, sse decrease, score used for ranking)
type SplitCandidate = (usize, f64, f64, f64);

/// Decision tree regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub criterion: Criterion,
    /// Seed for per-node feature sampling
    pub random_state: Option<u64>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTreeRegressor {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            criterion: Criterion::SquaredError,
            random_state: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit on the rows listed in `indices` (bootstrap samples may repeat rows).
    pub(crate) fn fit_indices(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
    ) -> Result<()> {
        check_fit_input(x, y)?;
        if indices.is_empty() {
            return Err(PipelineError::TrainingError(
                "decision tree needs at least one sample".to_string(),
            ));
        }

        let n_features = x.ncols();
        self.n_features = n_features;

        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::seed_from_u64(rand::thread_rng().gen()),
        };

        let mut importances = vec![0.0; n_features];
        let root = self.build_tree(x, y, indices.to_vec(), 0, &mut importances, &mut rng);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|imp| *imp /= total);
        }

        self.root = Some(root);
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(())
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: Vec<usize>,
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let leaf = |indices: &[usize]| TreeNode::Leaf {
            value: self.leaf_value(y, indices),
            n_samples: indices.len(),
        };

        let first = y[indices[0]];
        let is_pure = indices.iter().all(|&i| y[i] == first);

        if is_pure
            || n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
        {
            return leaf(&indices);
        }

        let n_features = x.ncols();
        let k = self.max_features.resolve(n_features);
        let features: Vec<usize> = if k >= n_features {
            (0..n_features).collect()
        } else {
            let mut chosen = sample(rng, n_features, k).into_vec();
            chosen.sort_unstable();
            chosen
        };

        let Some((feature_idx, threshold, sse_decrease, _)) =
            self.find_best_split(x, y, &indices, &features)
        else {
            return leaf(&indices);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature_idx]] <= threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return leaf(&indices);
        }

        importances[feature_idx] += sse_decrease;
        let impurity = node_sse(y, &indices) / n_samples as f64;

        let left = Box::new(self.build_tree(x, y, left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        features: &[usize],
    ) -> Option<SplitCandidate> {
        let scan = |&feature_idx: &usize| self.best_split_on_feature(x, y, indices, feature_idx);

        let per_feature: Vec<Option<SplitCandidate>> =
            if indices.len() * features.len() >= PARALLEL_SCAN_THRESHOLD {
                features.par_iter().map(scan).collect()
            } else {
                features.iter().map(scan).collect()
            };

        // First feature wins ties so fits are reproducible
        per_feature
            .into_iter()
            .flatten()
            .fold(None, |best: Option<SplitCandidate>, cand| match best {
                Some(b) if b.3 >= cand.3 => Some(b),
                _ => Some(cand),
            })
    }

    /// Sorted sweep over one feature using running sums
    fn best_split_on_feature(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        feature_idx: usize,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let mut pairs: Vec<(f64, f64)> = indices
            .iter()
            .map(|&i| (x[[i, feature_idx]], y[i]))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total_sum: f64 = pairs.iter().map(|p| p.1).sum();
        let total_sq: f64 = pairs.iter().map(|p| p.1 * p.1).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        let mut best: Option<SplitCandidate> = None;

        for i in 0..n - 1 {
            left_sum += pairs[i].1;
            left_sq += pairs[i].1 * pairs[i].1;

            if pairs[i].0 == pairs[i + 1].0 {
                continue;
            }
            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let left_sse = left_sq - left_sum * left_sum / n_left as f64;
            let right_sse = right_sq - right_sum * right_sum / n_right as f64;
            let sse_decrease = parent_sse - left_sse - right_sse;

            let score = match self.criterion {
                Criterion::FriedmanMse => {
                    let diff = left_sum / n_left as f64 - right_sum / n_right as f64;
                    (n_left * n_right) as f64 / n as f64 * diff * diff
                }
                Criterion::SquaredError | Criterion::AbsoluteError => sse_decrease,
            };

            if score > 1e-12 && best.map_or(true, |b| score > b.3) {
                let mut threshold = (pairs[i].0 + pairs[i + 1].0) / 2.0;
                if threshold >= pairs[i + 1].0 {
                    threshold = pairs[i].0;
                }
                best = Some((feature_idx, threshold, sse_decrease.max(0.0), score));
            }
        }

        best
    }

    fn leaf_value(&self, y: &Array1<f64>, indices: &[usize]) -> f64 {
        match self.criterion {
            Criterion::AbsoluteError => {
                let mut values: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
                median(&mut values)
            }
            _ => indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64,
        }
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }
}

impl Regressor for DecisionTreeRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.fit_indices(x, y, &indices)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        check_n_features(self.n_features, x)?;
        Ok(x.rows().into_iter().map(|row| root.predict_row(row)).collect())
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params {
            match name.as_str() {
                "criterion" => self.criterion = Criterion::from_param(name, value)?,
                "max_depth" => self.max_depth = optional_usize_param(name, value)?,
                "min_samples_split" => {
                    let v = usize_param(name, value)?;
                    if v < 2 {
                        return Err(PipelineError::invalid_param(
                            name.as_str(),
                            value,
                            "must be at least 2",
                        ));
                    }
                    self.min_samples_split = v;
                }
                "min_samples_leaf" => self.min_samples_leaf = usize_param(name, value)?.max(1),
                "max_features" => self.max_features = MaxFeatures::from_param(name, value)?,
                "random_state" => {
                    self.random_state = optional_usize_param(name, value)?.map(|s| s as u64)
                }
                _ => return Err(unknown_param("DecisionTreeRegressor", name, value)),
            }
        }
        Ok(())
    }

    fn get_params(&self) -> ParamSet {
        let mut params = ParamSet::new();
        params.insert("criterion".to_string(), ParamValue::from(self.criterion.as_str()));
        params.insert("max_depth".to_string(), ParamValue::from(self.max_depth));
        params.insert("min_samples_split".to_string(), ParamValue::from(self.min_samples_split));
        params.insert("min_samples_leaf".to_string(), ParamValue::from(self.min_samples_leaf));
        params.insert("max_features".to_string(), self.max_features.to_param());
        params.insert(
            "random_state".to_string(),
            ParamValue::from(self.random_state.map(|s| s as i64)),
        );
        params
    }

    fn is_fitted(&self) -> bool {
        self.root.is_some()
    }
}

fn node_sse(y: &Array1<f64>, indices: &[usize]) -> f64 {
    let n = indices.len() as f64;
    let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n;
    indices.iter().map(|&i| (y[i] - mean).powi(2)).sum()
}

pub(crate) fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
