//! Candidate catalog: the closed set of estimators and their search spaces

use super::baseline::MeanRegressor;
use super::decision_tree::DecisionTreeRegressor;
use super::gradient_boosting::GradientBoostingRegressor;
use super::knn::KNNRegressor;
use super::linear_models::{LassoRegression, LinearRegression, RidgeRegression};
use super::models::Regressor;
use super::params::{ParamGrid, ParamSet};
use super::random_forest::RandomForestRegressor;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Supported model kinds, in default catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    RandomForest,
    DecisionTree,
    GradientBoosting,
    LinearRegression,
    Ridge,
    Lasso,
    KNeighbors,
    Mean,
}

impl ModelKind {
    /// Kinds in the default catalog
    pub const DEFAULT_CATALOG: [ModelKind; 7] = [
        ModelKind::RandomForest,
        ModelKind::DecisionTree,
        ModelKind::GradientBoosting,
        ModelKind::LinearRegression,
        ModelKind::Ridge,
        ModelKind::Lasso,
        ModelKind::KNeighbors,
    ];

    /// Catalog identifier
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::RandomForest => "Random Forest",
            ModelKind::DecisionTree => "Decision Tree",
            ModelKind::GradientBoosting => "Gradient Boosting",
            ModelKind::LinearRegression => "Linear Regression",
            ModelKind::Ridge => "Ridge",
            ModelKind::Lasso => "Lasso",
            ModelKind::KNeighbors => "K-Neighbors Regressor",
            ModelKind::Mean => "Mean Baseline",
        }
    }

    /// Short machine name used on the command line and in config files
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::RandomForest => "random_forest",
            ModelKind::DecisionTree => "decision_tree",
            ModelKind::GradientBoosting => "gradient_boosting",
            ModelKind::LinearRegression => "linear_regression",
            ModelKind::Ridge => "ridge",
            ModelKind::Lasso => "lasso",
            ModelKind::KNeighbors => "k_neighbors",
            ModelKind::Mean => "mean",
        }
    }

    /// Hyperparameter grid searched by default
    pub fn default_grid(&self) -> ParamGrid {
        match self {
            ModelKind::DecisionTree => ParamGrid::new().with(
                "criterion",
                ["squared_error", "friedman_mse", "absolute_error"],
            ),
            ModelKind::RandomForest => ParamGrid::new().with("n_estimators", [8, 16, 32, 64, 128]),
            ModelKind::GradientBoosting => ParamGrid::new()
                .with("learning_rate", [0.1, 0.05, 0.01])
                .with("subsample", [0.7, 0.8, 0.9])
                .with("n_estimators", [32, 64, 128]),
            ModelKind::LinearRegression | ModelKind::Mean => ParamGrid::new(),
            ModelKind::Ridge => ParamGrid::new().with("alpha", [0.1, 1.0, 10.0]),
            ModelKind::Lasso => ParamGrid::new().with("alpha", [0.001, 0.01, 0.1, 1.0]),
            ModelKind::KNeighbors => ParamGrid::new()
                .with("n_neighbors", [3, 5, 7, 9])
                .with("weights", ["uniform", "distance"]),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "random_forest" | "rf" => Ok(ModelKind::RandomForest),
            "decision_tree" | "dt" => Ok(ModelKind::DecisionTree),
            "gradient_boosting" | "gb" => Ok(ModelKind::GradientBoosting),
            "linear_regression" | "linear" => Ok(ModelKind::LinearRegression),
            "ridge" => Ok(ModelKind::Ridge),
            "lasso" => Ok(ModelKind::Lasso),
            "k_neighbors" | "k_neighbors_regressor" | "knn" => Ok(ModelKind::KNeighbors),
            "mean" | "mean_baseline" => Ok(ModelKind::Mean),
            _ => Err(PipelineError::ConfigError(format!("Unknown model kind: {}", s))),
        }
    }
}

/// A configured estimator and its fitted state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Estimator {
    RandomForest(RandomForestRegressor),
    DecisionTree(DecisionTreeRegressor),
    GradientBoosting(GradientBoostingRegressor),
    LinearRegression(LinearRegression),
    Ridge(RidgeRegression),
    Lasso(LassoRegression),
    KNeighbors(KNNRegressor),
    Mean(MeanRegressor),
}

macro_rules! dispatch {
    ($self:expr, $model:ident => $body:expr) => {
        match $self {
            Estimator::RandomForest($model) => $body,
            Estimator::DecisionTree($model) => $body,
            Estimator::GradientBoosting($model) => $body,
            Estimator::LinearRegression($model) => $body,
            Estimator::Ridge($model) => $body,
            Estimator::Lasso($model) => $body,
            Estimator::KNeighbors($model) => $body,
            Estimator::Mean($model) => $body,
        }
    };
}

impl Estimator {
    /// Unfitted estimator with default hyperparameters; seeded kinds take `random_state`
    pub fn new(kind: ModelKind, random_state: Option<u64>) -> Self {
        match kind {
            ModelKind::RandomForest => {
                let mut rf = RandomForestRegressor::default();
                rf.random_state = random_state;
                Estimator::RandomForest(rf)
            }
            ModelKind::DecisionTree => {
                let mut dt = DecisionTreeRegressor::new();
                dt.random_state = random_state;
                Estimator::DecisionTree(dt)
            }
            ModelKind::GradientBoosting => {
                let mut gb = GradientBoostingRegressor::default();
                gb.config.random_state = random_state;
                Estimator::GradientBoosting(gb)
            }
            ModelKind::LinearRegression => Estimator::LinearRegression(LinearRegression::new()),
            ModelKind::Ridge => Estimator::Ridge(RidgeRegression::default()),
            ModelKind::Lasso => Estimator::Lasso(LassoRegression::default()),
            ModelKind::KNeighbors => Estimator::KNeighbors(KNNRegressor::default()),
            ModelKind::Mean => Estimator::Mean(MeanRegressor::new()),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Estimator::RandomForest(_) => ModelKind::RandomForest,
            Estimator::DecisionTree(_) => ModelKind::DecisionTree,
            Estimator::GradientBoosting(_) => ModelKind::GradientBoosting,
            Estimator::LinearRegression(_) => ModelKind::LinearRegression,
            Estimator::Ridge(_) => ModelKind::Ridge,
            Estimator::Lasso(_) => ModelKind::Lasso,
            Estimator::KNeighbors(_) => ModelKind::KNeighbors,
            Estimator::Mean(_) => ModelKind::Mean,
        }
    }
}

impl Regressor for Estimator {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        dispatch!(self, m => m.fit(x, y))
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        dispatch!(self, m => m.predict(x))
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        dispatch!(self, m => m.set_params(params))
    }

    fn get_params(&self) -> ParamSet {
        dispatch!(self, m => m.get_params())
    }

    fn is_fitted(&self) -> bool {
        dispatch!(self, m => m.is_fitted())
    }
}

/// Named estimator in a catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub estimator: Estimator,
}

/// Ordered, uniquely named set of candidate estimators
///
/// Iteration order is insertion order and decides ties during selection.
#[derive(Debug, Clone, Default)]
pub struct CandidateCatalog {
    candidates: Vec<Candidate>,
}

impl CandidateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default catalog of every supported regressor except the baseline
    pub fn default_regressors(random_state: Option<u64>) -> Self {
        Self::from_kinds(&ModelKind::DEFAULT_CATALOG, random_state)
    }

    pub fn from_kinds(kinds: &[ModelKind], random_state: Option<u64>) -> Self {
        let mut catalog = Self::new();
        for kind in kinds {
            if catalog.get(kind.display_name()).is_none() {
                catalog.candidates.push(Candidate {
                    name: kind.display_name().to_string(),
                    estimator: Estimator::new(*kind, random_state),
                });
            }
        }
        catalog
    }

    /// Builder-style insert; duplicate names are caught by `validate`
    pub fn with(mut self, name: &str, estimator: Estimator) -> Self {
        self.candidates.push(Candidate {
            name: name.to_string(),
            estimator,
        });
        self
    }

    /// Insert a candidate, rejecting duplicate names
    pub fn insert(&mut self, name: &str, estimator: Estimator) -> Result<()> {
        if self.get(name).is_some() {
            return Err(PipelineError::ConfigError(format!(
                "Duplicate candidate name: {}",
                name
            )));
        }
        self.candidates.push(Candidate {
            name: name.to_string(),
            estimator,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(|c| c.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Estimator> {
        self.candidates
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.estimator)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Candidate> {
        self.candidates.iter_mut()
    }

    /// Non-empty with unique names
    pub fn validate(&self) -> Result<()> {
        if self.candidates.is_empty() {
            return Err(PipelineError::ConfigError(
                "Candidate catalog is empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for name in self.names() {
            if !seen.insert(name) {
                return Err(PipelineError::ConfigError(format!(
                    "Duplicate candidate name: {}",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Hyperparameter grid per candidate name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpaces {
    grids: BTreeMap<String, ParamGrid>,
}

impl SearchSpaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default grid for every candidate of a catalog, keyed by candidate name
    pub fn defaults_for(catalog: &CandidateCatalog) -> Self {
        let grids = catalog
            .iter()
            .map(|c| (c.name.clone(), c.estimator.kind().default_grid()))
            .collect();
        Self { grids }
    }

    pub fn with(mut self, name: &str, grid: ParamGrid) -> Self {
        self.grids.insert(name.to_string(), grid);
        self
    }

    pub fn insert(&mut self, name: &str, grid: ParamGrid) {
        self.grids.insert(name.to_string(), grid);
    }

    pub fn get(&self, name: &str) -> Option<&ParamGrid> {
        self.grids.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.grids.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// Names present in the catalog with no grid entry
    pub fn missing_for(&self, catalog: &CandidateCatalog) -> Vec<String> {
        catalog
            .names()
            .filter(|name| !self.grids.contains_key(*name))
            .map(str::to_string)
            .collect()
    }

    /// Grid entries with no matching candidate
    pub fn unused_by(&self, catalog: &CandidateCatalog) -> Vec<String> {
        self.names()
            .filter(|name| catalog.get(name).is_none())
            .map(str::to_string)
            .collect()
    }
}
