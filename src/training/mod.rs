//! Model training and selection
//!
//! Provides the regressors a selection run can choose from:
//! - Decision trees, Random Forests and gradient boosting
//! - Linear models (OLS, Ridge, Lasso)
//! - K-Nearest Neighbors
//! - A constant mean baseline
//!
//! and the machinery that picks between them: hyperparameter grids ([`ParamGrid`]),
//! cross-validated grid search ([`GridSearchCV`]) and the [`ModelSelector`], which tunes every
//! candidate of a [`CandidateCatalog`] and keeps the one with the best held-out R².

mod baseline;
mod catalog;
mod grid_search;
mod models;
mod params;
mod selector;
mod trainer;
pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod knn;
pub mod linear_models;
pub mod random_forest;

pub use baseline::MeanRegressor;
pub use catalog::{Candidate, CandidateCatalog, Estimator, ModelKind, SearchSpaces};
pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::{Criterion, DecisionTreeRegressor, MaxFeatures, TreeNode};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
pub use grid_search::{GridSearchCV, GridSearchResult};
pub use knn::{DistanceMetric, KNNConfig, KNNRegressor, WeightScheme};
pub use linear_models::{LassoRegression, LinearRegression, RidgeRegression};
pub use models::{r2_score, ModelMetrics, Regressor};
pub use params::{format_params, ParamGrid, ParamSet, ParamValue};
pub use random_forest::RandomForestRegressor;
pub use selector::{
    CandidateEvaluation, EvaluationReport, ModelSelector, SelectionOutcome, SplitDataset,
};
pub use trainer::{ModelTrainer, TrainingOutcome};
