//! Tabular regression training pipeline
//!
//! The crate trains a regressor for one numeric target column and serves predictions from
//! the persisted result:
//! - [`ingestion`] - Read the source table and write a seeded train/test split
//! - [`preprocessing`] - Imputation, one-hot encoding and scaling fitted on the train split
//! - [`training`] - Regressors, grid search with cross-validation and model selection
//! - [`export`] - Model and preprocessor artifacts with metadata
//! - [`pipeline`] - Train and predict entry points over all stages
//!
//! Model selection tunes every candidate of a catalog with an exhaustive grid search,
//! refits it on the full train split and keeps the candidate with the highest test R².
//! A winner below the quality floor is reported as an error instead of being persisted.
//!
//! ## Supporting modules
//! - [`config`] - Pipeline configuration
//! - [`logging`] - Subscriber setup for stdout and log files
//! - [`utils`] - CSV, JSON and Parquet loading
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Stages
pub mod ingestion;
pub mod preprocessing;
pub mod training;
pub mod pipeline;

// Infrastructure
pub mod config;
pub mod export;
pub mod logging;
pub mod utils;

// Services
pub mod cli;

pub use error::{PipelineError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{PipelineError, Result, SelectionStage};

    // Configuration
    pub use crate::config::{
        ArtifactConfig, IngestionConfig, PipelineConfig, TrainerConfig, TransformationConfig,
    };

    // Stages
    pub use crate::ingestion::{train_test_split, DataIngestion, IngestionOutput};
    pub use crate::preprocessing::{
        DataTransformation, FeaturePreprocessor, ImputeStrategy, ScalerType,
    };

    // Training
    pub use crate::training::{
        r2_score, CVStrategy, CandidateCatalog, Estimator, EvaluationReport, GridSearchCV,
        ModelKind, ModelSelector, ModelTrainer, ParamGrid, ParamSet, ParamValue, Regressor,
        SearchSpaces, SelectionOutcome, SplitDataset,
    };

    // Export
    pub use crate::export::{load_object, save_object, ModelMetadata, SerializationFormat};

    // Pipelines
    pub use crate::pipeline::{InputRecord, PredictPipeline, TrainPipeline, TrainReport};

    // Data loading
    pub use crate::utils::{DataLoader, DataSaver};
}
