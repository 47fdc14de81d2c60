//! Model trainer stage: build the catalog, run selection, persist the winner

use super::catalog::{CandidateCatalog, ModelKind, SearchSpaces};
use super::models::{ModelMetrics, Regressor};
use super::selector::{EvaluationReport, ModelSelector, SplitDataset};
use crate::config::{ArtifactConfig, TrainerConfig};
use crate::error::{PipelineError, Result};
use crate::export::{save_object, ModelMetadata};
use std::path::PathBuf;
use tracing::info;

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub best_name: String,
    pub test_r2: f64,
    /// Held-out metrics of the persisted model
    pub metrics: ModelMetrics,
    pub model_path: PathBuf,
    pub report: EvaluationReport,
}

/// Runs model selection and writes the winning estimator to the artifact directory
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: TrainerConfig,
    artifacts: ArtifactConfig,
    target_name: String,
}

impl ModelTrainer {
    pub fn new(config: TrainerConfig, artifacts: ArtifactConfig) -> Self {
        Self {
            config,
            artifacts,
            target_name: String::new(),
        }
    }

    /// Target column recorded in the model metadata
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_name = target.into();
        self
    }

    /// Candidate catalog and search spaces for this configuration.
    ///
    /// Overrides for names outside the catalog are rejected.
    pub fn build_catalog(&self) -> Result<(CandidateCatalog, SearchSpaces)> {
        let kinds = self
            .config
            .candidates
            .clone()
            .unwrap_or_else(|| ModelKind::DEFAULT_CATALOG.to_vec());
        let catalog = CandidateCatalog::from_kinds(&kinds, self.config.random_state);

        let mut spaces = SearchSpaces::defaults_for(&catalog);
        let unknown = self.config.search_spaces.unused_by(&catalog);
        if !unknown.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "Search space overrides for unknown candidate(s): {}",
                unknown.join(", ")
            )));
        }
        for name in self.config.search_spaces.names() {
            if let Some(grid) = self.config.search_spaces.get(name) {
                spaces.insert(name, grid.clone());
            }
        }

        Ok((catalog, spaces))
    }

    pub fn initiate_model_trainer(
        &self,
        dataset: &SplitDataset,
        feature_names: &[String],
    ) -> Result<TrainingOutcome> {
        info!("model training started");
        let (mut catalog, spaces) = self.build_catalog()?;

        let outcome =
            ModelSelector::from_config(&self.config).select_best(dataset, &mut catalog, &spaces)?;

        let predictions = outcome.best_estimator.predict(&dataset.x_test)?;
        let metrics = ModelMetrics::compute(&dataset.y_test, &predictions);

        let feature_names = if feature_names.is_empty() {
            (0..dataset.n_features()).map(|i| format!("x{}", i)).collect()
        } else {
            feature_names.to_vec()
        };

        let mut metadata = ModelMetadata::new(outcome.best_name.as_str())
            .with_model_type(outcome.best_estimator.kind().as_str())
            .with_features(feature_names)
            .with_target(self.target_name.as_str())
            .with_metrics(metrics.to_map());
        for (key, value) in outcome.best_estimator.get_params() {
            metadata = metadata.add_hyperparameter(key, value);
        }
        if let Some(entry) = outcome.report.entries().iter().find(|e| e.name == outcome.best_name) {
            metadata = metadata.add_metric("train_r2", entry.train_r2);
            if let Some(cv) = entry.cv_score {
                metadata = metadata.add_metric("cv_r2", cv);
            }
        }

        let model_path = self.artifacts.model_path();
        save_object(&outcome.best_estimator, &model_path, metadata, self.artifacts.model_format)?;
        info!(
            model = %outcome.best_name,
            test_r2 = outcome.best_score,
            path = %model_path.display(),
            "best model saved"
        );

        Ok(TrainingOutcome {
            best_name: outcome.best_name,
            test_r2: outcome.best_score,
            metrics,
            model_path,
            report: outcome.report,
        })
    }
}
