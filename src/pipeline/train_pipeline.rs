//! End-to-end training: ingestion, transformation, model selection

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingestion::{DataIngestion, IngestionOutput};
use crate::preprocessing::DataTransformation;
use crate::training::{EvaluationReport, ModelMetrics, ModelTrainer};
use polars::prelude::DataFrame;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Summary of a completed training run
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub ingestion: IngestionOutput,
    pub preprocessor_path: PathBuf,
    pub model_path: PathBuf,
    pub feature_names: Vec<String>,
    pub best_name: String,
    pub test_r2: f64,
    pub metrics: ModelMetrics,
    pub report: EvaluationReport,
    pub duration_secs: f64,
}

pub struct TrainPipeline {
    config: PipelineConfig,
}

impl TrainPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Train from the configured source file
    pub fn run(&self) -> Result<TrainReport> {
        self.config.validate()?;
        let started = Instant::now();
        let ingestion =
            DataIngestion::new(self.config.ingestion.clone(), self.config.artifacts.clone())
                .initiate_data_ingestion()?;
        self.train_from(ingestion, started)
    }

    /// Train from an in-memory frame instead of the source file
    pub fn run_on_frame(&self, df: DataFrame) -> Result<TrainReport> {
        self.config.validate()?;
        let started = Instant::now();
        let ingestion =
            DataIngestion::new(self.config.ingestion.clone(), self.config.artifacts.clone())
                .ingest_frame(df)?;
        self.train_from(ingestion, started)
    }

    fn train_from(&self, ingestion: IngestionOutput, started: Instant) -> Result<TrainReport> {
        let transformed = DataTransformation::new(
            self.config.transformation.clone(),
            self.config.artifacts.clone(),
        )
        .initiate_data_transformation(&ingestion.train_path, &ingestion.test_path)?;

        let outcome = ModelTrainer::new(self.config.trainer.clone(), self.config.artifacts.clone())
            .with_target(self.config.transformation.target_column.as_str())
            .initiate_model_trainer(&transformed.dataset, &transformed.feature_names)?;

        let duration_secs = started.elapsed().as_secs_f64();
        info!(
            best = %outcome.best_name,
            test_r2 = outcome.test_r2,
            secs = duration_secs,
            "training pipeline finished"
        );

        Ok(TrainReport {
            ingestion,
            preprocessor_path: transformed.preprocessor_path,
            model_path: outcome.model_path,
            feature_names: transformed.feature_names,
            best_name: outcome.best_name,
            test_r2: outcome.test_r2,
            metrics: outcome.metrics,
            report: outcome.report,
            duration_secs,
        })
    }
}
