//! Pipeline configuration
//!
//! Every section has working defaults, so a JSON config file only needs the keys it changes.

use crate::error::{PipelineError, Result};
use crate::export::SerializationFormat;
use crate::logging::LoggingConfig;
use crate::preprocessing::{ImputeStrategy, ScalerType};
use crate::training::{CVStrategy, ModelKind, SearchSpaces};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where pipeline artifacts are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub artifact_dir: PathBuf,
    pub raw_data_file: String,
    pub train_data_file: String,
    pub test_data_file: String,
    pub model_file: String,
    pub preprocessor_file: String,
    pub model_format: SerializationFormat,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("artifacts"),
            raw_data_file: "raw_data.csv".to_string(),
            train_data_file: "train.csv".to_string(),
            test_data_file: "test.csv".to_string(),
            model_file: "model.bin".to_string(),
            preprocessor_file: "preprocessor.json".to_string(),
            model_format: SerializationFormat::Binary,
        }
    }
}

impl ArtifactConfig {
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_model_format(mut self, format: SerializationFormat) -> Self {
        self.model_format = format;
        self
    }

    pub fn raw_data_path(&self) -> PathBuf {
        self.artifact_dir.join(&self.raw_data_file)
    }

    pub fn train_data_path(&self) -> PathBuf {
        self.artifact_dir.join(&self.train_data_file)
    }

    pub fn test_data_path(&self) -> PathBuf {
        self.artifact_dir.join(&self.test_data_file)
    }

    pub fn model_path(&self) -> PathBuf {
        self.artifact_dir.join(&self.model_file)
    }

    pub fn preprocessor_path(&self) -> PathBuf {
        self.artifact_dir.join(&self.preprocessor_file)
    }

    pub fn validate(&self) -> Result<()> {
        let files = [
            ("raw_data_file", &self.raw_data_file),
            ("train_data_file", &self.train_data_file),
            ("test_data_file", &self.test_data_file),
            ("model_file", &self.model_file),
            ("preprocessor_file", &self.preprocessor_file),
        ];
        for (key, value) in files {
            if value.trim().is_empty() {
                return Err(PipelineError::ConfigError(format!("artifacts.{} is empty", key)));
            }
        }
        Ok(())
    }
}

/// Source data and split settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub source_path: PathBuf,
    /// Fraction of rows held out for testing, in (0, 1)
    pub test_size: f64,
    pub random_state: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("notebook/data/stud.csv"),
            test_size: 0.2,
            random_state: 42,
        }
    }
}

impl IngestionConfig {
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = path.into();
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(PipelineError::ConfigError(format!(
                "ingestion.test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        Ok(())
    }
}

/// Feature preprocessing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationConfig {
    pub target_column: String,
    /// Explicit numeric features; detected from dtypes when unset
    pub numeric_columns: Option<Vec<String>>,
    /// Explicit categorical features; detected from dtypes when unset
    pub categorical_columns: Option<Vec<String>>,
    pub numeric_impute: ImputeStrategy,
    pub categorical_impute: ImputeStrategy,
    pub numeric_scaler: ScalerType,
    pub categorical_scaler: ScalerType,
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self {
            target_column: "math_score".to_string(),
            numeric_columns: None,
            categorical_columns: None,
            numeric_impute: ImputeStrategy::Median,
            categorical_impute: ImputeStrategy::MostFrequent,
            numeric_scaler: ScalerType::Standard { with_mean: true },
            categorical_scaler: ScalerType::Standard { with_mean: false },
        }
    }
}

impl TransformationConfig {
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_column = target.into();
        self
    }

    pub fn with_columns(mut self, numeric: Vec<String>, categorical: Vec<String>) -> Self {
        self.numeric_columns = Some(numeric);
        self.categorical_columns = Some(categorical);
        self
    }

    pub fn with_numeric_scaler(mut self, scaler: ScalerType) -> Self {
        self.numeric_scaler = scaler;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_column.trim().is_empty() {
            return Err(PipelineError::ConfigError(
                "transformation.target_column is empty".to_string(),
            ));
        }
        if matches!(self.categorical_impute, ImputeStrategy::Mean | ImputeStrategy::Median) {
            return Err(PipelineError::ConfigError(
                "transformation.categorical_impute must be most_frequent or constant".to_string(),
            ));
        }
        Ok(())
    }
}

/// Model selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Candidate kinds in evaluation order; the default catalog when unset
    pub candidates: Option<Vec<ModelKind>>,
    /// Grid overrides keyed by candidate name
    pub search_spaces: SearchSpaces,
    pub cv: CVStrategy,
    /// Minimum held-out R² for the winner
    pub quality_floor: f64,
    pub random_state: Option<u64>,
    /// Skip candidates whose tuning exceeds this many seconds
    pub candidate_timeout_secs: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            candidates: None,
            search_spaces: SearchSpaces::new(),
            cv: CVStrategy::default(),
            quality_floor: 0.6,
            random_state: Some(42),
            candidate_timeout_secs: None,
        }
    }
}

impl TrainerConfig {
    pub fn with_candidates(mut self, kinds: Vec<ModelKind>) -> Self {
        self.candidates = Some(kinds);
        self
    }

    pub fn with_search_spaces(mut self, spaces: SearchSpaces) -> Self {
        self.search_spaces = spaces;
        self
    }

    pub fn with_cv(mut self, cv: CVStrategy) -> Self {
        self.cv = cv;
        self
    }

    pub fn with_quality_floor(mut self, floor: f64) -> Self {
        self.quality_floor = floor;
        self
    }

    pub fn with_candidate_timeout(mut self, secs: u64) -> Self {
        self.candidate_timeout_secs = Some(secs);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(kinds) = &self.candidates {
            if kinds.is_empty() {
                return Err(PipelineError::ConfigError(
                    "trainer.candidates must name at least one model".to_string(),
                ));
            }
        }
        if !self.quality_floor.is_finite() {
            return Err(PipelineError::ConfigError(
                "trainer.quality_floor must be finite".to_string(),
            ));
        }
        match self.cv {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::RepeatedKFold { n_splits, .. }
                if n_splits < 2 =>
            {
                return Err(PipelineError::ConfigError(format!(
                    "trainer.cv needs at least 2 folds, got {}",
                    n_splits
                )));
            }
            CVStrategy::RepeatedKFold { n_repeats: 0, .. } => {
                return Err(PipelineError::ConfigError(
                    "trainer.cv.n_repeats must be positive".to_string(),
                ));
            }
            _ => {}
        }
        if self.candidate_timeout_secs == Some(0) {
            return Err(PipelineError::ConfigError(
                "trainer.candidate_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub artifacts: ArtifactConfig,
    pub ingestion: IngestionConfig,
    pub transformation: TransformationConfig,
    pub trainer: TrainerConfig,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            PipelineError::ConfigError(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactConfig) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_ingestion(mut self, ingestion: IngestionConfig) -> Self {
        self.ingestion = ingestion;
        self
    }

    pub fn with_transformation(mut self, transformation: TransformationConfig) -> Self {
        self.transformation = transformation;
        self
    }

    pub fn with_trainer(mut self, trainer: TrainerConfig) -> Self {
        self.trainer = trainer;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.artifacts.validate()?;
        self.ingestion.validate()?;
        self.transformation.validate()?;
        self.trainer.validate()?;
        self.logging.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::ParamGrid;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.artifacts.model_path(), PathBuf::from("artifacts/model.bin"));
        assert_eq!(config.ingestion.test_size, 0.2);
        assert_eq!(config.ingestion.random_state, 42);
        assert_eq!(config.transformation.target_column, "math_score");
        assert_eq!(config.trainer.quality_floor, 0.6);
        assert_eq!(config.trainer.cv, CVStrategy::KFold { n_splits: 3, shuffle: false });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "ingestion": { "test_size": 0.25 },
            "trainer": {
                "candidates": ["ridge", "linear_regression"],
                "search_spaces": { "Ridge": { "alpha": [0.5, 5.0] } }
            }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.ingestion.test_size, 0.25);
        assert_eq!(config.ingestion.random_state, 42);
        assert_eq!(
            config.trainer.candidates,
            Some(vec![ModelKind::Ridge, ModelKind::LinearRegression])
        );
        assert_eq!(
            config.trainer.search_spaces.get("Ridge"),
            Some(&ParamGrid::new().with("alpha", [0.5, 5.0]))
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = PipelineConfig::default()
            .with_trainer(
                TrainerConfig::default().with_quality_floor(0.5).with_candidate_timeout(30),
            );
        config.save(&path).unwrap();

        assert_eq!(PipelineConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_validation_errors() {
        let bad_split = PipelineConfig::default()
            .with_ingestion(IngestionConfig::default().with_test_size(1.0));
        assert!(matches!(bad_split.validate(), Err(PipelineError::ConfigError(_))));

        let bad_cv = PipelineConfig::default().with_trainer(
            TrainerConfig::default().with_cv(CVStrategy::KFold { n_splits: 1, shuffle: false }),
        );
        assert!(bad_cv.validate().is_err());

        let no_candidates = PipelineConfig::default()
            .with_trainer(TrainerConfig::default().with_candidates(Vec::new()));
        assert!(no_candidates.validate().is_err());
    }
}
