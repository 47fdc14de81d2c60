//! Fitted feature preprocessing and the transformation stage of the training pipeline

use super::{
    detect_column_types,
    encoder::OneHotEncoder,
    imputer::Imputer,
    scaler::Scaler,
};
use crate::config::{ArtifactConfig, TransformationConfig};
use crate::error::{PipelineError, Result};
use crate::export::{save_object, ModelMetadata, SerializationFormat};
use crate::training::SplitDataset;
use crate::utils::DataLoader;
use ndarray::{concatenate, Array1, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Numeric: impute then scale. Categorical: impute, one-hot encode, then scale.
///
/// Output columns are the numeric features followed by the one-hot features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePreprocessor {
    target_column: Option<String>,
    requested_numeric: Option<Vec<String>>,
    requested_categorical: Option<Vec<String>>,
    numeric_columns: Vec<String>,
    categorical_columns: Vec<String>,
    numeric_imputer: Imputer,
    categorical_imputer: Imputer,
    encoder: OneHotEncoder,
    numeric_scaler: Scaler,
    categorical_scaler: Scaler,
    feature_names: Vec<String>,
    is_fitted: bool,
}

impl Default for FeaturePreprocessor {
    fn default() -> Self {
        Self::from_config(&TransformationConfig::default())
    }
}

impl FeaturePreprocessor {
    pub fn from_config(config: &TransformationConfig) -> Self {
        Self {
            target_column: Some(config.target_column.clone()),
            requested_numeric: config.numeric_columns.clone(),
            requested_categorical: config.categorical_columns.clone(),
            numeric_columns: Vec::new(),
            categorical_columns: Vec::new(),
            numeric_imputer: Imputer::new(config.numeric_impute.clone()),
            categorical_imputer: Imputer::new(config.categorical_impute.clone()),
            encoder: OneHotEncoder::new(),
            numeric_scaler: Scaler::new(config.numeric_scaler.clone()),
            categorical_scaler: Scaler::new(config.categorical_scaler.clone()),
            feature_names: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric_columns
    }

    pub fn categorical_columns(&self) -> &[String] {
        &self.categorical_columns
    }

    pub fn target_column(&self) -> Option<&str> {
        self.target_column.as_deref()
    }

    /// Output feature names: `col` for numeric, `col_category` for one-hot columns
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    fn resolve_columns(&self, df: &DataFrame) -> Result<(Vec<String>, Vec<String>)> {
        let target = self.target_column.as_deref();
        let exclude: Vec<&str> = target.into_iter().collect();
        let (detected_numeric, detected_categorical) = detect_column_types(df, &exclude);

        let numeric = self.requested_numeric.clone().unwrap_or(detected_numeric);
        let categorical = self.requested_categorical.clone().unwrap_or(detected_categorical);

        if let Some(target) = target {
            if numeric.iter().chain(&categorical).any(|c| c == target) {
                return Err(PipelineError::ConfigError(format!(
                    "Target column '{}' is also listed as a feature",
                    target
                )));
            }
        }
        if numeric.is_empty() && categorical.is_empty() {
            return Err(PipelineError::PreprocessingError(
                "No feature columns to preprocess".to_string(),
            ));
        }
        Ok((numeric, categorical))
    }

    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        let start = Instant::now();
        let (numeric, categorical) = self.resolve_columns(df)?;

        let numeric_refs: Vec<&str> = numeric.iter().map(String::as_str).collect();
        let categorical_refs: Vec<&str> = categorical.iter().map(String::as_str).collect();

        self.numeric_imputer.fit(df, &numeric_refs)?;
        self.categorical_imputer.fit(df, &categorical_refs)?;
        let imputed = self.categorical_imputer.transform(&self.numeric_imputer.transform(df)?)?;

        let numeric_block = numeric_matrix(&imputed, &numeric)?;
        self.numeric_scaler.fit(&numeric_block)?;

        self.encoder.fit(&imputed, &categorical_refs)?;
        let onehot = self.encoder.transform(&imputed)?;
        self.categorical_scaler.fit(&onehot)?;

        self.feature_names = numeric.iter().cloned().chain(self.encoder.feature_names()).collect();
        self.numeric_columns = numeric;
        self.categorical_columns = categorical;
        self.is_fitted = true;

        debug!(
            numeric = self.numeric_columns.len(),
            categorical = self.categorical_columns.len(),
            n_features = self.feature_names.len(),
            ms = start.elapsed().as_millis() as u64,
            "preprocessor fitted"
        );
        Ok(self)
    }

    /// Feature matrix for `df`; extra columns (including the target) are ignored
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }

        let imputed = self.categorical_imputer.transform(&self.numeric_imputer.transform(df)?)?;
        let numeric = self
            .numeric_scaler
            .transform(&numeric_matrix(&imputed, &self.numeric_columns)?)?;
        let onehot = self
            .categorical_scaler
            .transform(&self.encoder.transform(&imputed)?)?;

        Ok(concatenate(Axis(1), &[numeric.view(), onehot.view()])?)
    }

    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<Array2<f64>> {
        self.fit(df)?;
        self.transform(df)
    }
}

fn numeric_matrix(df: &DataFrame, columns: &[String]) -> Result<Array2<f64>> {
    let mut out = Array2::zeros((df.height(), columns.len()));
    for (j, name) in columns.iter().enumerate() {
        let column = df
            .column(name)
            .map_err(|_| PipelineError::FeatureNotFound(name.clone()))?;
        let cast = column.cast(&DataType::Float64)?;
        for (i, value) in cast.f64()?.into_iter().enumerate() {
            out[[i, j]] = value.unwrap_or(f64::NAN);
        }
    }
    Ok(out)
}

/// Target column as a dense vector; nulls are rejected
pub fn target_vector(df: &DataFrame, target: &str) -> Result<Array1<f64>> {
    let column = df
        .column(target)
        .map_err(|_| PipelineError::FeatureNotFound(target.to_string()))?;
    let cast = column.cast(&DataType::Float64)?;
    let ca = cast.f64()?;
    if ca.null_count() > 0 {
        return Err(PipelineError::DataError(format!(
            "Target column '{}' has {} missing or non-numeric values",
            target,
            ca.null_count()
        )));
    }
    Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Output of [`DataTransformation::initiate_data_transformation`]
#[derive(Debug, Clone)]
pub struct TransformedData {
    pub dataset: SplitDataset,
    pub feature_names: Vec<String>,
    pub preprocessor_path: PathBuf,
}

/// Fits the preprocessor on the train split, transforms both splits and persists it
#[derive(Debug, Clone)]
pub struct DataTransformation {
    config: TransformationConfig,
    artifacts: ArtifactConfig,
    loader: DataLoader,
}

impl DataTransformation {
    pub fn new(config: TransformationConfig, artifacts: ArtifactConfig) -> Self {
        Self {
            config,
            artifacts,
            loader: DataLoader::new(),
        }
    }

    pub fn initiate_data_transformation(
        &self,
        train_path: &Path,
        test_path: &Path,
    ) -> Result<TransformedData> {
        info!(
            train = %train_path.display(),
            test = %test_path.display(),
            "data transformation started"
        );
        let train_df = self.loader.load_csv(train_path)?;
        let test_df = self.loader.load_csv(test_path)?;
        self.transform_frames(&train_df, &test_df)
    }

    pub fn transform_frames(
        &self,
        train_df: &DataFrame,
        test_df: &DataFrame,
    ) -> Result<TransformedData> {
        let target = self.config.target_column.as_str();
        let y_train = target_vector(train_df, target)?;
        let y_test = target_vector(test_df, target)?;

        let mut preprocessor = FeaturePreprocessor::from_config(&self.config);
        let x_train = preprocessor.fit_transform(train_df)?;
        let x_test = preprocessor.transform(test_df)?;
        info!(
            numeric = ?preprocessor.numeric_columns(),
            categorical = ?preprocessor.categorical_columns(),
            n_features = preprocessor.n_features(),
            "preprocessor fitted on train split"
        );

        let dataset = SplitDataset::new(x_train, y_train, x_test, y_test)?;
        let feature_names = preprocessor.feature_names().to_vec();

        let preprocessor_path = self.artifacts.preprocessor_path();
        let metadata = ModelMetadata::new("preprocessor")
            .with_model_type("feature_preprocessor")
            .with_features(feature_names.clone())
            .with_target(target);
        save_object(&preprocessor, &preprocessor_path, metadata, SerializationFormat::Json)?;
        info!(path = %preprocessor_path.display(), "preprocessor saved");

        Ok(TransformedData {
            dataset,
            feature_names,
            preprocessor_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn students() -> DataFrame {
        df!(
            "gender" => [Some("female"), Some("male"), None, Some("male")],
            "reading_score" => [Some(72i64), None, Some(95), Some(60)],
            "math_score" => [70.0f64, 88.0, 93.0, 55.0]
        )
        .unwrap()
    }

    #[test]
    fn test_feature_layout() {
        let config = TransformationConfig::default();
        let mut pre = FeaturePreprocessor::from_config(&config);
        let x = pre.fit_transform(&students()).unwrap();

        assert_eq!(pre.numeric_columns(), ["reading_score".to_string()]);
        assert_eq!(
            pre.feature_names(),
            ["reading_score", "gender_female", "gender_male"].map(String::from)
        );
        assert_eq!(x.dim(), (4, 3));
        assert!(x.iter().all(|v| v.is_finite()));
        // Scaled numeric column is centered
        assert!(x.column(0).sum().abs() < 1e-9);
    }

    #[test]
    fn test_transform_ignores_target_and_is_stable() {
        let mut pre = FeaturePreprocessor::from_config(&TransformationConfig::default());
        pre.fit(&students()).unwrap();

        let without_target = students().drop("math_score").unwrap();
        assert_eq!(pre.transform(&students()).unwrap(), pre.transform(&without_target).unwrap());
    }

    #[test]
    fn test_missing_feature_column() {
        let mut pre = FeaturePreprocessor::from_config(&TransformationConfig::default());
        pre.fit(&students()).unwrap();
        let partial = students().drop("gender").unwrap();
        assert!(matches!(pre.transform(&partial), Err(PipelineError::FeatureNotFound(_))));
    }

    #[test]
    fn test_target_vector() {
        assert_eq!(target_vector(&students(), "math_score").unwrap().len(), 4);
        assert!(matches!(
            target_vector(&students(), "writing_score"),
            Err(PipelineError::FeatureNotFound(_))
        ));
        assert!(target_vector(&students(), "reading_score").is_err());
    }

    #[test]
    fn test_transformation_stage_persists_preprocessor() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactConfig::default().with_dir(dir.path());
        let stage = DataTransformation::new(TransformationConfig::default(), artifacts);

        let train = students();
        let test = students().slice(1, 2);
        let out = stage.transform_frames(&train, &test).unwrap();

        assert_eq!(out.dataset.x_test.dim(), (2, 3));
        assert!(out.preprocessor_path.exists());

        let (restored, metadata): (FeaturePreprocessor, _) =
            crate::export::load_object(&out.preprocessor_path).unwrap();
        assert_eq!(metadata.target_name, "math_score");
        assert_eq!(restored.transform(&test).unwrap(), out.dataset.x_test);
    }
}
