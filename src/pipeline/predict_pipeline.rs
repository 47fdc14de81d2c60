//! Prediction from persisted artifacts

use crate::config::ArtifactConfig;
use crate::error::{PipelineError, Result};
use crate::export::{load_object, ModelMetadata};
use crate::preprocessing::FeaturePreprocessor;
use crate::training::{Estimator, Regressor};
use ndarray::Array1;
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Fitted preprocessor plus the selected model
#[derive(Debug, Clone)]
pub struct PredictPipeline {
    model: Estimator,
    preprocessor: FeaturePreprocessor,
    metadata: ModelMetadata,
}

impl PredictPipeline {
    pub fn new(
        model: Estimator,
        preprocessor: FeaturePreprocessor,
        metadata: ModelMetadata,
    ) -> Result<Self> {
        if !model.is_fitted() || !preprocessor.is_fitted() {
            return Err(PipelineError::ModelNotFitted);
        }
        let n_model = metadata.feature_names.len();
        if n_model != 0 && n_model != preprocessor.n_features() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features from the model", n_model),
                actual: format!("{} features from the preprocessor", preprocessor.n_features()),
            });
        }
        Ok(Self {
            model,
            preprocessor,
            metadata,
        })
    }

    pub fn load(model_path: impl AsRef<Path>, preprocessor_path: impl AsRef<Path>) -> Result<Self> {
        let (model, metadata): (Estimator, ModelMetadata) = load_object(model_path.as_ref())?;
        let (preprocessor, _): (FeaturePreprocessor, ModelMetadata) =
            load_object(preprocessor_path.as_ref())?;
        info!(
            model = %metadata.name,
            features = preprocessor.n_features(),
            "prediction artifacts loaded"
        );
        Self::new(model, preprocessor, metadata)
    }

    pub fn from_artifacts(artifacts: &ArtifactConfig) -> Result<Self> {
        Self::load(artifacts.model_path(), artifacts.preprocessor_path())
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn model(&self) -> &Estimator {
        &self.model
    }

    pub fn preprocessor(&self) -> &FeaturePreprocessor {
        &self.preprocessor
    }

    /// Preprocess raw feature rows and predict the target
    pub fn predict(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let x = self.preprocessor.transform(df)?;
        let predictions = self.model.predict(&x)?;
        debug!(rows = predictions.len(), "predictions computed");
        Ok(predictions)
    }
}

/// Field value of an [`InputRecord`]
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Numeric(f64),
    Categorical(String),
}

/// One row of raw features, e.g. collected from a form, in insertion order
///
/// ```
/// use ml_project::pipeline::InputRecord;
///
/// let frame = InputRecord::new()
///     .categorical("gender", "female")
///     .categorical("lunch", "standard")
///     .numeric("reading_score", 72.0)
///     .to_frame()
///     .unwrap();
/// assert_eq!(frame.shape(), (1, 3));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputRecord {
    fields: Vec<(String, FieldValue)>,
}

impl InputRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn numeric(self, name: impl Into<String>, value: f64) -> Self {
        self.set(name.into(), FieldValue::Numeric(value))
    }

    pub fn categorical(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name.into(), FieldValue::Categorical(value.into()))
    }

    /// A repeated name replaces the earlier value in place
    fn set(mut self, name: String, value: FieldValue) -> Self {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// One-row frame with a column per field
    pub fn to_frame(&self) -> Result<DataFrame> {
        let columns: Vec<Column> = self
            .fields
            .iter()
            .map(|(name, value)| match value {
                FieldValue::Numeric(v) => Series::new(name.as_str().into(), [*v]).into(),
                FieldValue::Categorical(v) => {
                    Series::new(name.as_str().into(), [v.as_str()]).into()
                }
            })
            .collect();
        Ok(DataFrame::new(columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_replaces_repeated_field() {
        let record = InputRecord::new()
            .numeric("reading_score", 70.0)
            .categorical("gender", "male")
            .numeric("reading_score", 75.0);

        assert_eq!(record.len(), 2);
        assert_eq!(record.get("reading_score"), Some(&FieldValue::Numeric(75.0)));

        let frame = record.to_frame().unwrap();
        assert_eq!(frame.get_column_names(), ["reading_score", "gender"]);
        assert_eq!(frame.column("gender").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_unfitted_parts_are_rejected() {
        let model = Estimator::new(crate::training::ModelKind::Mean, None);
        let result =
            PredictPipeline::new(model, FeaturePreprocessor::default(), ModelMetadata::new("m"));
        assert!(matches!(result, Err(PipelineError::ModelNotFitted)));
    }
}
