//! Error types for the training pipeline

use std::fmt;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Step of the per-candidate loop in which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStage {
    Tuning,
    Refit,
    Scoring,
}

impl fmt::Display for SelectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            SelectionStage::Tuning => "tuning",
            SelectionStage::Refit => "refit",
            SelectionStage::Scoring => "scoring",
        };
        f.write_str(stage)
    }
}

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Preprocessing error: {0}")]
    PreprocessingError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(
        "No acceptable model: best candidate '{best_name}' scored R² {best_score:.4}, \
         below the floor of {threshold}"
    )]
    NoAcceptableModel {
        best_name: String,
        best_score: f64,
        threshold: f64,
    },

    #[error("No candidate produced a score before its timeout")]
    NoCandidateScored,

    #[error("Candidate '{candidate}' failed during {stage}: {source}")]
    CandidateFailed {
        candidate: String,
        stage: SelectionStage,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl PipelineError {
    pub(crate) fn invalid_param(
        name: impl Into<String>,
        value: impl fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Wrap a failure with the candidate and loop stage it came from
    pub fn in_candidate(self, candidate: impl Into<String>, stage: SelectionStage) -> Self {
        PipelineError::CandidateFailed {
            candidate: candidate.into(),
            stage,
            source: Box::new(self),
        }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for PipelineError {
    fn from(err: bincode::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::IoError(_)));
    }

    #[test]
    fn test_candidate_context_keeps_cause() {
        let err = PipelineError::ModelNotFitted.in_candidate("Ridge", SelectionStage::Refit);
        assert_eq!(err.to_string(), "Candidate 'Ridge' failed during refit: Model not fitted");

        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Model not fitted"));
    }

    #[test]
    fn test_no_acceptable_model_display() {
        let err = PipelineError::NoAcceptableModel {
            best_name: "Mean Baseline".to_string(),
            best_score: 0.0,
            threshold: 0.6,
        };
        assert!(err.to_string().contains("Mean Baseline"));
        assert!(err.to_string().contains("0.6"));
    }
}
