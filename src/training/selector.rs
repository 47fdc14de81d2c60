//! Model selection: tune every candidate, score it on held-out data, keep the best

use super::catalog::{CandidateCatalog, Estimator, SearchSpaces};
use super::cross_validation::{CVStrategy, CrossValidator};
use super::grid_search::GridSearchCV;
use super::models::{r2_score, Regressor};
use super::params::{format_params, ParamGrid, ParamSet};
use crate::config::TrainerConfig;
use crate::error::{PipelineError, Result, SelectionStage};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn};

/// Train/test features and targets for one selection run
#[derive(Debug, Clone, PartialEq)]
pub struct SplitDataset {
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
}

impl SplitDataset {
    /// Build and validate a dataset
    pub fn new(
        x_train: Array2<f64>,
        y_train: Array1<f64>,
        x_test: Array2<f64>,
        y_test: Array1<f64>,
    ) -> Result<Self> {
        let dataset = Self {
            x_train,
            y_train,
            x_test,
            y_test,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Row counts must line up and both matrices must share a column count
    pub fn validate(&self) -> Result<()> {
        if self.x_train.nrows() != self.y_train.len() {
            return Err(PipelineError::ConfigError(format!(
                "train features have {} rows but train targets have {}",
                self.x_train.nrows(),
                self.y_train.len()
            )));
        }
        if self.x_test.nrows() != self.y_test.len() {
            return Err(PipelineError::ConfigError(format!(
                "test features have {} rows but test targets have {}",
                self.x_test.nrows(),
                self.y_test.len()
            )));
        }
        if self.x_train.ncols() != self.x_test.ncols() {
            return Err(PipelineError::ConfigError(format!(
                "train features have {} columns but test features have {}",
                self.x_train.ncols(),
                self.x_test.ncols()
            )));
        }
        if self.x_train.nrows() == 0 || self.x_test.nrows() == 0 {
            return Err(PipelineError::ConfigError(
                "train and test splits must both be non-empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.x_train.ncols()
    }
}

/// Scores recorded for one tuned candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub name: String,
    pub best_params: ParamSet,
    /// Mean CV R² of the chosen parameters; `None` for an empty grid
    pub cv_score: Option<f64>,
    /// Observability only, never used for selection
    pub train_r2: f64,
    pub test_r2: f64,
    pub duration_secs: f64,
}

/// Held-out R² per candidate, in catalog order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    entries: Vec<CandidateEvaluation>,
    skipped: Vec<String>,
}

impl EvaluationReport {
    pub fn entries(&self) -> &[CandidateEvaluation] {
        &self.entries
    }

    /// Candidates that timed out and recorded no score
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Test R² of a candidate
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.test_r2)
    }

    pub fn scores(&self) -> Vec<(&str, f64)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.test_r2))
            .collect()
    }

    /// First entry holding the maximum test R²; NaN scores never win
    pub fn best(&self) -> Option<&CandidateEvaluation> {
        let mut best: Option<&CandidateEvaluation> = None;
        for entry in &self.entries {
            if entry.test_r2.is_nan() {
                continue;
            }
            if best.map_or(true, |b| entry.test_r2 > b.test_r2) {
                best = Some(entry);
            }
        }
        best
    }
}

/// Result of a successful selection run
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub best_name: String,
    /// Clone of the winning estimator, tuned and fitted on the full training split
    pub best_estimator: Estimator,
    pub best_score: f64,
    pub report: EvaluationReport,
}

/// Cross-validated model selection over a candidate catalog
#[derive(Debug, Clone)]
pub struct ModelSelector {
    cv: CVStrategy,
    random_state: Option<u64>,
    quality_floor: f64,
    candidate_timeout: Option<Duration>,
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSelector {
    /// 3-fold unshuffled CV and an R² floor of 0.6
    pub fn new() -> Self {
        Self {
            cv: CVStrategy::default(),
            random_state: None,
            quality_floor: 0.6,
            candidate_timeout: None,
        }
    }

    pub fn from_config(config: &TrainerConfig) -> Self {
        Self {
            cv: config.cv.clone(),
            random_state: config.random_state,
            quality_floor: config.quality_floor,
            candidate_timeout: config.candidate_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn with_cv(mut self, cv: CVStrategy) -> Self {
        self.cv = cv;
        self
    }

    pub fn with_quality_floor(mut self, floor: f64) -> Self {
        self.quality_floor = floor;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Skip (rather than fail on) candidates whose tuning takes longer than `timeout`
    pub fn with_candidate_timeout(mut self, timeout: Duration) -> Self {
        self.candidate_timeout = Some(timeout);
        self
    }

    pub fn quality_floor(&self) -> f64 {
        self.quality_floor
    }

    fn grid_search(&self) -> GridSearchCV {
        let mut cv = CrossValidator::new(self.cv.clone());
        if let Some(seed) = self.random_state {
            cv = cv.with_random_state(seed);
        }
        GridSearchCV::new(cv)
    }

    /// Tune, refit and score every candidate in catalog order, then pick the best.
    ///
    /// Estimators in `catalog` are tuned and fitted in place. Configuration problems are
    /// reported before anything is fitted; any per-candidate failure aborts the run.
    pub fn select_best(
        &self,
        data: &SplitDataset,
        catalog: &mut CandidateCatalog,
        spaces: &SearchSpaces,
    ) -> Result<SelectionOutcome> {
        data.validate()?;
        catalog.validate()?;

        let missing = spaces.missing_for(catalog);
        if !missing.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "No search space for candidate(s): {}",
                missing.join(", ")
            )));
        }
        for unused in spaces.unused_by(catalog) {
            warn!(candidate = %unused, "search space has no matching candidate and is ignored");
        }
        if data.x_train.nrows() < self.cv.min_samples() {
            return Err(PipelineError::ConfigError(format!(
                "{} training rows cannot be split into {} folds",
                data.x_train.nrows(),
                self.cv.min_samples()
            )));
        }

        info!(
            n_candidates = catalog.len(),
            n_train = data.x_train.nrows(),
            n_test = data.x_test.nrows(),
            n_features = data.n_features(),
            "model selection started"
        );

        let search = self.grid_search();
        let shared = self.candidate_timeout.map(|_| Arc::new(data.clone()));
        let mut report = EvaluationReport::default();

        for candidate in catalog.iter_mut() {
            let grid = spaces.get(&candidate.name).cloned().unwrap_or_default();
            let span = info_span!("candidate", name = %candidate.name);
            let _guard = span.enter();
            info!(n_combinations = grid.n_combinations(), "tuning candidate");

            let evaluation = match (self.candidate_timeout, &shared) {
                (Some(timeout), Some(shared)) => {
                    let finished = run_with_timeout(
                        &search,
                        &candidate.name,
                        &candidate.estimator,
                        &grid,
                        shared,
                        timeout,
                    )?;
                    match finished {
                        Some((fitted, evaluation)) => {
                            candidate.estimator = fitted;
                            evaluation
                        }
                        None => {
                            warn!(
                                timeout_secs = timeout.as_secs_f64(),
                                "candidate timed out and was skipped"
                            );
                            report.skipped.push(candidate.name.clone());
                            continue;
                        }
                    }
                }
                _ => evaluate_candidate(
                    &search,
                    &candidate.name,
                    &mut candidate.estimator,
                    &grid,
                    data,
                )?,
            };

            info!(
                params = %format_params(&evaluation.best_params),
                cv_r2 = ?evaluation.cv_score,
                train_r2 = evaluation.train_r2,
                test_r2 = evaluation.test_r2,
                secs = evaluation.duration_secs,
                "candidate evaluated"
            );
            report.entries.push(evaluation);
        }

        let (best_name, best_score) = match report.best() {
            Some(best) => (best.name.clone(), best.test_r2),
            None => match report.entries.first() {
                Some(first) => (first.name.clone(), first.test_r2),
                None => return Err(PipelineError::NoCandidateScored),
            },
        };

        // NaN never clears the floor
        if !(best_score >= self.quality_floor) {
            return Err(PipelineError::NoAcceptableModel {
                best_name,
                best_score,
                threshold: self.quality_floor,
            });
        }

        let best_estimator = catalog.get(&best_name).cloned().ok_or_else(|| {
            PipelineError::TrainingError(format!(
                "selected candidate '{}' vanished from the catalog",
                best_name
            ))
        })?;

        info!(best = %best_name, test_r2 = best_score, "best model selected");

        Ok(SelectionOutcome {
            best_name,
            best_estimator,
            best_score,
            report,
        })
    }
}

fn evaluate_candidate(
    search: &GridSearchCV,
    name: &str,
    estimator: &mut Estimator,
    grid: &ParamGrid,
    data: &SplitDataset,
) -> Result<CandidateEvaluation> {
    let started = Instant::now();

    let tuned = search
        .fit(estimator, grid, &data.x_train, &data.y_train)
        .map_err(|e| e.in_candidate(name, SelectionStage::Tuning))?;

    estimator
        .set_params(&tuned.best_params)
        .and_then(|_| estimator.fit(&data.x_train, &data.y_train))
        .map_err(|e| e.in_candidate(name, SelectionStage::Refit))?;

    let train_pred = estimator
        .predict(&data.x_train)
        .map_err(|e| e.in_candidate(name, SelectionStage::Scoring))?;
    let test_pred = estimator
        .predict(&data.x_test)
        .map_err(|e| e.in_candidate(name, SelectionStage::Scoring))?;

    Ok(CandidateEvaluation {
        name: name.to_string(),
        best_params: tuned.best_params,
        cv_score: tuned.best_score,
        train_r2: r2_score(&data.y_train, &train_pred),
        test_r2: r2_score(&data.y_test, &test_pred),
        duration_secs: started.elapsed().as_secs_f64(),
    })
}

/// Run one candidate on a worker thread; `Ok(None)` when it misses the deadline.
///
/// A timed-out worker keeps running until its fit returns and its result is dropped.
fn run_with_timeout(
    search: &GridSearchCV,
    name: &str,
    estimator: &Estimator,
    grid: &ParamGrid,
    data: &Arc<SplitDataset>,
    timeout: Duration,
) -> Result<Option<(Estimator, CandidateEvaluation)>> {
    let (tx, rx) = mpsc::channel();

    let search = search.clone();
    let worker_name = name.to_string();
    let mut worker_estimator = estimator.clone();
    let grid = grid.clone();
    let data = Arc::clone(data);

    thread::Builder::new()
        .name(format!("candidate-{}", name))
        .spawn(move || {
            let result =
                evaluate_candidate(&search, &worker_name, &mut worker_estimator, &grid, &data);
            // The receiver is gone if the deadline already passed
            let _ = tx.send(result.map(|evaluation| (worker_estimator, evaluation)));
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result.map(Some),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(PipelineError::TrainingError(
            "worker exited without reporting a result".to_string(),
        )
        .in_candidate(name, SelectionStage::Tuning)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::catalog::ModelKind;
    use crate::training::params::ParamValue;

    fn dataset() -> SplitDataset {
        let make = |n: usize, offset: usize| {
            let x = Array2::from_shape_fn((n, 2), |(i, j)| (((i + offset) * (j + 3)) % 13) as f64);
            let y = x.column(0).mapv(|v| 4.0 * v) - &x.column(1).mapv(|v| 0.5 * v);
            (x, y)
        };
        let (x_train, y_train) = make(40, 0);
        let (x_test, y_test) = make(12, 7);
        SplitDataset::new(x_train, y_train, x_test, y_test).unwrap()
    }

    #[test]
    fn test_split_dataset_validation() {
        let data = dataset();
        let bad = SplitDataset::new(
            data.x_train.clone(),
            data.y_test.clone(),
            data.x_test.clone(),
            data.y_test.clone(),
        );
        assert!(matches!(bad, Err(PipelineError::ConfigError(_))));

        let narrow = Array2::zeros((12, 1));
        let bad = SplitDataset::new(
            data.x_train.clone(),
            data.y_train.clone(),
            narrow,
            data.y_test.clone(),
        );
        assert!(matches!(bad, Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn test_selects_linear_over_mean() {
        let data = dataset();
        let mut catalog =
            CandidateCatalog::from_kinds(&[ModelKind::Mean, ModelKind::LinearRegression], None);
        let spaces = SearchSpaces::defaults_for(&catalog);

        let outcome = ModelSelector::new().select_best(&data, &mut catalog, &spaces).unwrap();
        assert_eq!(outcome.best_name, "Linear Regression");
        assert!(outcome.best_score > 0.99);
        assert_eq!(outcome.report.len(), 2);
        assert_eq!(outcome.report.get("Linear Regression"), Some(outcome.best_score));

        // Catalog estimators were fitted in place
        assert!(catalog.iter().all(|c| c.estimator.is_fitted()));
    }

    #[test]
    fn test_best_params_are_applied() {
        let data = dataset();
        let mut catalog = CandidateCatalog::from_kinds(&[ModelKind::Ridge], None);
        let spaces =
            SearchSpaces::new().with("Ridge", ParamGrid::new().with("alpha", [500.0, 0.01]));

        let outcome = ModelSelector::new().select_best(&data, &mut catalog, &spaces).unwrap();
        let entry = &outcome.report.entries()[0];
        assert_eq!(entry.best_params["alpha"], ParamValue::Float(0.01));
        assert!(entry.cv_score.is_some());
        assert_eq!(outcome.best_estimator.get_params()["alpha"], ParamValue::Float(0.01));
    }

    #[test]
    fn test_unused_search_space_is_ignored() {
        let data = dataset();
        let mut catalog = CandidateCatalog::from_kinds(&[ModelKind::LinearRegression], None);
        let spaces = SearchSpaces::defaults_for(&catalog).with("Elsewhere", ParamGrid::new());
        assert!(ModelSelector::new().select_best(&data, &mut catalog, &spaces).is_ok());
    }

    #[test]
    fn test_too_few_rows_for_folds() {
        let data = SplitDataset::new(
            Array2::zeros((2, 1)),
            Array1::from_vec(vec![1.0, 2.0]),
            Array2::zeros((1, 1)),
            Array1::from_vec(vec![1.0]),
        )
        .unwrap();
        let mut catalog = CandidateCatalog::from_kinds(&[ModelKind::Mean], None);
        let spaces = SearchSpaces::defaults_for(&catalog);
        let err = ModelSelector::new().select_best(&data, &mut catalog, &spaces).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    #[test]
    fn test_report_best_is_first_max() {
        let entry = |name: &str, score: f64| CandidateEvaluation {
            name: name.to_string(),
            best_params: ParamSet::new(),
            cv_score: None,
            train_r2: score,
            test_r2: score,
            duration_secs: 0.0,
        };
        let report = EvaluationReport {
            entries: vec![entry("a", 0.5), entry("b", f64::NAN), entry("c", 0.9), entry("d", 0.9)],
            skipped: Vec::new(),
        };
        assert_eq!(report.best().map(|e| e.name.as_str()), Some("c"));
    }

    #[test]
    fn test_generous_timeout_keeps_results() {
        let data = dataset();
        let mut catalog = CandidateCatalog::from_kinds(&[ModelKind::LinearRegression], None);
        let spaces = SearchSpaces::defaults_for(&catalog);

        let outcome = ModelSelector::new()
            .with_candidate_timeout(Duration::from_secs(60))
            .select_best(&data, &mut catalog, &spaces)
            .unwrap();
        assert_eq!(outcome.best_name, "Linear Regression");
        assert!(outcome.report.skipped().is_empty());
        assert!(catalog.iter().all(|c| c.estimator.is_fitted()));
    }
}
