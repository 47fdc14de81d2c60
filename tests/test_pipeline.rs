//! Integration test: train pipeline end-to-end, then predict from the artifacts

use ml_project::config::{ArtifactConfig, IngestionConfig, PipelineConfig, TrainerConfig};
use ml_project::error::PipelineError;
use ml_project::export::SerializationFormat;
use ml_project::pipeline::{InputRecord, PredictPipeline, TrainPipeline};
use ml_project::training::{r2_score, ModelKind};
use ml_project::utils::{DataLoader, DataSaver};
use ndarray::Array1;
use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::Path;

/// Student scores where the math score follows reading, writing and lunch
fn students_df(n: usize) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let mut gender = Vec::with_capacity(n);
    let mut lunch = Vec::with_capacity(n);
    let mut reading = Vec::with_capacity(n);
    let mut writing = Vec::with_capacity(n);
    let mut math = Vec::with_capacity(n);

    for _ in 0..n {
        let g = if rng.gen_bool(0.5) { "female" } else { "male" };
        let l = if rng.gen_bool(0.65) { "standard" } else { "free/reduced" };
        let r: i64 = rng.gen_range(30..100);
        let w: i64 = (r + rng.gen_range(-6..6)).clamp(0, 100);
        let bonus = if l == "standard" { 8.0 } else { 0.0 };
        let m = 0.5 * r as f64 + 0.4 * w as f64 + bonus + rng.gen_range(-3.0..3.0);

        gender.push(g);
        lunch.push(l);
        reading.push(r);
        writing.push(w);
        math.push(m);
    }

    df!(
        "gender" => gender,
        "lunch" => lunch,
        "reading_score" => reading,
        "writing_score" => writing,
        "math_score" => math
    )
    .unwrap()
}

fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_artifacts(ArtifactConfig::default().with_dir(dir.join("artifacts")))
        .with_trainer(TrainerConfig::default().with_candidates(vec![
            ModelKind::LinearRegression,
            ModelKind::Ridge,
            ModelKind::DecisionTree,
        ]))
}

fn target(df: &DataFrame) -> Array1<f64> {
    df.column("math_score")
        .unwrap()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

#[test]
fn test_train_then_predict() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let report = TrainPipeline::new(config.clone()).run_on_frame(students_df(150)).unwrap();
    assert_eq!(report.ingestion.n_test, 30);
    assert_eq!(report.ingestion.n_train, 120);
    assert!(report.test_r2 > 0.6, "test R² {}", report.test_r2);
    assert!(report.model_path.exists());
    assert!(report.preprocessor_path.exists());
    assert_eq!(report.report.len(), 3);
    assert_eq!(
        report.feature_names,
        vec![
            "reading_score",
            "writing_score",
            "gender_female",
            "gender_male",
            "lunch_free/reduced",
            "lunch_standard",
        ]
    );

    let pipeline = PredictPipeline::from_artifacts(&config.artifacts).unwrap();
    assert_eq!(pipeline.metadata().name, report.best_name);
    assert_eq!(pipeline.metadata().target_name, "math_score");
    assert_eq!(pipeline.metadata().feature_names, report.feature_names);

    let test = DataLoader::new().load_csv(&report.ingestion.test_path).unwrap();
    let predictions = pipeline.predict(&test).unwrap();
    assert_eq!(predictions.len(), 30);
    let r2 = r2_score(&target(&test), &predictions);
    assert!((r2 - report.test_r2).abs() < 1e-9);
}

#[test]
fn test_predict_single_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    TrainPipeline::new(config.clone()).run_on_frame(students_df(120)).unwrap();

    let pipeline = PredictPipeline::from_artifacts(&config.artifacts).unwrap();
    let record = InputRecord::new()
        .categorical("gender", "female")
        .categorical("lunch", "standard")
        .numeric("reading_score", 80.0)
        .numeric("writing_score", 78.0);

    let predictions = pipeline.predict(&record.to_frame().unwrap()).unwrap();
    assert_eq!(predictions.len(), 1);
    // 0.5 * 80 + 0.4 * 78 + 8 = 79.2
    assert!((predictions[0] - 79.2).abs() < 15.0, "prediction {}", predictions[0]);
}

#[test]
fn test_run_reads_source_file_and_json_model() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("data").join("stud.csv");
    DataSaver::save_csv(&mut students_df(100), &source).unwrap();

    let config = config_in(dir.path())
        .with_ingestion(IngestionConfig::default().with_source(&source))
        .with_artifacts(
            ArtifactConfig::default()
                .with_dir(dir.path().join("json_artifacts"))
                .with_model_format(SerializationFormat::Json),
        );

    let report = TrainPipeline::new(config.clone()).run().unwrap();
    assert!(report.ingestion.raw_path.exists());

    let text = std::fs::read_to_string(&report.model_path).unwrap();
    assert!(text.trim_start().starts_with('{'));

    let pipeline = PredictPipeline::from_artifacts(&config.artifacts).unwrap();
    let raw = DataLoader::new().load_csv(&report.ingestion.raw_path).unwrap();
    assert_eq!(pipeline.predict(&raw).unwrap().len(), 100);
}

#[test]
fn test_weak_model_is_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path())
        .with_trainer(TrainerConfig::default().with_candidates(vec![ModelKind::Mean]));

    let err = TrainPipeline::new(config.clone()).run_on_frame(students_df(80)).unwrap_err();
    assert!(matches!(err, PipelineError::NoAcceptableModel { .. }));
    assert!(config.artifacts.train_data_path().exists());
    assert!(!config.artifacts.model_path().exists());
}

#[test]
fn test_missing_target_column() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let df = students_df(50).drop("math_score").unwrap();

    let err = TrainPipeline::new(config).run_on_frame(df).unwrap_err();
    assert!(matches!(err, PipelineError::FeatureNotFound(ref c) if c == "math_score"));
}

#[test]
fn test_predict_without_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = ArtifactConfig::default().with_dir(dir.path());
    assert!(PredictPipeline::from_artifacts(&artifacts).is_err());
}
