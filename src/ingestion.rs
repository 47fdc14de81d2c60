//! Data ingestion: read the source table, snapshot it and write a seeded train/test split

use crate::config::{ArtifactConfig, IngestionConfig};
use crate::error::{PipelineError, Result};
use crate::utils::{DataLoader, DataSaver};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use tracing::info;

/// Files written by an ingestion run
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionOutput {
    pub raw_path: PathBuf,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub n_train: usize,
    pub n_test: usize,
}

pub struct DataIngestion {
    config: IngestionConfig,
    artifacts: ArtifactConfig,
    loader: DataLoader,
}

impl DataIngestion {
    pub fn new(config: IngestionConfig, artifacts: ArtifactConfig) -> Self {
        Self {
            config,
            artifacts,
            loader: DataLoader::new(),
        }
    }

    /// Read the configured source file and ingest it
    pub fn initiate_data_ingestion(&self) -> Result<IngestionOutput> {
        info!(source = %self.config.source_path.display(), "data ingestion started");
        let df = self.loader.load_auto(&self.config.source_path)?;
        info!(rows = df.height(), cols = df.width(), "source data loaded");
        self.ingest_frame(df)
    }

    /// Write `raw_data.csv`, split, then write `train.csv` and `test.csv`
    pub fn ingest_frame(&self, mut df: DataFrame) -> Result<IngestionOutput> {
        let raw_path = self.artifacts.raw_data_path();
        DataSaver::save_csv(&mut df, &raw_path)?;

        let (mut train, mut test) =
            train_test_split(&df, self.config.test_size, self.config.random_state)?;

        let train_path = self.artifacts.train_data_path();
        let test_path = self.artifacts.test_data_path();
        DataSaver::save_csv(&mut train, &train_path)?;
        DataSaver::save_csv(&mut test, &test_path)?;

        info!(
            train_rows = train.height(),
            test_rows = test.height(),
            dir = %self.artifacts.artifact_dir.display(),
            "data ingestion completed"
        );

        Ok(IngestionOutput {
            raw_path,
            train_path,
            test_path,
            n_train: train.height(),
            n_test: test.height(),
        })
    }
}

/// Seeded shuffle split; the test side gets `ceil(test_size * n)` rows
pub fn train_test_split(
    df: &DataFrame,
    test_size: f64,
    seed: u64,
) -> Result<(DataFrame, DataFrame)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::ConfigError(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let n = df.height();
    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::ConfigError(format!(
            "Cannot split {} rows with test_size {}: one side would be empty",
            n, test_size
        )));
    }

    let mut indices: Vec<IdxSize> = (0..n as IdxSize).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let (test_idx, train_idx) = indices.split_at(n_test);

    let train = df.take(&IdxCa::from_vec("idx".into(), train_idx.to_vec()))?;
    let test = df.take(&IdxCa::from_vec("idx".into(), test_idx.to_vec()))?;
    Ok((train, test))
}
