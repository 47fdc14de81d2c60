//! Tabular file loading and saving

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Loader for CSV, Parquet and JSON files
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows scanned to infer CSV column types
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: 100,
        }
    }

    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows.max(1);
        self
    }

    /// Load a comma-separated file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        self.load_csv_with_options(path, b',', true)
    }

    pub fn load_csv_with_options(
        &self,
        path: impl AsRef<Path>,
        delimiter: u8,
        has_header: bool,
    ) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = open(path)?;
        let started = Instant::now();

        let parse_opts = CsvParseOptions::default().with_separator(delimiter);
        let df = CsvReadOptions::default()
            .with_has_header(has_header)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()?;

        debug!(
            path = %path.display(),
            rows = df.height(),
            cols = df.width(),
            ms = started.elapsed().as_millis() as u64,
            "csv loaded"
        );
        Ok(df)
    }

    pub fn load_parquet(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let file = open(path.as_ref())?;
        Ok(ParquetReader::new(file).finish()?)
    }

    /// Load a JSON array of records
    pub fn load_json(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let file = open(path.as_ref())?;
        Ok(JsonReader::new(file).finish()?)
    }

    /// Pick a reader from the file extension; anything unknown is read as CSV
    pub fn load_auto(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "tsv" => self.load_csv_with_options(path, b'\t', true),
            "parquet" | "pq" => self.load_parquet(path),
            "json" => self.load_json(path),
            _ => self.load_csv(path),
        }
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        PipelineError::DataError(format!("Cannot open {}: {}", path.display(), e))
    })
}

fn create(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

/// Write DataFrames to disk, creating parent directories
pub struct DataSaver;

impl DataSaver {
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = create(path.as_ref())?;
        CsvWriter::new(&mut file).include_header(true).finish(df)?;
        Ok(())
    }

    pub fn save_parquet(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let file = create(path.as_ref())?;
        ParquetWriter::new(file).finish(df)?;
        Ok(())
    }

    /// Save as a JSON array of records, readable by [`DataLoader::load_json`]
    pub fn save_json(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = create(path.as_ref())?;
        JsonWriter::new(&mut file)
            .with_json_format(JsonFormat::Json)
            .finish(df)?;
        Ok(())
    }

    /// Dispatch on the file extension, defaulting to CSV
    pub fn save_auto(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
            Some("parquet") | Some("pq") => Self::save_parquet(df, path),
            Some("json") => Self::save_json(df, path),
            _ => Self::save_csv(df, path),
        }
    }
}

/// Per-column overview of a frame
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub dtype: String,
    pub null_count: usize,
    pub n_unique: Option<usize>,
}

/// Shape and column overview of a frame
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub n_rows: usize,
    pub n_cols: usize,
    pub columns: Vec<ColumnSummary>,
}

impl DatasetSummary {
    pub fn of(df: &DataFrame) -> Self {
        let columns = df
            .get_columns()
            .iter()
            .map(|col| ColumnSummary {
                name: col.name().to_string(),
                dtype: col.dtype().to_string(),
                null_count: col.null_count(),
                n_unique: col.as_materialized_series().n_unique().ok(),
            })
            .collect();

        Self {
            n_rows: df.height(),
            n_cols: df.width(),
            columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df!(
            "gender" => ["female", "male", "female"],
            "reading_score" => [72i64, 90, 95],
            "math_score" => [70.5f64, 88.0, 93.25]
        )
        .unwrap()
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("data.csv");

        let mut df = frame();
        DataSaver::save_csv(&mut df, &path).unwrap();
        let loaded = DataLoader::new().load_csv(&path).unwrap();

        assert_eq!(loaded.shape(), (3, 3));
        assert_eq!(loaded.column("reading_score").unwrap().dtype(), &DataType::Int64);
        assert!(loaded.equals(&df));
    }

    #[test]
    fn test_load_auto_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut df = frame();

        let parquet = dir.path().join("data.parquet");
        DataSaver::save_auto(&mut df, &parquet).unwrap();
        assert!(DataLoader::new().load_auto(&parquet).unwrap().equals(&df));

        let json = dir.path().join("data.json");
        DataSaver::save_auto(&mut df, &json).unwrap();
        assert_eq!(DataLoader::new().load_auto(&json).unwrap().shape(), (3, 3));
    }

    #[test]
    fn test_missing_file_is_data_error() {
        let err = DataLoader::new().load_csv("does/not/exist.csv").unwrap_err();
        assert!(matches!(err, PipelineError::DataError(_)));
    }

    #[test]
    fn test_summary() {
        let summary = DatasetSummary::of(&frame());
        assert_eq!(summary.n_rows, 3);
        assert_eq!(summary.columns[0].name, "gender");
        assert_eq!(summary.columns[0].n_unique, Some(2));
        assert_eq!(summary.columns[2].null_count, 0);
    }
}
