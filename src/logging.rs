//! Subscriber setup for `tracing` output
//!
//! Library code only emits events; the binary (or an embedding application) calls
//! [`init_logging`] once. Without a subscriber every event is a no-op.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or `ml_project=debug`
    pub level: String,
    /// Also write a timestamped log file into this directory
    pub log_dir: Option<PathBuf>,
    /// Colored stdout output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        EnvFilter::try_new(&self.level).map_err(|e| {
            PipelineError::ConfigError(format!("Invalid log level '{}': {}", self.level, e))
        })?;
        Ok(())
    }
}

/// Log file name for a run started at `started`
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("{}.log", started.format("%m_%d_%Y_%H_%M_%S"))
}

fn open_log_file(dir: &Path) -> Result<(File, PathBuf)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(log_file_name(Local::now()));
    let file = File::create(&path)?;
    Ok((file, path))
}

/// Install the global subscriber: stdout plus an optional log file.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns the log file path when one was
/// opened. Fails if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<PathBuf>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            PipelineError::ConfigError(format!("Invalid log level '{}': {}", config.level, e))
        })?,
    };

    let stdout_layer = fmt::layer().with_target(true).with_ansi(config.ansi);

    let (file_layer, log_path) = match &config.log_dir {
        Some(dir) => {
            let (file, path) = open_log_file(dir)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| PipelineError::ConfigError(format!("Logging already initialized: {}", e)))?;

    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name_format() {
        let started = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(log_file_name(started), "03_07_2024_09_05_02.log");
    }

    #[test]
    fn test_level_validation() {
        assert!(LoggingConfig::default().validate().is_ok());
        assert!(LoggingConfig::default().with_level("ml_project=debug").validate().is_ok());
        assert!(LoggingConfig::default().with_level("ml_project=loudest").validate().is_err());
    }

    #[test]
    fn test_open_log_file_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs");
        let (_file, path) = open_log_file(&nested).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("log"));
    }
}
