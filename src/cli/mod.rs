//! Command-line interface for training, prediction and data inspection.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::logging::LoggingConfig;
use crate::pipeline::{PredictPipeline, TrainPipeline, TrainReport};
use crate::training::{CVStrategy, ModelKind};
use crate::utils::{DataLoader, DataSaver, DatasetSummary};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ml-project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and serve a tabular regression model chosen by grid-searched R²")]
#[command(long_about = None)]
pub struct Cli {
    /// Log filter, e.g. "info" or "ml_project=debug"
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Logging settings from the global flags
    pub fn logging_config(&self) -> LoggingConfig {
        let mut config = LoggingConfig::default();
        if let Some(level) = &self.log_level {
            config = config.with_level(level.as_str());
        }
        if let Some(dir) = &self.log_dir {
            config = config.with_log_dir(dir);
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest, transform and select the best regressor
    Train {
        /// Pipeline configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input data file (CSV, TSV, JSON or Parquet)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Target column name
        #[arg(short, long)]
        target: Option<String>,

        /// Artifact directory
        #[arg(short, long)]
        artifacts: Option<PathBuf>,

        /// Number of cross-validation folds
        #[arg(long)]
        cv_folds: Option<usize>,

        /// Minimum test R² the winner must reach
        #[arg(long)]
        quality_floor: Option<f64>,

        /// Comma-separated candidate kinds, e.g. "linear,ridge,random_forest"
        #[arg(long, value_delimiter = ',')]
        candidates: Option<Vec<String>>,

        /// Per-candidate time limit in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Predict with a trained model and preprocessor
    Predict {
        /// Input data file with the feature columns
        #[arg(short, long)]
        data: PathBuf,

        /// Artifact directory holding the model and preprocessor
        #[arg(short, long, default_value = "artifacts")]
        artifacts: PathBuf,

        /// Output file; input rows plus a `prediction` column
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show data information
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,
    },

    /// List the candidate kinds and their default grids
    Candidates,

    /// Write the default pipeline configuration
    InitConfig {
        #[arg(short, long, default_value = "pipeline.json")]
        output: PathBuf,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Train {
            config,
            data,
            target,
            artifacts,
            cv_folds,
            quality_floor,
            candidates,
            timeout,
        } => {
            let mut pipeline_config = match config {
                Some(path) => PipelineConfig::from_file(&path)?,
                None => PipelineConfig::default(),
            };
            if let Some(data) = data {
                pipeline_config.ingestion.source_path = data;
            }
            if let Some(target) = target {
                pipeline_config.transformation.target_column = target;
            }
            if let Some(dir) = artifacts {
                pipeline_config.artifacts.artifact_dir = dir;
            }
            if let Some(n_splits) = cv_folds {
                pipeline_config.trainer.cv = CVStrategy::KFold { n_splits, shuffle: false };
            }
            if let Some(floor) = quality_floor {
                pipeline_config.trainer.quality_floor = floor;
            }
            if let Some(names) = candidates {
                pipeline_config.trainer.candidates = Some(parse_candidates(&names)?);
            }
            if let Some(secs) = timeout {
                pipeline_config.trainer.candidate_timeout_secs = Some(secs);
            }
            cmd_train(pipeline_config)
        }
        Commands::Predict { data, artifacts, output } => {
            cmd_predict(&data, &artifacts, output.as_deref())
        }
        Commands::Info { data } => cmd_info(&data),
        Commands::Candidates => cmd_candidates(),
        Commands::InitConfig { output } => cmd_init_config(&output),
    }
}

fn parse_candidates(names: &[String]) -> anyhow::Result<Vec<ModelKind>> {
    let kinds = names
        .iter()
        .filter(|n| !n.trim().is_empty())
        .map(|n| n.parse::<ModelKind>())
        .collect::<Result<Vec<_>, _>>()?;
    if kinds.is_empty() {
        anyhow::bail!("--candidates needs at least one model kind");
    }
    Ok(kinds)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(config: PipelineConfig) -> anyhow::Result<()> {
    section("Train");

    println!("  {:<14} {}", muted("Source"), config.ingestion.source_path.display());
    println!("  {:<14} {}", muted("Target"), config.transformation.target_column);
    println!("  {:<14} {}", muted("Artifacts"), config.artifacts.artifact_dir.display());
    println!();

    step_run("Running pipeline");
    let start = Instant::now();
    let report = TrainPipeline::new(config).run()?;
    step_done(&format!("{:.2?}", start.elapsed()));

    print_report(&report);
    Ok(())
}

fn print_report(report: &TrainReport) {
    section("Candidates");
    println!(
        "  {:<24} {:>9} {:>9} {:>9}",
        muted("Model"),
        muted("CV R²"),
        muted("Test R²"),
        muted("Time")
    );
    println!("  {}", dim(&"─".repeat(54)));

    for entry in report.report.entries() {
        let cv = entry
            .cv_score
            .map(|s| format!("{:.4}", s))
            .unwrap_or_else(|| "-".to_string());
        let line = format!(
            "  {:<24} {:>9} {:>9.4} {:>8.2}s",
            entry.name, cv, entry.test_r2, entry.duration_secs
        );
        if entry.name == report.best_name {
            println!("{}", line.white().bold());
        } else {
            println!("{}", line);
        }
    }
    for name in report.report.skipped() {
        println!("  {:<24} {:>9}", name, "timed out".yellow());
    }

    println!();
    println!(
        "  {} {} {} {:.4}",
        ok("best"),
        report.best_name.white().bold(),
        muted("R²:"),
        report.test_r2
    );
    println!("  {:<14} {:.4}", muted("RMSE"), report.metrics.rmse);
    println!("  {:<14} {:.4}", muted("MAE"), report.metrics.mae);
    println!("  {:<14} {}", muted("Features"), report.feature_names.len());
    step_ok(&format!("model → {}", report.model_path.display()));
    step_ok(&format!("preprocessor → {}", report.preprocessor_path.display()));
    println!();
}

pub fn cmd_predict(
    data_path: &Path,
    artifact_dir: &Path,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading artifacts");
    let artifacts = crate::config::ArtifactConfig::default().with_dir(artifact_dir);
    let pipeline = PredictPipeline::from_artifacts(&artifacts)?;
    step_done(&pipeline.metadata().name);

    step_run("Loading data");
    let mut df = DataLoader::new().load_auto(data_path)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    step_run("Predicting");
    let start = Instant::now();
    let predictions = pipeline.predict(&df)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    match output {
        Some(path) => {
            df.with_column(Series::new("prediction".into(), predictions.to_vec()))?;
            DataSaver::save_auto(&mut df, path)?;
            step_ok(&format!("{} predictions → {}", predictions.len(), path.display()));
        }
        None => {
            println!();
            for (i, value) in predictions.iter().take(20).enumerate() {
                println!("  {:>6} {:.4}", muted(&i.to_string()), value);
            }
            if predictions.len() > 20 {
                println!("  {}", dim(&format!("… {} more", predictions.len() - 20)));
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let df = DataLoader::new().load_auto(data_path)?;
    let summary = DatasetSummary::of(&df);

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), summary.n_rows);
    println!("  {:<12} {}", muted("Columns"), summary.n_cols);
    println!("  {:<12} {:.2} MB", muted("Memory"), df.estimated_size() as f64 / 1024.0 / 1024.0);
    println!();

    println!(
        "  {:<20} {:<12} {:>6} {:>8}",
        muted("Column"),
        muted("Type"),
        muted("Nulls"),
        muted("Unique")
    );
    println!("  {}", dim(&"─".repeat(50)));

    for col in &summary.columns {
        println!(
            "  {:<20} {:<12} {:>6} {:>8}",
            col.name,
            col.dtype.truecolor(140, 140, 140),
            col.null_count,
            col.n_unique.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
        );
    }

    println!();
    Ok(())
}

pub fn cmd_candidates() -> anyhow::Result<()> {
    section("Candidates");

    let kinds = ModelKind::DEFAULT_CATALOG.iter().chain(std::iter::once(&ModelKind::Mean));
    for kind in kinds {
        let grid = kind.default_grid();
        let params = grid
            .names()
            .map(|name| {
                let values = grid
                    .values(name)
                    .unwrap_or_default()
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}=[{}]", name, values)
            })
            .collect::<Vec<_>>();
        let params = if params.is_empty() { "defaults".to_string() } else { params.join(" ") };
        println!(
            "  {:<20} {:<24} {}",
            kind.as_str().white(),
            muted(kind.display_name()),
            dim(&params)
        );
    }

    println!();
    Ok(())
}

pub fn cmd_init_config(output: &Path) -> anyhow::Result<()> {
    PipelineConfig::default().save(output)?;
    step_ok(&format!("default configuration → {}", output.display()));
    Ok(())
}
