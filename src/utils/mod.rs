//! File loading helpers

pub mod data_loader;

pub use data_loader::{ColumnSummary, DataLoader, DataSaver, DatasetSummary};
