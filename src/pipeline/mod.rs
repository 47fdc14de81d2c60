//! Training and prediction entry points tying the stages together

mod predict_pipeline;
mod train_pipeline;

pub use predict_pipeline::{FieldValue, InputRecord, PredictPipeline};
pub use train_pipeline::{TrainPipeline, TrainReport};
