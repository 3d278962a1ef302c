pub mod predictor;
pub mod staging;

pub use predictor::{PredictionError, Predictor, Stage};
pub use staging::{StagedFile, StagingArea, StagingError, sanitize_file_name};
