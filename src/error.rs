//! Error types for the training pipeline and the inference wrapper

use thiserror::Error;

/// Errors raised by the library.
///
/// `Data` and `Fit` abort a training run. `ThresholdNotFound` is reported as a
/// normal outcome of the threshold search. `Schema` is a per-call inference
/// error and never poisons the loaded model.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Data error: {0}")]
    Data(String),

    #[error("Fit error: {0}")]
    Fit(String),

    #[error("No threshold meets target recall {target:.2}")]
    ThresholdNotFound { target: f64 },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Model artifact error: {0}")]
    Artifact(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
