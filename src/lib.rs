//! Card Fraud Classifier Library
//!
//! Offline training pipeline for credit-card fraud classifiers (robust
//! scaling, SMOTE, tree ensembles, logistic regression, isolation forest,
//! recall-targeted thresholding) and a single-record inference wrapper over
//! the persisted model artifact.

pub mod config;
pub mod dataset;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod resampling;
pub mod threshold;
pub mod types;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use feature_extractor::FeatureExtractor;
pub use models::inference::{InferenceEngine, PredictionResult};
pub use pipeline::{TrainingPipeline, TrainingReport};
pub use types::transaction::Transaction;
