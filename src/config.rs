//! Configuration management for the training pipeline

use crate::error::PipelineError;
use crate::models::{BoostingParams, ForestParams, IsolationParams, LogisticParams};
use crate::threshold::DEFAULT_TARGET_RECALL;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the deployed classifier is chosen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelSelection {
    /// Highest PR-AUC on the test split
    #[default]
    BestPrAuc,
    RandomForest,
    GradientBoosting,
    LogisticRegression,
}

impl ModelSelection {
    /// Model name a fixed selection refers to
    pub fn model_name(&self) -> Option<&'static str> {
        match self {
            ModelSelection::BestPrAuc => None,
            ModelSelection::RandomForest => Some("random_forest"),
            ModelSelection::GradientBoosting => Some("gradient_boosting"),
            ModelSelection::LogisticRegression => Some("logistic_regression"),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub resampling: ResamplingConfig,
    pub models: ModelsConfig,
    pub threshold: ThresholdConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Input dataset and split
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// CSV file with Time, V1..V28, Amount, Class
    pub path: PathBuf,
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Seed for the split and for resampling
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/creditcard.csv"),
            test_size: 0.2,
            seed: 42,
        }
    }
}

/// SMOTE settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResamplingConfig {
    /// Minority / majority count after resampling
    pub target_ratio: f64,
    pub k_neighbors: usize,
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        Self {
            target_ratio: 0.1,
            k_neighbors: 5,
        }
    }
}

/// Model selection and hyperparameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    pub selection: ModelSelection,
    pub random_forest: ForestParams,
    pub gradient_boosting: BoostingParams,
    pub logistic_regression: LogisticParams,
    pub isolation_forest: IsolationParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Minimum recall the operating threshold must reach
    pub target_recall: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            target_recall: DEFAULT_TARGET_RECALL,
        }
    }
}

/// Where training results are written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub model_path: PathBuf,
    pub report_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/fraud_model.bin"),
            report_path: PathBuf::from("models/training_report.json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let app: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> std::result::Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::Config(msg));

        if !(self.data.test_size > 0.0 && self.data.test_size < 1.0) {
            return invalid(format!(
                "data.test_size must be in (0, 1), got {}",
                self.data.test_size
            ));
        }
        if !(self.resampling.target_ratio > 0.0 && self.resampling.target_ratio <= 1.0) {
            return invalid(format!(
                "resampling.target_ratio must be in (0, 1], got {}",
                self.resampling.target_ratio
            ));
        }
        if self.resampling.k_neighbors == 0 {
            return invalid("resampling.k_neighbors must be at least 1".to_string());
        }
        if !(self.threshold.target_recall > 0.0 && self.threshold.target_recall <= 1.0) {
            return invalid(format!(
                "threshold.target_recall must be in (0, 1], got {}",
                self.threshold.target_recall
            ));
        }
        if self.models.random_forest.n_trees == 0 {
            return invalid("models.random_forest.n_trees must be at least 1".to_string());
        }
        if self.models.isolation_forest.n_estimators == 0 {
            return invalid("models.isolation_forest.n_estimators must be at least 1".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return invalid(format!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.data.test_size, 0.2);
        assert_eq!(config.resampling.target_ratio, 0.1);
        assert_eq!(config.resampling.k_neighbors, 5);
        assert_eq!(config.threshold.target_recall, 0.90);
        assert_eq!(config.models.selection, ModelSelection::BestPrAuc);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_overrides_named_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[data]
path = "fixtures/sample.csv"
test_size = 0.3

[models]
selection = "gradient_boosting"

[models.random_forest]
n_trees = 7

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.data.path, PathBuf::from("fixtures/sample.csv"));
        assert_eq!(config.data.test_size, 0.3);
        assert_eq!(config.data.seed, 42);
        assert_eq!(config.models.selection, ModelSelection::GradientBoosting);
        assert_eq!(config.models.random_forest.n_trees, 7);
        assert_eq!(config.models.random_forest.max_depth, 12);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.data.test_size = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.threshold.target_recall = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_selection_names() {
        assert_eq!(ModelSelection::BestPrAuc.model_name(), None);
        assert_eq!(
            ModelSelection::LogisticRegression.model_name(),
            Some("logistic_regression")
        );
    }
}
