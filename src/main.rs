//! Card Fraud Classifier - Training Entry Point
//!
//! Usage: `train [config.toml]`. Without an argument `config/config.toml` is
//! used when present, otherwise built-in defaults.

use anyhow::{Context, Result};
use card_fraud_classifier::{
    config::{AppConfig, LoggingConfig},
    PipelineError, TrainingPipeline,
};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/config.toml";

fn main() -> Result<()> {
    let config_arg = std::env::args().nth(1);
    let config = match &config_arg {
        Some(path) => AppConfig::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None if Path::new(DEFAULT_CONFIG).exists() => AppConfig::load()?,
        None => AppConfig::default(),
    };

    init_logging(&config.logging)?;

    info!("Starting card fraud classifier training");
    match &config_arg {
        Some(path) => info!(path = %path, "Configuration loaded"),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            info!(path = DEFAULT_CONFIG, "Configuration loaded")
        }
        None => warn!("No configuration file found, using defaults"),
    }
    info!(
        dataset = %config.data.path.display(),
        test_size = config.data.test_size,
        target_ratio = config.resampling.target_ratio,
        target_recall = config.threshold.target_recall,
        selection = ?config.models.selection,
        "Run settings"
    );

    let pipeline = TrainingPipeline::new(config);
    match pipeline.run() {
        Ok(report) => {
            report.print_summary();
            info!(
                model = %report.selected_model,
                threshold = report.threshold.threshold,
                artifact = %report.artifact_path.display(),
                "Training complete"
            );
            Ok(())
        }
        Err(e @ PipelineError::ThresholdNotFound { .. }) => {
            error!(error = %e, "Threshold search exhausted, no model saved");
            std::process::exit(2);
        }
        Err(e) => Err(e).context("Training run failed"),
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let directives = format!(
        "card_fraud_classifier={level},train={level}",
        level = logging.level
    );
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
    Ok(())
}
