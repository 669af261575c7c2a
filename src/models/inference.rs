//! Single-record inference over a persisted model artifact

use super::loader::ModelArtifact;
use super::Classifier;
use crate::error::Result;
use crate::types::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Result of scoring one transaction.
///
/// The stored cutoff is the smallest test-split score whose recall reaches the
/// target, which is normally the recall-1.0 point. It favours catching every
/// fraud over precision, so `is_fraud` flags many legitimate transactions;
/// `precision_at_threshold` says how many.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Fraud probability (0.0 - 1.0)
    pub probability: f64,
    /// `probability >= threshold`
    pub is_fraud: bool,
    /// Cutoff stored with the model
    pub threshold: f64,
    /// Test-split precision measured at `threshold`
    pub precision_at_threshold: f64,
}

/// Inference engine holding one loaded artifact, read-only after load
pub struct InferenceEngine {
    artifact: ModelArtifact,
}

impl InferenceEngine {
    /// Load the artifact once from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let artifact = ModelArtifact::load(path)?;
        info!(
            model = %artifact.model_name,
            features = artifact.feature_names.len(),
            "Inference engine initialized"
        );
        Ok(Self::from_artifact(artifact))
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self { artifact }
    }

    pub fn model_name(&self) -> &str {
        &self.artifact.model_name
    }

    pub fn threshold(&self) -> f64 {
        self.artifact.threshold()
    }

    /// Fraud probability for a complete, correctly keyed feature map.
    ///
    /// Missing or unknown keys are a schema error; nothing is zero-filled.
    pub fn predict(&self, features: &HashMap<String, f64>) -> Result<f64> {
        let tx = Transaction::from_feature_map(features)?;
        self.predict_transaction(&tx)
    }

    pub fn predict_transaction(&self, tx: &Transaction) -> Result<f64> {
        let row = self.artifact.extractor.extract(tx)?;
        let probability = self.artifact.classifier.predict_proba_one(row.view());
        debug!(probability = probability, "Transaction scored");
        Ok(probability)
    }

    /// Probability plus the decision at the stored threshold.
    ///
    /// The threshold is the recall-targeted operating point chosen at training
    /// time; callers wanting fewer false positives can apply their own cutoff
    /// to `probability`.
    pub fn score(&self, features: &HashMap<String, f64>) -> Result<PredictionResult> {
        let probability = self.predict(features)?;
        let point = &self.artifact.operating_point;
        Ok(PredictionResult {
            probability,
            is_fraud: probability >= point.threshold,
            threshold: point.threshold,
            precision_at_threshold: point.precision,
        })
    }

    /// Score many records; one result per record
    pub fn predict_batch(&self, batch: &[HashMap<String, f64>]) -> Vec<Result<PredictionResult>> {
        batch.iter().map(|features| self.score(features)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::error::PipelineError;
    use crate::feature_extractor::{FeatureExtractor, RobustScaler};
    use crate::models::{ForestParams, RandomForest};
    use crate::threshold::ThresholdSelection;
    use crate::types::transaction::PCA_COMPONENTS;
    use ndarray::{Array1, Array2};
    use uuid::Uuid;

    fn engine() -> InferenceEngine {
        let features = Array2::from_shape_fn((60, 32), |(i, j)| {
            if j == 0 && i % 6 == 0 {
                -4.0
            } else {
                ((i + j) % 5) as f64 / 5.0
            }
        });
        let labels = Array1::from_shape_fn(60, |i| u8::from(i % 6 == 0));
        let extractor = FeatureExtractor::from_scalers(
            RobustScaler { median: 20.0, iqr: 50.0 },
            RobustScaler { median: 90_000.0, iqr: 60_000.0 },
        );
        let dataset = Dataset::new(features, labels, extractor.feature_names()).unwrap();
        let forest = RandomForest::fit(
            &dataset,
            ForestParams {
                n_trees: 10,
                max_depth: 4,
                ..Default::default()
            },
        )
        .unwrap();
        let operating_point = ThresholdSelection {
            threshold: 0.5,
            precision: 0.8,
            recall: 0.9,
        };
        InferenceEngine::from_artifact(ModelArtifact::new(
            Uuid::new_v4(),
            extractor,
            forest.into(),
            operating_point,
        ))
    }

    fn record(v1: f64) -> HashMap<String, f64> {
        let mut v = [0.1; PCA_COMPONENTS];
        v[0] = v1;
        Transaction::new(3600.0, v, 25.0).to_feature_map()
    }

    #[test]
    fn test_predict_returns_probability() {
        let engine = engine();
        let p = engine.predict(&record(0.2)).unwrap();
        assert!((0.0..=1.0).contains(&p));
        assert_eq!(engine.model_name(), "random_forest");
    }

    #[test]
    fn test_score_applies_threshold() {
        let engine = engine();
        let fraud = engine.score(&record(-4.0)).unwrap();
        let legit = engine.score(&record(0.2)).unwrap();
        assert!(fraud.probability > legit.probability);
        assert_eq!(fraud.is_fraud, fraud.probability >= 0.5);
        assert_eq!(legit.threshold, 0.5);
        assert_eq!(legit.precision_at_threshold, 0.8);
    }

    #[test]
    fn test_missing_key_is_schema_error() {
        let engine = engine();
        let mut features = record(0.2);
        features.remove("Amount");
        assert!(matches!(engine.predict(&features), Err(PipelineError::Schema(_))));

        // the engine keeps working after a bad record
        assert!(engine.predict(&record(0.2)).is_ok());
    }

    #[test]
    fn test_batch_reports_per_record() {
        let engine = engine();
        let mut bad = record(0.0);
        bad.insert("V99".to_string(), 1.0);
        let results = engine.predict_batch(&[record(0.0), bad, record(-4.0)]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }
}
