//! Classifiers, the anomaly scorer, artifact persistence and inference

pub mod gradient_boosting;
pub mod inference;
pub mod isolation_forest;
pub mod loader;
pub mod logistic;
pub mod random_forest;
pub mod tree;

pub use gradient_boosting::{BoostingParams, GradientBoosting};
pub use inference::InferenceEngine;
pub use isolation_forest::{IsolationForest, IsolationParams};
pub use loader::ModelArtifact;
pub use logistic::{LogisticParams, LogisticRegression};
pub use random_forest::{ForestParams, RandomForest};

use crate::dataset::Dataset;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// A fitted binary classifier producing fraud probabilities.
pub trait Classifier {
    /// Stable model name used in reports and configuration
    fn name(&self) -> &'static str;

    /// Probability of the positive class for one feature row
    fn predict_proba_one(&self, x: ArrayView1<f64>) -> f64;

    /// Probabilities for every row of `dataset`
    fn predict_proba(&self, dataset: &Dataset) -> Array1<f64> {
        dataset
            .features
            .outer_iter()
            .map(|row| self.predict_proba_one(row))
            .collect()
    }

    /// Normalized feature importances, when the model has them
    fn feature_importances(&self) -> Option<&[f64]> {
        None
    }
}

/// Any of the supervised models the pipeline can persist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainedClassifier {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    LogisticRegression(LogisticRegression),
}

impl TrainedClassifier {
    fn inner(&self) -> &dyn Classifier {
        match self {
            TrainedClassifier::RandomForest(m) => m,
            TrainedClassifier::GradientBoosting(m) => m,
            TrainedClassifier::LogisticRegression(m) => m,
        }
    }
}

impl Classifier for TrainedClassifier {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn predict_proba_one(&self, x: ArrayView1<f64>) -> f64 {
        self.inner().predict_proba_one(x)
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        self.inner().feature_importances()
    }
}

impl From<RandomForest> for TrainedClassifier {
    fn from(model: RandomForest) -> Self {
        TrainedClassifier::RandomForest(model)
    }
}

impl From<GradientBoosting> for TrainedClassifier {
    fn from(model: GradientBoosting) -> Self {
        TrainedClassifier::GradientBoosting(model)
    }
}

impl From<LogisticRegression> for TrainedClassifier {
    fn from(model: LogisticRegression) -> Self {
        TrainedClassifier::LogisticRegression(model)
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(40.0) > 0.999_999);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-12);
    }
}
