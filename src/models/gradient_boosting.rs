//! Gradient-boosted trees for binary log-loss

use super::random_forest::normalize;
use super::tree::{BinnedFeatures, Criterion, DecisionTree, TreeParams};
use super::{sigmoid, Classifier};
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use ndarray::ArrayView1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gradient boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// L2 regularization on leaf values
    pub lambda: f64,
    /// Minimum hessian sum in a child
    pub min_child_weight: f64,
    /// Fraction of rows sampled per round
    pub subsample: f64,
    /// Histogram bins per feature
    pub max_bins: usize,
    /// Random seed
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 6,
            lambda: 1.0,
            min_child_weight: 1.0,
            subsample: 1.0,
            max_bins: 255,
            seed: 42,
        }
    }
}

/// Additive tree model on the log-odds scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    params: BoostingParams,
    base_score: f64,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

impl GradientBoosting {
    /// Fit with Newton steps on the logistic loss
    pub fn fit(dataset: &Dataset, params: BoostingParams) -> Result<Self> {
        if !(params.learning_rate > 0.0) {
            return Err(PipelineError::Config(format!(
                "learning_rate must be positive, got {}",
                params.learning_rate
            )));
        }
        if !(params.subsample > 0.0 && params.subsample <= 1.0) {
            return Err(PipelineError::Config(format!(
                "subsample must be in (0, 1], got {}",
                params.subsample
            )));
        }

        let (negatives, positives) = dataset.class_counts();
        if negatives == 0 || positives == 0 {
            return Err(PipelineError::Fit(
                "gradient boosting needs both classes in the training data".to_string(),
            ));
        }

        let n_samples = dataset.n_samples();
        let labels = dataset.labels_f64();
        let prior = positives as f64 / n_samples as f64;
        let base_score = (prior / (1.0 - prior)).ln();

        let binned = BinnedFeatures::new(&dataset.features, params.max_bins);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Newton {
                lambda: params.lambda,
                min_child_weight: params.min_child_weight,
            },
        };

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let mut raw = vec![base_score; n_samples];
        let mut grad = vec![0.0; n_samples];
        let mut hess = vec![0.0; n_samples];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut feature_importances = vec![0.0; dataset.n_features()];

        for round in 0..params.n_estimators {
            for i in 0..n_samples {
                let p = sigmoid(raw[i]);
                grad[i] = p - labels[i];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let indices: Vec<usize> = if params.subsample < 1.0 {
                (0..n_samples)
                    .filter(|_| rng.gen::<f64>() < params.subsample)
                    .collect()
            } else {
                (0..n_samples).collect()
            };
            if indices.is_empty() {
                continue;
            }

            let (tree, importances) =
                DecisionTree::fit(&binned, &grad, &hess, indices, &tree_params, &mut rng);

            for (i, value) in raw.iter_mut().enumerate() {
                *value += params.learning_rate * tree.predict_one(dataset.row(i));
            }
            for (total, imp) in feature_importances.iter_mut().zip(importances) {
                *total += imp;
            }
            trees.push(tree);

            if round % 10 == 0 {
                let loss = log_loss(&raw, labels.as_slice().unwrap_or(&[]));
                debug!(round = round, train_log_loss = loss, "Boosting round complete");
            }
        }

        normalize(&mut feature_importances);

        Ok(Self {
            params,
            base_score,
            trees,
            feature_importances,
        })
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Normalized gain importances, one per feature
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Raw log-odds score
    pub fn decision_function(&self, x: ArrayView1<f64>) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|t| self.params.learning_rate * t.predict_one(x))
                .sum::<f64>()
    }
}

impl Classifier for GradientBoosting {
    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn predict_proba_one(&self, x: ArrayView1<f64>) -> f64 {
        sigmoid(self.decision_function(x))
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        Some(&self.feature_importances)
    }
}

fn log_loss(raw: &[f64], labels: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = raw
        .iter()
        .zip(labels)
        .map(|(&r, &y)| {
            let p = sigmoid(r).clamp(1e-15, 1.0 - 1e-15);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / labels.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::roc_auc;
    use ndarray::{Array1, Array2};

    fn xor_like(n: usize, seed: u64) -> Dataset {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let features = Array2::from_shape_fn((n, 2), |_| rng.gen_range(-1.0..1.0));
        let labels = Array1::from_shape_fn(n, |i| {
            u8::from(features[[i, 0]] * features[[i, 1]] > 0.0)
        });
        Dataset::new(features, labels, vec!["x".into(), "y".into()]).unwrap()
    }

    fn small_params() -> BoostingParams {
        BoostingParams {
            n_estimators: 40,
            learning_rate: 0.3,
            max_depth: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_boosting_learns_interaction() {
        let train = xor_like(600, 1);
        let model = GradientBoosting::fit(&train, small_params()).unwrap();
        assert_eq!(model.n_trees(), 40);

        let test = xor_like(300, 2);
        let proba = model.predict_proba(&test);
        assert!(proba.iter().all(|&p| p > 0.0 && p < 1.0));
        assert!(roc_auc(&test.labels, &proba).unwrap() > 0.85);
    }

    #[test]
    fn test_training_loss_decreases() {
        let train = xor_like(300, 3);
        let short = GradientBoosting::fit(
            &train,
            BoostingParams {
                n_estimators: 2,
                ..small_params()
            },
        )
        .unwrap();
        let long = GradientBoosting::fit(&train, small_params()).unwrap();

        let labels = train.labels_f64().to_vec();
        let raw = |m: &GradientBoosting| -> Vec<f64> {
            (0..train.n_samples())
                .map(|i| m.decision_function(train.row(i)))
                .collect()
        };
        assert!(log_loss(&raw(&long), &labels) < log_loss(&raw(&short), &labels));
    }

    #[test]
    fn test_zero_rounds_predicts_prior() {
        let train = xor_like(100, 4);
        let model = GradientBoosting::fit(
            &train,
            BoostingParams {
                n_estimators: 0,
                ..Default::default()
            },
        )
        .unwrap();

        let (_, positives) = train.class_counts();
        let prior = positives as f64 / 100.0;
        let p = model.predict_proba_one(train.row(0));
        assert!((p - prior).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_subsample_rejected() {
        let train = xor_like(50, 5);
        let params = BoostingParams {
            subsample: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            GradientBoosting::fit(&train, params),
            Err(PipelineError::Config(_))
        ));
    }
}
