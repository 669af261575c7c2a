//! Random forest classifier

use super::tree::{BinnedFeatures, Criterion, DecisionTree, TreeParams};
use super::Classifier;
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use ndarray::ArrayView1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random forest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Max features per split (sqrt of total if None)
    pub max_features: Option<usize>,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Histogram bins per feature
    pub max_bins: usize,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 12,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            max_bins: 255,
            seed: 42,
        }
    }
}

/// Bagged ensemble of Gini trees; probability is the mean leaf positive fraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Train the random forest
    pub fn fit(dataset: &Dataset, params: ForestParams) -> Result<Self> {
        if params.n_trees == 0 {
            return Err(PipelineError::Config(
                "random forest needs at least one tree".to_string(),
            ));
        }
        if dataset.n_samples() == 0 {
            return Err(PipelineError::Fit(
                "cannot fit a random forest on an empty dataset".to_string(),
            ));
        }

        let n_samples = dataset.n_samples();
        let n_features = dataset.n_features();
        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize)
            .clamp(1, n_features);

        let binned = BinnedFeatures::new(&dataset.features, params.max_bins);
        let targets = dataset.labels_f64().to_vec();
        let unused = vec![0.0; n_samples];

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: Some(max_features),
            criterion: Criterion::Gini,
        };

        // Build trees in parallel
        let fitted: Vec<(DecisionTree, Vec<f64>)> = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let indices: Vec<usize> = if params.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                DecisionTree::fit(&binned, &targets, &unused, indices, &tree_params, &mut rng)
            })
            .collect();

        let mut feature_importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(fitted.len());
        for (tree, importances) in fitted {
            for (total, imp) in feature_importances.iter_mut().zip(importances) {
                *total += imp;
            }
            trees.push(tree);
        }
        normalize(&mut feature_importances);

        Ok(Self {
            params,
            trees,
            feature_importances,
        })
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Normalized gain importances, one per feature
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn predict_proba_one(&self, x: ArrayView1<f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_one(x)).sum();
        sum / self.trees.len() as f64
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        Some(&self.feature_importances)
    }
}

pub(crate) fn normalize(values: &mut [f64]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::roc_auc;
    use ndarray::{Array1, Array2};

    fn two_blobs(n: usize) -> Dataset {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let labels = Array1::from_shape_fn(n, |i| u8::from(i % 4 == 0));
        let features = Array2::from_shape_fn((n, 3), |(i, j)| {
            let shift = if labels[i] == 1 && j < 2 { 2.5 } else { 0.0 };
            shift + rng.gen_range(-1.0..1.0)
        });
        Dataset::new(features, labels, vec!["a".into(), "b".into(), "noise".into()]).unwrap()
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 15,
            max_depth: 6,
            ..Default::default()
        }
    }

    #[test]
    fn test_random_forest_classification() {
        let train = two_blobs(400);
        let forest = RandomForest::fit(&train, small_params()).unwrap();
        assert_eq!(forest.n_trees(), 15);

        let test = two_blobs(200);
        let proba = forest.predict_proba(&test);
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert!(roc_auc(&test.labels, &proba).unwrap() > 0.95);
    }

    #[test]
    fn test_feature_importances_favor_signal() {
        let train = two_blobs(400);
        let forest = RandomForest::fit(&train, small_params()).unwrap();

        let imp = forest.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[2]);
        assert!(imp[1] > imp[2]);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let train = two_blobs(200);
        let a = RandomForest::fit(&train, small_params()).unwrap();
        let b = RandomForest::fit(&train, small_params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_trees_rejected() {
        let train = two_blobs(50);
        let params = ForestParams {
            n_trees: 0,
            ..Default::default()
        };
        assert!(RandomForest::fit(&train, params).is_err());
    }
}
