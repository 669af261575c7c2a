//! Isolation Forest anomaly scorer
//!
//! Unsupervised: fit on the untouched training features, labels ignored.
//! Anomalies are isolated by fewer random splits, so short average path
//! lengths map to scores near 1.

use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, ArrayView1};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Isolation forest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationParams {
    /// Number of trees in the forest
    pub n_estimators: usize,
    /// Maximum number of samples per tree
    pub max_samples: usize,
    /// Expected proportion of anomalies
    pub contamination: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for IsolationParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.002,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum IsolationNode {
    Internal {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<IsolationNode>,
}

impl IsolationTree {
    fn build(data: &Dataset, sample: Vec<usize>, max_depth: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build_node(data, sample, 0, max_depth, rng);
        tree
    }

    fn build_node(
        &mut self,
        data: &Dataset,
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let node_idx = self.nodes.len();
        self.nodes.push(IsolationNode::Leaf { size: rows.len() });

        if depth >= max_depth || rows.len() <= 1 {
            return node_idx;
        }

        let feature = rng.gen_range(0..data.n_features());
        let (min_val, max_val) = rows
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = data.features[[i, feature]];
                (lo.min(v), hi.max(v))
            });

        // constant feature on this node
        if max_val - min_val < 1e-10 {
            return node_idx;
        }

        let threshold = rng.gen_range(min_val..max_val);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| data.features[[i, feature]] < threshold);

        if left_rows.is_empty() || right_rows.is_empty() {
            return node_idx;
        }

        let left = self.build_node(data, left_rows, depth + 1, max_depth, rng);
        let right = self.build_node(data, right_rows, depth + 1, max_depth, rng);
        self.nodes[node_idx] = IsolationNode::Internal {
            feature,
            threshold,
            left,
            right,
        };

        node_idx
    }

    fn path_length(&self, x: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[idx] {
                IsolationNode::Leaf { size } => return depth + average_path_length(*size),
                IsolationNode::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] < *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        0.0
    } else if n == 2 {
        1.0
    } else {
        let n = n as f64;
        2.0 * ((n - 1.0).ln() + 0.5772156649) - 2.0 * (n - 1.0) / n
    }
}

/// Isolation Forest for anomaly detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    params: IsolationParams,
    trees: Vec<IsolationTree>,
    /// Samples drawn per tree during fit
    sample_size: usize,
    /// Score at or above which a row is labelled anomalous
    threshold: f64,
}

impl IsolationForest {
    /// Fit on the feature matrix of `data`; labels are ignored
    pub fn fit(data: &Dataset, params: IsolationParams) -> Result<Self> {
        if params.n_estimators == 0 || params.max_samples < 2 {
            return Err(PipelineError::Config(
                "isolation forest needs at least one tree and two samples per tree".to_string(),
            ));
        }
        if !(params.contamination > 0.0 && params.contamination < 0.5) {
            return Err(PipelineError::Config(format!(
                "contamination must be in (0, 0.5), got {}",
                params.contamination
            )));
        }
        if data.n_samples() < 2 {
            return Err(PipelineError::Fit(
                "isolation forest needs at least two samples".to_string(),
            ));
        }

        let sample_size = params.max_samples.min(data.n_samples());
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let trees: Vec<IsolationTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let sample = index::sample(&mut rng, data.n_samples(), sample_size).into_vec();
                IsolationTree::build(data, sample, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            params,
            trees,
            sample_size,
            threshold: 1.0,
        };

        let mut train_scores = forest.score(data).to_vec();
        train_scores.sort_by(f64::total_cmp);
        let last = train_scores.len() - 1;
        let cut = ((1.0 - forest.params.contamination) * last as f64).round() as usize;
        forest.threshold = train_scores[cut.min(last)];

        Ok(forest)
    }

    /// Anomaly score in (0, 1]; higher is more anomalous
    pub fn score_one(&self, x: ArrayView1<f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let mean_path: f64 =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c <= 0.0 {
            return 0.5;
        }
        2.0_f64.powf(-mean_path / c)
    }

    pub fn score(&self, data: &Dataset) -> Array1<f64> {
        data.features
            .outer_iter()
            .map(|row| self.score_one(row))
            .collect()
    }

    /// Score cutoff derived from the contamination rate on training data
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_anomaly(&self, x: ArrayView1<f64>) -> bool {
        self.score_one(x) >= self.threshold
    }

    pub fn name(&self) -> &'static str {
        "isolation_forest"
    }
}
