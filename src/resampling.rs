//! Synthetic minority oversampling (SMOTE) for the training split

use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

/// SMOTE oversampler.
///
/// `target_ratio` is the desired minority/majority count ratio after
/// resampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smote {
    pub target_ratio: f64,
    pub k_neighbors: usize,
    pub seed: u64,
}

impl Default for Smote {
    fn default() -> Self {
        Self {
            target_ratio: 0.1,
            k_neighbors: 5,
            seed: 42,
        }
    }
}

impl Smote {
    pub fn new(target_ratio: f64, k_neighbors: usize, seed: u64) -> Self {
        Self {
            target_ratio,
            k_neighbors,
            seed,
        }
    }

    /// Number of synthetic minority rows needed for `dataset`
    pub fn samples_needed(&self, dataset: &Dataset) -> Result<usize> {
        if !(self.target_ratio > 0.0 && self.target_ratio <= 1.0) {
            return Err(PipelineError::Config(format!(
                "target ratio must be in (0, 1], got {}",
                self.target_ratio
            )));
        }
        if self.k_neighbors == 0 {
            return Err(PipelineError::Config(
                "k_neighbors must be at least 1".to_string(),
            ));
        }

        let (majority, minority) = dataset.class_counts();
        if majority == 0 || minority == 0 {
            return Err(PipelineError::Fit(format!(
                "oversampling needs both classes, got {} negatives and {} positives",
                majority, minority
            )));
        }
        if minority > majority {
            return Err(PipelineError::Fit(format!(
                "positive class ({}) is not the minority ({} negatives)",
                minority, majority
            )));
        }
        if minority <= self.k_neighbors {
            return Err(PipelineError::Fit(format!(
                "{} minority samples are not enough for {} neighbours",
                minority, self.k_neighbors
            )));
        }

        let target = (self.target_ratio * majority as f64).round() as usize;
        if target < minority {
            return Err(PipelineError::Fit(format!(
                "target ratio {} would require removing minority samples (current ratio {:.4})",
                self.target_ratio,
                dataset.minority_ratio()
            )));
        }

        Ok(target - minority)
    }

    /// Return a copy of `train` with synthetic minority rows appended.
    ///
    /// Original rows keep their position; synthetic rows follow them.
    pub fn fit_resample(&self, train: &Dataset) -> Result<Dataset> {
        let n_synthetic = self.samples_needed(train)?;
        let minority_idx = train.indices_of_class(1);

        if n_synthetic == 0 {
            info!("Training set already at target ratio, no synthetic samples generated");
            return Ok(train.clone());
        }

        let minority = train.features.select(Axis(0), &minority_idx);
        let neighbours = nearest_neighbours(&minority, self.k_neighbors);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut synthetic = Array2::zeros((n_synthetic, train.n_features()));

        for mut row in synthetic.outer_iter_mut() {
            let base = rng.gen_range(0..minority.nrows());
            let neighbour = neighbours[base][rng.gen_range(0..self.k_neighbors)];
            let gap: f64 = rng.gen();

            let a = minority.row(base);
            let b = minority.row(neighbour);
            row.assign(&(&a + &((&b - &a) * gap)));
        }

        let features = concatenate(Axis(0), &[train.features.view(), synthetic.view()])
            .map_err(|e| PipelineError::Fit(format!("cannot append synthetic rows: {}", e)))?;
        let labels = concatenate(
            Axis(0),
            &[train.labels.view(), Array1::ones(n_synthetic).view()],
        )
        .map_err(|e| PipelineError::Fit(format!("cannot append synthetic labels: {}", e)))?;

        let resampled = Dataset::new(features, labels, train.feature_names.clone())?;
        let (negatives, positives) = resampled.class_counts();

        info!(
            synthetic = n_synthetic,
            negatives = negatives,
            positives = positives,
            ratio = format!("{:.4}", resampled.minority_ratio()),
            "SMOTE resampling complete"
        );

        Ok(resampled)
    }
}

/// Indices of the `k` nearest rows (Euclidean, self excluded) for every row
fn nearest_neighbours(points: &Array2<f64>, k: usize) -> Vec<Vec<usize>> {
    points
        .outer_iter()
        .enumerate()
        .map(|(i, point)| {
            let mut distances: Vec<(f64, usize)> = points
                .outer_iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, other)| (squared_distance(point, other), j))
                .collect();
            distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            distances.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
