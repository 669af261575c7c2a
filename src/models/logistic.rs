//! L2-regularized logistic regression with optional balanced class weights

use super::{sigmoid, Classifier};
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Logistic regression hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    /// Inverse regularization strength
    pub c: f64,
    /// Maximum Newton iterations
    pub max_iter: usize,
    /// Convergence tolerance on the largest parameter update
    pub tol: f64,
    /// Weight classes by n / (2 * n_class)
    pub balanced_class_weight: bool,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            tol: 1e-6,
            balanced_class_weight: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    params: LogisticParams,
    coefficients: Vec<f64>,
    intercept: f64,
    n_iter: usize,
}

impl LogisticRegression {
    /// Fit by Newton's method (IRLS) with step halving.
    ///
    /// Minimizes `sum_i w_i * logloss_i + ||beta||^2 / (2C)`; the intercept
    /// is not penalized.
    pub fn fit(dataset: &Dataset, params: LogisticParams) -> Result<Self> {
        if !(params.c > 0.0) {
            return Err(PipelineError::Config(format!(
                "C must be positive, got {}",
                params.c
            )));
        }

        let (negatives, positives) = dataset.class_counts();
        if negatives == 0 || positives == 0 {
            return Err(PipelineError::Fit(
                "logistic regression needs both classes in the training data".to_string(),
            ));
        }

        let x = &dataset.features;
        let y = dataset.labels_f64();
        let n = dataset.n_samples() as f64;
        let d = dataset.n_features();

        let sample_weight = if params.balanced_class_weight {
            let w_neg = n / (2.0 * negatives as f64);
            let w_pos = n / (2.0 * positives as f64);
            y.mapv(|label| if label > 0.5 { w_pos } else { w_neg })
        } else {
            Array1::ones(y.len())
        };

        let penalty = 1.0 / params.c;
        let mut beta = Array1::<f64>::zeros(d);
        let mut intercept = 0.0;
        let mut objective = objective_value(x, &y, &sample_weight, &beta, intercept, penalty);
        let mut n_iter = 0;
        let mut converged = false;

        while n_iter < params.max_iter {
            n_iter += 1;

            let p = (x.dot(&beta) + intercept).mapv(sigmoid);
            let residual = &sample_weight * &(&p - &y);
            let curvature = &sample_weight * &p.mapv(|pi| (pi * (1.0 - pi)).max(1e-12));

            // gradient over (beta, intercept)
            let mut gradient = Array1::<f64>::zeros(d + 1);
            gradient
                .slice_mut(s![..d])
                .assign(&(x.t().dot(&residual) + &beta * penalty));
            gradient[d] = residual.sum();

            // Hessian over (beta, intercept)
            let mut weighted = x.clone();
            for (mut row, &w) in weighted.outer_iter_mut().zip(curvature.iter()) {
                row *= w;
            }
            let mut hessian = Array2::<f64>::zeros((d + 1, d + 1));
            hessian
                .slice_mut(s![..d, ..d])
                .assign(&x.t().dot(&weighted));
            for j in 0..d {
                hessian[[j, j]] += penalty;
            }
            let cross = weighted.sum_axis(Axis(0));
            hessian.slice_mut(s![..d, d]).assign(&cross);
            hessian.slice_mut(s![d, ..d]).assign(&cross);
            hessian[[d, d]] = curvature.sum();

            let step = solve(hessian, gradient)?;

            // step halving keeps the objective from increasing
            let mut scale = 1.0;
            let mut accepted = false;
            for _ in 0..30 {
                let candidate_beta = &beta - &(&step.slice(s![..d]) * scale);
                let candidate_intercept = intercept - step[d] * scale;
                let candidate = objective_value(
                    x,
                    &y,
                    &sample_weight,
                    &candidate_beta,
                    candidate_intercept,
                    penalty,
                );
                if candidate <= objective + 1e-12 {
                    beta = candidate_beta;
                    intercept = candidate_intercept;
                    objective = candidate;
                    accepted = true;
                    break;
                }
                scale *= 0.5;
            }

            let max_update = step.iter().fold(0.0_f64, |m, s| m.max(s.abs())) * scale;
            debug!(
                iteration = n_iter,
                objective = objective,
                max_update = max_update,
                "Newton step"
            );

            if !accepted || max_update < params.tol {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                max_iter = params.max_iter,
                "Logistic regression reached max_iter before converging"
            );
        }

        Ok(Self {
            params,
            coefficients: beta.to_vec(),
            intercept,
            n_iter,
        })
    }

    pub fn params(&self) -> &LogisticParams {
        &self.params
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Newton iterations used during fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn decision_function(&self, x: ArrayView1<f64>) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(x.iter())
                .map(|(w, v)| w * v)
                .sum::<f64>()
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic_regression"
    }

    fn predict_proba_one(&self, x: ArrayView1<f64>) -> f64 {
        sigmoid(self.decision_function(x))
    }
}

fn objective_value(
    x: &Array2<f64>,
    y: &Array1<f64>,
    sample_weight: &Array1<f64>,
    beta: &Array1<f64>,
    intercept: f64,
    penalty: f64,
) -> f64 {
    let z = x.dot(beta) + intercept;
    let loss: f64 = z
        .iter()
        .zip(y.iter())
        .zip(sample_weight.iter())
        .map(|((&zi, &yi), &wi)| {
            // log(1 + exp(z)) - y * z, computed stably
            let softplus = if zi > 0.0 {
                zi + (-zi).exp().ln_1p()
            } else {
                zi.exp().ln_1p()
            };
            wi * (softplus - yi * zi)
        })
        .sum();
    loss + 0.5 * penalty * beta.dot(beta)
}

/// Solve `a * x = b` by Gaussian elimination with partial pivoting
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < 1e-12 {
            return Err(PipelineError::Fit(
                "logistic regression Hessian is singular".to_string(),
            ));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::roc_auc;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn linear_data(n: usize, positive_every: usize, seed: u64) -> Dataset {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let labels = Array1::from_shape_fn(n, |i| u8::from(i % positive_every == 0));
        let features = Array2::from_shape_fn((n, 2), |(i, j)| {
            let centre = if labels[i] == 1 { 1.5 } else { -0.5 };
            if j == 0 {
                centre + rng.gen_range(-1.5..1.5)
            } else {
                rng.gen_range(-1.0..1.0)
            }
        });
        Dataset::new(features, labels, vec!["signal".into(), "noise".into()]).unwrap()
    }

    #[test]
    fn test_solve() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![3.0, 5.0];
        let x = solve(a, b).unwrap();
        assert_abs_diff_eq!(x[0], 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 1.4, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let b = array![1.0, 2.0];
        assert!(matches!(solve(a, b), Err(PipelineError::Fit(_))));
    }

    #[test]
    fn test_logistic_separates_classes() {
        let train = linear_data(400, 3, 1);
        let model = LogisticRegression::fit(&train, LogisticParams::default()).unwrap();

        assert!(model.coefficients()[0] > 0.0);
        assert!(model.coefficients()[0].abs() > model.coefficients()[1].abs());

        let test = linear_data(200, 3, 2);
        let proba = model.predict_proba(&test);
        assert!(roc_auc(&test.labels, &proba).unwrap() > 0.85);
    }

    #[test]
    fn test_fit_reaches_stationary_point() {
        let train = linear_data(300, 4, 3);
        let params = LogisticParams {
            balanced_class_weight: false,
            ..Default::default()
        };
        let model = LogisticRegression::fit(&train, params).unwrap();

        let beta = Array1::from(model.coefficients().to_vec());
        let y = train.labels_f64();
        let p = (train.features.dot(&beta) + model.intercept()).mapv(sigmoid);
        let residual = &p - &y;
        let grad_w = train.features.t().dot(&residual) + &beta;

        assert!(grad_w.iter().all(|g| g.abs() < 1e-4));
        assert!(residual.sum().abs() < 1e-4);
    }

    #[test]
    fn test_balanced_weights_raise_minority_scores() {
        let train = linear_data(500, 10, 4);
        let plain = LogisticRegression::fit(
            &train,
            LogisticParams {
                balanced_class_weight: false,
                ..Default::default()
            },
        )
        .unwrap();
        let balanced = LogisticRegression::fit(&train, LogisticParams::default()).unwrap();

        let mean = |m: &LogisticRegression| m.predict_proba(&train).mean().unwrap_or(0.0);
        assert!(mean(&balanced) > mean(&plain));
    }
}
