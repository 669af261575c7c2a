//! Evaluation metrics for the fraud classifiers.

use crate::error::{PipelineError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Confusion counts for a binary classifier at a fixed cutoff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    /// Count outcomes with `score >= cutoff` predicted as fraud
    pub fn from_scores(labels: &Array1<u8>, scores: &Array1<f64>, cutoff: f64) -> Self {
        let mut cm = Self::default();
        for (&label, &score) in labels.iter().zip(scores.iter()) {
            match (label == 1, score >= cutoff) {
                (true, true) => cm.tp += 1,
                (false, false) => cm.tn += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    /// tp / (tp + fp), zero when nothing was flagged
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// tp / (tp + fn), zero when there are no positives
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn check_inputs(labels: &Array1<u8>, scores: &Array1<f64>) -> Result<(usize, usize)> {
    if labels.len() != scores.len() {
        return Err(PipelineError::Evaluation(format!(
            "{} labels but {} scores",
            labels.len(),
            scores.len()
        )));
    }
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(PipelineError::Evaluation(format!(
            "metric undefined with {} positives and {} negatives",
            positives, negatives
        )));
    }
    Ok((negatives, positives))
}

/// Area under the ROC curve.
///
/// Computed as the Mann-Whitney statistic with average ranks, which equals the
/// trapezoidal area over distinct thresholds and handles tied scores.
pub fn roc_auc(labels: &Array1<u8>, scores: &Array1<f64>) -> Result<f64> {
    let (negatives, positives) = check_inputs(labels, scores)?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based; tied block shares the mean rank
        let mean_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end].iter().filter(|&&i| labels[i] == 1).count();
        positive_rank_sum += mean_rank * tied_positives as f64;
        start = end;
    }

    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Ok(u / (p * negatives as f64))
}

/// Precision and recall at each distinct score threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecallCurve {
    /// Distinct scores, ascending
    pub thresholds: Vec<f64>,
    /// Precision of `score >= thresholds[i]`
    pub precision: Vec<f64>,
    /// Recall of `score >= thresholds[i]`; non-increasing
    pub recall: Vec<f64>,
}

pub fn precision_recall_curve(
    labels: &Array1<u8>,
    scores: &Array1<f64>,
) -> Result<PrecisionRecallCurve> {
    let (_, positives) = check_inputs(labels, scores)?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut thresholds = Vec::new();
    let mut precision = Vec::new();
    let mut recall = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);

    let mut start = 0;
    while start < order.len() {
        let score = scores[order[start]];
        let mut end = start;
        while end < order.len() && scores[order[end]] == score {
            if labels[order[end]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            end += 1;
        }
        thresholds.push(score);
        precision.push(tp as f64 / (tp + fp) as f64);
        recall.push(tp as f64 / positives as f64);
        start = end;
    }

    thresholds.reverse();
    precision.reverse();
    recall.reverse();

    Ok(PrecisionRecallCurve {
        thresholds,
        precision,
        recall,
    })
}

/// Area under the precision-recall curve as average precision:
/// `sum_k (R_k - R_{k-1}) * P_k` over thresholds from high to low.
pub fn average_precision(labels: &Array1<u8>, scores: &Array1<f64>) -> Result<f64> {
    let curve = precision_recall_curve(labels, scores)?;
    let mut previous_recall = 0.0;
    let mut area = 0.0;
    for (p, r) in curve.precision.iter().zip(curve.recall.iter()).rev() {
        area += (r - previous_recall) * p;
        previous_recall = *r;
    }
    Ok(area)
}

/// Test-set evaluation of a single model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub model: String,
    /// Score cutoff used for the confusion matrix
    pub cutoff: f64,
    pub confusion: ConfusionMatrix,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
    pub roc_auc: f64,
    pub pr_auc: f64,
}

impl ModelEvaluation {
    pub fn evaluate(
        model: &str,
        labels: &Array1<u8>,
        scores: &Array1<f64>,
        cutoff: f64,
    ) -> Result<Self> {
        let roc_auc = roc_auc(labels, scores)?;
        let pr_auc = average_precision(labels, scores)?;
        let confusion = ConfusionMatrix::from_scores(labels, scores, cutoff);

        Ok(Self {
            model: model.to_string(),
            cutoff,
            confusion,
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            accuracy: confusion.accuracy(),
            roc_auc,
            pr_auc,
        })
    }

    /// Log a boxed report of this evaluation
    pub fn print_summary(&self) {
        let cm = &self.confusion;
        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║ MODEL EVALUATION: {:<43}║", self.model);
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ ROC-AUC: {:>6.4}   PR-AUC: {:>6.4}   cutoff: {:>8.4}         ║",
            self.roc_auc, self.pr_auc, self.cutoff
        );
        info!(
            "║ Precision: {:>6.4}  Recall: {:>6.4}  F1: {:>6.4}  Acc: {:>6.4} ║",
            self.precision, self.recall, self.f1, self.accuracy
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Confusion matrix          predicted legit   predicted fraud  ║");
        info!("║   actual legit          {:>15}   {:>15}  ║", cm.tn, cm.fp);
        info!("║   actual fraud          {:>15}   {:>15}  ║", cm.fn_, cm.tp);
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}
